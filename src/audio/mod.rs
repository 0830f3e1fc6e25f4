//! Audio duplex path: device backends, frame assembly and the shared engine.

pub mod backend;
#[cfg(feature = "cpal-audio")]
pub mod cpal_backend;
pub mod duplex;
pub mod frame;

pub use backend::{AudioBackend, InputCallback, MockAudioBackend};
#[cfg(feature = "cpal-audio")]
pub use cpal_backend::CpalBackend;
pub use duplex::{DuplexEngine, EngineState, SharedDuplexEngine};
pub use frame::{AudioFrame, FrameAssembler, StreamFormat};
