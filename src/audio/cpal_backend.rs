//! Duplex backend on top of CPAL (Cross-Platform Audio Library).

use crate::audio::backend::{AudioBackend, InputCallback};
use crate::audio::frame::first_channel;
use crate::config::AudioConfig;
use crate::error::{Result, TalkbackError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: streams are only created, paused and dropped through `&mut self`
/// on the backend, which itself lives behind the engine's Mutex.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Samples waiting to be played, shared with the output callback.
type PlaybackQueue = Arc<Mutex<VecDeque<f32>>>;

/// Real duplex backend: one input stream and one output stream on the
/// default host, both running at the input device's sample rate.
///
/// CPAL hosts expose no echo-cancellation or ducking controls, so those
/// session options are left to the system mixer.
pub struct CpalBackend {
    input_device: Option<cpal::Device>,
    input_config: Option<cpal::StreamConfig>,
    input_format: cpal::SampleFormat,
    input_stream: Option<SendableStream>,
    output_stream: Option<SendableStream>,
    playback: PlaybackQueue,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            input_device: None,
            input_config: None,
            input_format: cpal::SampleFormat::F32,
            input_stream: None,
            output_stream: None,
            playback: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn build_output(
        &self,
        device: &cpal::Device,
        sample_rate: cpal::SampleRate,
    ) -> Result<cpal::Stream> {
        let default_config = device
            .default_output_config()
            .map_err(|e| TalkbackError::Setup {
                message: format!("Failed to query default output config: {}", e),
            })?;
        let channels = default_config.channels() as usize;
        let config = cpal::StreamConfig {
            channels: default_config.channels(),
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let queue = Arc::clone(&self.playback);
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queue = match queue.lock() {
                        Ok(queue) => queue,
                        Err(_) => {
                            data.fill(0.0);
                            return;
                        }
                    };
                    for frame in data.chunks_mut(channels.max(1)) {
                        let sample = queue.pop_front().unwrap_or(0.0);
                        frame.fill(sample);
                    }
                },
                |err| error!("Audio output stream error: {}", err),
                None,
            )
            .map_err(|e| TalkbackError::Setup {
                message: format!("Failed to attach playback stream: {}", e),
            })
    }

    fn build_input(&self, mut on_input: InputCallback) -> Result<cpal::Stream> {
        let (Some(device), Some(config)) = (&self.input_device, &self.input_config) else {
            return Err(TalkbackError::Setup {
                message: "input requested before the session was configured".to_string(),
            });
        };
        let channels = config.channels as usize;
        let err_callback = |err| error!("Audio input stream error: {}", err);

        let stream = match self.input_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    on_input(&first_channel(data, channels));
                },
                err_callback,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    on_input(&first_channel(&floats, channels));
                },
                err_callback,
                None,
            ),
            fmt => {
                return Err(TalkbackError::Setup {
                    message: format!("Unsupported input sample format: {:?}", fmt),
                });
            }
        };

        stream.map_err(|e| TalkbackError::Setup {
            message: format!("Failed to install input tap: {}", e),
        })
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn configure(&mut self, config: &AudioConfig) -> Result<u32> {
        let host = cpal::default_host();
        let input = host
            .default_input_device()
            .ok_or_else(|| TalkbackError::Setup {
                message: "No input device available".to_string(),
            })?;
        let output = host
            .default_output_device()
            .ok_or_else(|| TalkbackError::Setup {
                message: "No output device available".to_string(),
            })?;

        let input_default = input
            .default_input_config()
            .map_err(|e| TalkbackError::Setup {
                message: format!("Failed to query default input config: {}", e),
            })?;
        let sample_rate = input_default.sample_rate();

        let output_stream = self.build_output(&output, sample_rate)?;
        output_stream.play().map_err(|e| TalkbackError::Setup {
            message: format!("Failed to start playback stream: {}", e),
        })?;

        debug!(
            voice_processing = config.voice_processing,
            duck_others = config.duck_others,
            ducking_level = ?config.ducking_level,
            advanced_ducking = config.advanced_ducking,
            default_to_speaker = config.default_to_speaker,
            allow_bluetooth = config.allow_bluetooth,
            "host has no session categories, these options are left to the system mixer"
        );

        self.input_format = input_default.sample_format();
        self.input_config = Some(input_default.config());
        self.input_device = Some(input);
        self.output_stream = Some(SendableStream(output_stream));

        info!(sample_rate = sample_rate.0, "cpal duplex session configured");
        Ok(sample_rate.0)
    }

    fn start(&mut self, on_input: InputCallback) -> Result<()> {
        let stream = self.build_input(on_input)?;
        stream.play().map_err(|e| TalkbackError::Setup {
            message: format!("Failed to start input stream: {}", e),
        })?;
        self.input_stream = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.input_stream.take()
            && let Err(e) = stream.0.pause()
        {
            error!("Failed to pause input stream: {}", e);
        }
    }

    fn schedule(&mut self, samples: &[f32]) {
        if let Ok(mut queue) = self.playback.lock() {
            queue.extend(samples.iter().copied());
        }
    }

    fn deactivate(&mut self) -> Result<()> {
        self.stop();
        self.output_stream = None;
        self.input_device = None;
        self.input_config = None;
        if let Ok(mut queue) = self.playback.lock() {
            queue.clear();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "cpal"
    }
}
