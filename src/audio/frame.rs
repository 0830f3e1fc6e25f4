//! Captured audio frames and fixed-size block assembly.

use std::time::Instant;

/// A block of mono samples captured from the input tap.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Sequence number for ordering and gap detection.
    pub sequence: u64,
    /// Timestamp when the block was completed.
    pub timestamp: Instant,
    /// Mono samples in the range -1.0..=1.0.
    pub samples: Vec<f32>,
}

impl AudioFrame {
    /// Creates a new audio frame.
    pub fn new(sequence: u64, samples: Vec<f32>) -> Self {
        Self {
            sequence,
            timestamp: Instant::now(),
            samples,
        }
    }

    /// Returns the duration of this frame in milliseconds.
    pub fn duration_ms(&self, sample_rate: u32) -> u32 {
        if sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000 / sample_rate as u64) as u32
    }
}

/// Sample rate and block size shared by the input and output paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub block_size: usize,
}

/// Takes the first channel of an interleaved buffer.
///
/// Backends may deliver stereo input even when voice processing is on;
/// recognition only consumes the first channel.
pub fn first_channel(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved.iter().step_by(channels).copied().collect()
}

/// Re-chunks arbitrarily sized backend buffers into fixed-size frames.
///
/// Backends deliver whatever the hardware period is; the engine promises
/// frames of exactly `block_size` samples. Leftover samples wait for the
/// next push.
#[derive(Debug)]
pub struct FrameAssembler {
    block_size: usize,
    pending: Vec<f32>,
    next_sequence: u64,
}

impl FrameAssembler {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
            next_sequence: 0,
        }
    }

    /// Appends samples and returns every frame that became complete.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let needed = self.block_size - self.pending.len();
            let take = needed.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.block_size {
                let block =
                    std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                frames.push(AudioFrame::new(self.next_sequence, block));
                self.next_sequence += 1;
            }
        }

        frames
    }

    /// Number of samples waiting for a full block.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::new(0, vec![0.0; 1600]);
        assert_eq!(frame.duration_ms(16000), 100);
        assert_eq!(frame.duration_ms(0), 0);
    }

    #[test]
    fn test_first_channel_mono_passthrough() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(first_channel(&samples, 1), samples);
    }

    #[test]
    fn test_first_channel_takes_left_of_stereo() {
        let interleaved = vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        assert_eq!(first_channel(&interleaved, 2), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_assembler_emits_exact_blocks() {
        let mut assembler = FrameAssembler::new(4);

        let frames = assembler.push(&[1.0, 2.0, 3.0]);
        assert!(frames.is_empty());
        assert_eq!(assembler.pending_len(), 3);

        let frames = assembler.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frames[1].samples, vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(assembler.pending_len(), 1);
    }

    #[test]
    fn test_assembler_sequences_are_contiguous() {
        let mut assembler = FrameAssembler::new(2);
        let mut sequences = Vec::new();
        for chunk in [[0.0; 3], [0.0; 3], [0.0; 3]] {
            sequences.extend(assembler.push(&chunk).iter().map(|f| f.sequence));
        }
        assert_eq!(sequences, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_assembler_zero_block_size_is_clamped() {
        let mut assembler = FrameAssembler::new(0);
        assert_eq!(assembler.block_size(), 1);
        assert_eq!(assembler.push(&[0.5, 0.5]).len(), 2);
    }
}
