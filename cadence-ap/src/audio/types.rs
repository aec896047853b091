//! Core audio data types
//!
//! Every buffer the player hands between stages is interleaved stereo f32
//! (`[L, R, L, R, ...]`, range -1.0 to 1.0). Sources with other channel
//! layouts are folded to stereo at decode time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel count used for every buffer inside the player
pub const STEREO: usize = 2;

/// One of the two fixed output paths
///
/// Exactly two channels exist for the life of the engine. A crossfade swaps
/// which one is active rather than allocating a new path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    A,
    B,
}

impl ChannelId {
    /// The other channel of the pair
    pub fn other(self) -> Self {
        match self {
            ChannelId::A => ChannelId::B,
            ChannelId::B => ChannelId::A,
        }
    }

    /// Slot index into two-element arrays
    pub fn index(self) -> usize {
        match self {
            ChannelId::A => 0,
            ChannelId::B => 1,
        }
    }

    pub const BOTH: [ChannelId; 2] = [ChannelId::A, ChannelId::B];
}

impl Default for ChannelId {
    fn default() -> Self {
        ChannelId::A
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::A => write!(f, "A"),
            ChannelId::B => write!(f, "B"),
        }
    }
}

/// Fully decoded audio held in memory.
///
/// **Format:**
/// - Samples are f32, interleaved stereo
/// - Sample rate is the source's native rate; resampling happens at output
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    /// PCM audio samples (interleaved stereo)
    pub samples: Vec<f32>,

    /// Native sample rate of the decoded file
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Silent buffer of the given length
    ///
    /// Used as a stand-in source where only timing matters.
    pub fn silence(duration_secs: f64, sample_rate: u32) -> Self {
        let frames = (duration_secs.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * STEREO], sample_rate)
    }

    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / STEREO
    }

    /// Get duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Frame index corresponding to `offset_secs`, clamped to the buffer
    pub fn frame_at(&self, offset_secs: f64) -> usize {
        let frame = (offset_secs.max(0.0) * self.sample_rate as f64) as usize;
        frame.min(self.frames())
    }
}

/// Fold an interleaved buffer with `channels` channels into stereo.
///
/// Mono is duplicated to both sides. Layouts wider than stereo keep the
/// front left/right pair.
pub fn fold_to_stereo(input: &[f32], channels: usize, output: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            output.reserve(input.len() * STEREO);
            for &s in input {
                output.push(s);
                output.push(s);
            }
        }
        2 => output.extend_from_slice(input),
        n => {
            output.reserve(input.len() / n * STEREO);
            for frame in input.chunks_exact(n) {
                output.push(frame[0]);
                output.push(frame[1]);
            }
        }
    }
}
