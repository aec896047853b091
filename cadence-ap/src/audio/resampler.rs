//! Streaming sample-rate conversion using rubato
//!
//! Decoder threads feed arbitrary-sized stereo chunks at the source rate and
//! receive device-rate output. When the rates match the resampler is a
//! pass-through.

use crate::audio::types::STEREO;
use crate::error::{Error, Result};
use rubato::{FastFixedIn, Resampler as RubatoResampler};
use tracing::debug;

/// Input frames per rubato call
pub const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Incremental stereo resampler
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    /// Interleaved input waiting for a full chunk
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == output_rate {
            debug!("Sample rate already at {}Hz, skipping resample", output_rate);
            return Ok(Self {
                inner: None,
                pending: Vec::new(),
            });
        }

        debug!("Resampling from {}Hz to {}Hz", input_rate, output_rate);
        let resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0, // max_relative_ratio (no runtime changes)
            rubato::PolynomialDegree::Septic,
            RESAMPLE_CHUNK_FRAMES,
            STEREO,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        Ok(Self {
            inner: Some(resampler),
            pending: Vec::with_capacity(RESAMPLE_CHUNK_FRAMES * STEREO * 2),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Feed interleaved stereo input; completed chunks are appended to `out`
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<()> {
        let Some(resampler) = self.inner.as_mut() else {
            out.extend_from_slice(input);
            return Ok(());
        };

        self.pending.extend_from_slice(input);
        let chunk_samples = RESAMPLE_CHUNK_FRAMES * STEREO;
        let mut consumed = 0;

        while self.pending.len() - consumed >= chunk_samples {
            let planar = deinterleave(&self.pending[consumed..consumed + chunk_samples]);
            let resampled = resampler
                .process(&planar, None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            interleave_into(&resampled, out);
            consumed += chunk_samples;
        }

        self.pending.drain(..consumed);
        Ok(())
    }

    /// Resample whatever input is left over at end of stream
    pub fn flush(&mut self, out: &mut Vec<f32>) -> Result<()> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(());
        };
        if self.pending.is_empty() {
            return Ok(());
        }

        let planar = deinterleave(&self.pending);
        let resampled = resampler
            .process_partial(Some(planar.as_slice()), None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
        interleave_into(&resampled, out);
        self.pending.clear();
        Ok(())
    }
}

/// Convert interleaved stereo to planar.
///
/// Input:  [L, R, L, R, ...]
/// Output: [[L, L, ...], [R, R, ...]]
fn deinterleave(samples: &[f32]) -> Vec<Vec<f32>> {
    let num_frames = samples.len() / STEREO;
    let mut planar = vec![Vec::with_capacity(num_frames); STEREO];

    for frame in samples.chunks_exact(STEREO) {
        planar[0].push(frame[0]);
        planar[1].push(frame[1]);
    }

    planar
}

/// Append planar output to an interleaved buffer
fn interleave_into(planar: &[Vec<f32>], out: &mut Vec<f32>) {
    if planar.len() < STEREO {
        return;
    }
    let num_frames = planar[0].len().min(planar[1].len());
    out.reserve(num_frames * STEREO);
    for i in 0..num_frames {
        out.push(planar[0][i]);
        out.push(planar[1][i]);
    }
}
