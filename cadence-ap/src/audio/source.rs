//! Playable audio sources produced by the resolver

use crate::audio::decoder::{StreamInfo, StreamingReader};
use crate::audio::types::PcmBuffer;
use crate::error::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Pull-based reader of interleaved stereo f32 frames at the source's rate
pub trait FrameReader: Send {
    fn sample_rate(&self) -> u32;

    /// Append the next chunk of frames to `out`.
    ///
    /// Returns `Ok(false)` once the source is exhausted.
    fn read_chunk(&mut self, out: &mut Vec<f32>) -> Result<bool>;
}

/// A file with seekable framing: every schedule opens a fresh reader
#[derive(Debug, Clone)]
pub struct FramedSource {
    pub path: PathBuf,
    pub info: StreamInfo,
}

/// A playable source bound to an output path
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Seekable framed file, preferred for sample-accurate partial scheduling
    Framed(Arc<FramedSource>),
    /// Fully materialized buffer, used when framing is unavailable
    Buffered(Arc<PcmBuffer>),
}

impl AudioSource {
    pub fn framed(path: PathBuf, info: StreamInfo) -> Self {
        AudioSource::Framed(Arc::new(FramedSource { path, info }))
    }

    pub fn buffered(buffer: PcmBuffer) -> Self {
        AudioSource::Buffered(Arc::new(buffer))
    }

    /// Total playable length in seconds
    pub fn duration(&self) -> f64 {
        match self {
            AudioSource::Framed(f) => f.info.duration_seconds(),
            AudioSource::Buffered(b) => b.duration_seconds(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match self {
            AudioSource::Framed(f) => f.info.sample_rate,
            AudioSource::Buffered(b) => b.sample_rate,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AudioSource::Framed(_) => "framed",
            AudioSource::Buffered(_) => "buffered",
        }
    }

    /// Open a reader positioned at `offset_secs`
    ///
    /// Called on a decoder thread, never on the engine task.
    pub fn open_reader(&self, offset_secs: f64) -> Result<Box<dyn FrameReader>> {
        match self {
            AudioSource::Framed(f) => Ok(Box::new(StreamingReader::open(&f.path, offset_secs)?)),
            AudioSource::Buffered(b) => Ok(Box::new(BufferReader::new(b.clone(), offset_secs))),
        }
    }
}

/// Number of frames `BufferReader` hands out per chunk
const BUFFER_CHUNK_FRAMES: usize = 4096;

/// Reads a shared in-memory buffer from an offset
pub struct BufferReader {
    buffer: Arc<PcmBuffer>,
    position: usize,
}

impl BufferReader {
    pub fn new(buffer: Arc<PcmBuffer>, offset_secs: f64) -> Self {
        let position = buffer.frame_at(offset_secs);
        Self { buffer, position }
    }
}

impl FrameReader for BufferReader {
    fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate
    }

    fn read_chunk(&mut self, out: &mut Vec<f32>) -> Result<bool> {
        let total = self.buffer.frames();
        if self.position >= total {
            return Ok(false);
        }
        let end = (self.position + BUFFER_CHUNK_FRAMES).min(total);
        out.extend_from_slice(&self.buffer.samples[self.position * 2..end * 2]);
        self.position = end;
        Ok(true)
    }
}
