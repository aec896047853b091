//! Audio decoder using symphonia
//!
//! Decodes MP3, FLAC, AAC, Vorbis and WAV to interleaved stereo f32.
//! `StreamingReader` decodes incrementally from an arbitrary offset and backs
//! both resolver backends: the streaming backend opens one per schedule, the
//! memory backend drains one into a `PcmBuffer`.

use crate::audio::source::FrameReader;
use crate::audio::types::{fold_to_stereo, PcmBuffer};
use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

// Decode errors on a single packet are recoverable; this many in a row are not.
const MAX_DECODE_RETRIES: usize = 3;

/// Stream properties needed to schedule a file by frame offset
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: usize,
    pub total_frames: u64,
}

impl StreamInfo {
    pub fn duration_seconds(&self) -> f64 {
        self.total_frames as f64 / self.sample_rate as f64
    }
}

struct OpenedFormat {
    format: Box<dyn FormatReader>,
    track_id: u32,
    decoder: Box<dyn Decoder>,
    sample_rate: Option<u32>,
    channels: Option<usize>,
    n_frames: Option<u64>,
    has_time_base: bool,
}

fn open_format(path: &Path) -> Result<OpenedFormat> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Decode(format!("Failed to open file {}: {}", path.display(), e)))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Create a hint to help the format registry guess the format
    let mut hint = Hint::new();
    if let Some(ext_str) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext_str);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

    let params = &track.codec_params;
    let decoder = symphonia::default::get_codecs()
        .make(params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

    Ok(OpenedFormat {
        track_id: track.id,
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count()),
        n_frames: params.n_frames,
        has_time_base: params.time_base.is_some(),
        decoder,
        format,
    })
}

/// Probe a file for seekable framing.
///
/// Succeeds only when the container reports a frame count, a sample rate and
/// a time base; without those a partial schedule cannot be computed.
pub fn probe_stream(path: &Path) -> Result<StreamInfo> {
    let opened = open_format(path)?;

    let sample_rate = opened
        .sample_rate
        .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
    let total_frames = opened
        .n_frames
        .ok_or_else(|| Error::Decode("Frame count not reported by container".to_string()))?;
    if !opened.has_time_base {
        return Err(Error::Decode("Time base not reported by container".to_string()));
    }

    Ok(StreamInfo {
        sample_rate,
        channels: opened.channels.unwrap_or(2),
        total_frames,
    })
}

/// Decode entire audio file to memory.
pub fn decode_file(path: &Path) -> Result<PcmBuffer> {
    debug!("Decoding entire file: {}", path.display());

    let mut reader = StreamingReader::open(path, 0.0)?;
    let mut samples = Vec::new();
    while reader.read_chunk(&mut samples)? {}

    let buffer = PcmBuffer::new(samples, reader.sample_rate());
    debug!(
        "Decoded {} frames ({:.2}s) from {}",
        buffer.frames(),
        buffer.duration_seconds(),
        path.display()
    );

    if buffer.frames() == 0 {
        return Err(Error::Decode(format!("No audio decoded from {}", path.display())));
    }
    Ok(buffer)
}

/// Incremental decoder positioned at a requested offset
pub struct StreamingReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    /// Frames still to discard after an accurate seek landed early
    skip_frames: u64,
    finished: bool,
    scratch: Vec<f32>,
}

impl StreamingReader {
    /// Open `path` and position the reader at `offset_secs`
    pub fn open(path: &Path, offset_secs: f64) -> Result<Self> {
        let opened = open_format(path)?;

        let mut reader = Self {
            sample_rate: opened.sample_rate.unwrap_or(44_100),
            format: opened.format,
            decoder: opened.decoder,
            track_id: opened.track_id,
            skip_frames: 0,
            finished: false,
            scratch: Vec::new(),
        };

        if offset_secs > 0.0 {
            reader.seek(offset_secs)?;
        }
        Ok(reader)
    }

    fn seek(&mut self, offset_secs: f64) -> Result<()> {
        let seeked = self.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: offset_secs.into(),
                track_id: Some(self.track_id),
            },
        );

        match seeked {
            Ok(seeked_to) => {
                // The format reader may land on the packet boundary before the
                // requested timestamp; decode and drop the difference.
                self.skip_frames = seeked_to.required_ts.saturating_sub(seeked_to.actual_ts);
                self.decoder.reset();
                Ok(())
            }
            Err(SymphoniaError::SeekError(e)) => {
                debug!("Seek to {:.3}s past end of stream ({:?})", offset_secs, e);
                self.finished = true;
                Ok(())
            }
            Err(e) => Err(Error::Decode(format!("Seek to {:.3}s failed: {}", offset_secs, e))),
        }
    }
}

impl FrameReader for StreamingReader {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_chunk(&mut self, out: &mut Vec<f32>) -> Result<bool> {
        let mut decode_errors = 0;

        while !self.finished {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.finished = true;
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Stream requires decoder reset, treating as end of stream");
                    self.finished = true;
                    break;
                }
                Err(e) => return Err(Error::Decode(format!("Error reading packet: {}", e))),
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    decode_errors += 1;
                    if decode_errors > MAX_DECODE_RETRIES {
                        return Err(Error::Decode(format!(
                            "Decoding failed on {} consecutive packets: {}",
                            decode_errors, e
                        )));
                    }
                    warn!("Decode error (skipping packet): {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decode error: {}", e))),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            self.scratch.clear();
            fold_to_stereo(sample_buf.samples(), channels, &mut self.scratch);

            let frames = (self.scratch.len() / 2) as u64;
            if self.skip_frames >= frames {
                self.skip_frames -= frames;
                continue;
            }
            let start = (self.skip_frames as usize) * 2;
            self.skip_frames = 0;
            out.extend_from_slice(&self.scratch[start..]);
            return Ok(true);
        }

        Ok(false)
    }
}
