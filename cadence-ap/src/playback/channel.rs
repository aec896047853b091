//! One of the engine's two fixed output channels

use crate::audio::{AudioSource, ChannelEnded, ChannelId, EndSignal, OutputPath};
use crate::error::Result;
use tokio::sync::mpsc;
use tracing::trace;

/// A single output path plus the engine-side bookkeeping for it.
///
/// Every schedule bumps `generation`; the end-of-source signal carries the
/// generation it was issued for so the engine can drop notifications from a
/// schedule that has since been replaced.
pub struct AudioChannel {
    id: ChannelId,
    path: Box<dyn OutputPath>,
    gain: f32,
    source: Option<AudioSource>,
    generation: u64,
    /// Track position the current schedule started from
    schedule_offset: f64,
    running: bool,
    end_tx: mpsc::UnboundedSender<ChannelEnded>,
}

impl AudioChannel {
    pub fn new(
        id: ChannelId,
        path: Box<dyn OutputPath>,
        end_tx: mpsc::UnboundedSender<ChannelEnded>,
    ) -> Self {
        Self {
            id,
            path,
            gain: 1.0,
            source: None,
            generation: 0,
            schedule_offset: 0.0,
            running: false,
            end_tx,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn schedule_from_start(&mut self, source: AudioSource) -> Result<u64> {
        self.schedule_from_offset(source, 0.0)
    }

    /// Bind `source` at `offset` seconds. The channel stays silent until
    /// `start()`. Returns the new schedule's generation.
    pub fn schedule_from_offset(&mut self, source: AudioSource, offset: f64) -> Result<u64> {
        self.generation += 1;
        self.running = false;
        let offset = offset.max(0.0);
        let signal = EndSignal::new(self.end_tx.clone(), self.id, self.generation);

        if let Err(e) = self.path.load(source.clone(), offset, signal) {
            self.source = None;
            return Err(e);
        }

        trace!(
            "Channel {} scheduled {} source at {:.3}s (generation {})",
            self.id,
            source.kind(),
            offset,
            self.generation
        );
        self.source = Some(source);
        self.schedule_offset = offset;
        Ok(self.generation)
    }

    pub fn start(&mut self) -> Result<()> {
        self.path.start()?;
        self.running = true;
        Ok(())
    }

    /// Stop rendering. The bound source stays for a warm restart; its end
    /// signal is dropped.
    pub fn stop(&mut self) {
        self.path.stop();
        self.running = false;
    }

    /// Stop and forget the bound source, releasing the path's schedule
    pub fn unbind(&mut self) {
        self.path.unload();
        self.running = false;
        self.source = None;
        self.schedule_offset = 0.0;
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
        self.path.set_gain(self.gain);
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn source(&self) -> Option<&AudioSource> {
        self.source.as_ref()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn schedule_offset(&self) -> f64 {
        self.schedule_offset
    }

    pub fn rendered_seconds(&self) -> f64 {
        self.path.rendered_seconds()
    }

    /// Absolute position in the bound track
    pub fn current_position_seconds(&self) -> f64 {
        self.schedule_offset + self.path.rendered_seconds()
    }
}
