//! Output graph abstraction
//!
//! The engine drives two `OutputPath`s (channels A and B) that feed one shared
//! mixer. Implementations: `CpalBackend` for a real device, `HeadlessBackend`
//! for tests and device-less runs.

use crate::audio::mixer::EffectChain;
use crate::audio::source::AudioSource;
use crate::audio::types::ChannelId;
use crate::error::Result;
use tokio::sync::mpsc;
use tracing::trace;

/// A channel's scheduled source reached its natural end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEnded {
    pub channel: ChannelId,
    /// Generation of the schedule that ended
    pub generation: u64,
}

/// One-shot end-of-source notification for a single schedule.
///
/// Consumed when fired, so a schedule can report its end at most once.
/// Dropping it without firing (explicit `stop()`, re-schedule) reports nothing.
#[derive(Debug)]
pub struct EndSignal {
    tx: mpsc::UnboundedSender<ChannelEnded>,
    ended: ChannelEnded,
}

impl EndSignal {
    pub fn new(
        tx: mpsc::UnboundedSender<ChannelEnded>,
        channel: ChannelId,
        generation: u64,
    ) -> Self {
        Self {
            tx,
            ended: ChannelEnded {
                channel,
                generation,
            },
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.ended.channel
    }

    pub fn generation(&self) -> u64 {
        self.ended.generation
    }

    /// Deliver the notification to the engine's mailbox.
    ///
    /// Safe to call from the audio callback: sending on an unbounded
    /// channel never blocks.
    pub fn fire(self) {
        trace!(
            "End of source on channel {} (generation {})",
            self.ended.channel,
            self.ended.generation
        );
        // The engine may already have shut down; nothing to notify then.
        let _ = self.tx.send(self.ended);
    }
}

/// A single output path bound to the shared mixer
pub trait OutputPath: Send {
    /// Bind `source` starting at `offset_secs`, replacing any previous
    /// schedule. The path stays silent until `start()`.
    ///
    /// Errors here are schedule failures.
    fn load(&mut self, source: AudioSource, offset_secs: f64, on_end: EndSignal) -> Result<()>;

    /// Begin rendering the bound source
    fn start(&mut self) -> Result<()>;

    /// Stop rendering and drop the pending end signal without firing it
    fn stop(&mut self);

    /// Stop and release the schedule, along with any decoding behind it.
    /// `start()` fails until the next `load`.
    fn unload(&mut self);

    fn set_gain(&mut self, gain: f32);

    /// Seconds rendered since the current schedule was loaded
    fn rendered_seconds(&self) -> f64;
}

/// The device-level side of the graph
pub trait OutputBackend: Send {
    /// Handle to one of the two channel paths
    fn path(&mut self, channel: ChannelId) -> Box<dyn OutputPath>;

    fn set_master_gain(&mut self, gain: f32);

    /// Install or remove the effect insert run on the summed signal
    fn set_effects(&mut self, effects: Option<Box<dyn EffectChain>>);

    /// Tear down and rebuild the device stream after a schedule failure
    fn reinitialize(&mut self) -> Result<()>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_signal_delivers_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let signal = EndSignal::new(tx, ChannelId::B, 7);
        assert_eq!(signal.channel(), ChannelId::B);
        signal.fire();

        let ended = rx.try_recv().unwrap();
        assert_eq!(
            ended,
            ChannelEnded {
                channel: ChannelId::B,
                generation: 7
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_signal_is_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(EndSignal::new(tx, ChannelId::A, 1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fire_after_receiver_gone_is_harmless() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        EndSignal::new(tx, ChannelId::A, 1).fire();
    }
}
