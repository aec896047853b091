//! Discrete, cancellable gain ramps
//!
//! A fade splits its duration into a fixed number of steps. A spawned interval
//! task sends one `FadeTick` per step into the engine's mailbox; the engine
//! hands each tick back to the controller, which answers with the gain to
//! write. The last step snaps exactly to the target and yields the fade's
//! completion, once.
//!
//! # Cancellation
//!
//! At most one fade is live per channel. Starting a fade on a channel cancels
//! the previous one, and `cancel` takes effect before the next gain write: a
//! tick whose fade id no longer matches the live operation is ignored, so a
//! tick already queued in the mailbox cannot touch the gain.

use crate::audio::ChannelId;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

/// What the engine does when a fade runs to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeCompletion {
    None,
    /// Pause fade-out finished: stop both channels
    PauseSettled,
    /// Crossfade fade-out finished: release the outgoing channel
    CrossfadeSettled,
}

/// One step of a running fade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeTick {
    pub channel: ChannelId,
    pub fade_id: u64,
}

/// Result of handing a tick to the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeStep {
    /// Stale or cancelled tick: do not touch the gain
    Ignored,
    Gain(f32),
    Completed {
        gain: f32,
        completion: FadeCompletion,
    },
}

/// Result of starting a fade
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeStart {
    /// Ticks will follow; the caller sets the starting gain now
    Running,
    /// Zero-length fade: the caller sets the target gain now and applies
    /// the completion synchronously
    Immediate(FadeCompletion),
}

#[derive(Debug)]
struct FadeOperation {
    id: u64,
    start_gain: f32,
    end_gain: f32,
    total_steps: u32,
    current_step: u32,
    cancelled: bool,
    completion: FadeCompletion,
    task: JoinHandle<()>,
}

impl FadeOperation {
    fn gain_at(&self, step: u32) -> f32 {
        if step >= self.total_steps {
            return self.end_gain;
        }
        let increment = (self.end_gain - self.start_gain) / self.total_steps as f32;
        (self.start_gain + increment * step as f32).clamp(0.0, 1.0)
    }
}

/// Per-channel fade bookkeeping
pub struct FadeController {
    ops: [Option<FadeOperation>; 2],
    next_id: u64,
    steps: u32,
    tx: mpsc::UnboundedSender<FadeTick>,
}

impl FadeController {
    pub fn new(steps: u32, tx: mpsc::UnboundedSender<FadeTick>) -> Self {
        Self {
            ops: [None, None],
            next_id: 0,
            steps: steps.max(1),
            tx,
        }
    }

    /// Start a ramp on `channel`, cancelling any fade already running there
    pub fn fade(
        &mut self,
        channel: ChannelId,
        from: f32,
        to: f32,
        duration: Duration,
        completion: FadeCompletion,
    ) -> FadeStart {
        self.cancel(channel);

        if duration.is_zero() {
            return FadeStart::Immediate(completion);
        }

        self.next_id += 1;
        let id = self.next_id;
        let steps = self.steps;
        let step_duration = duration / steps;
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + step_duration, step_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            for _ in 0..steps {
                ticker.tick().await;
                if tx.send(FadeTick { channel, fade_id: id }).is_err() {
                    break;
                }
            }
        });

        trace!(
            "Fade {} on channel {}: {:.2} -> {:.2} over {:?}",
            id,
            channel,
            from,
            to,
            duration
        );

        self.ops[channel.index()] = Some(FadeOperation {
            id,
            start_gain: from.clamp(0.0, 1.0),
            end_gain: to.clamp(0.0, 1.0),
            total_steps: steps,
            current_step: 0,
            cancelled: false,
            completion,
            task,
        });
        FadeStart::Running
    }

    /// Mark the channel's fade cancelled; its completion never runs
    pub fn cancel(&mut self, channel: ChannelId) {
        if let Some(mut op) = self.ops[channel.index()].take() {
            op.cancelled = true;
            op.task.abort();
            trace!("Fade {} on channel {} cancelled", op.id, channel);
        }
    }

    pub fn cancel_all(&mut self) {
        for channel in ChannelId::BOTH {
            self.cancel(channel);
        }
    }

    pub fn is_active(&self, channel: ChannelId) -> bool {
        self.ops[channel.index()].is_some()
    }

    /// Advance the fade a tick belongs to
    pub fn on_tick(&mut self, tick: FadeTick) -> FadeStep {
        let slot = &mut self.ops[tick.channel.index()];
        let Some(op) = slot.as_mut() else {
            return FadeStep::Ignored;
        };
        if op.id != tick.fade_id || op.cancelled {
            return FadeStep::Ignored;
        }

        op.current_step += 1;
        let gain = op.gain_at(op.current_step);

        if op.current_step >= op.total_steps {
            let completion = op.completion;
            *slot = None;
            return FadeStep::Completed { gain, completion };
        }
        FadeStep::Gain(gain)
    }
}

impl Drop for FadeController {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(
        controller: &mut FadeController,
        rx: &mut mpsc::UnboundedReceiver<FadeTick>,
    ) -> Vec<FadeStep> {
        let mut steps = Vec::new();
        loop {
            let tick = rx.recv().await.unwrap();
            let step = controller.on_tick(tick);
            let done = matches!(step, FadeStep::Completed { .. });
            steps.push(step);
            if done {
                return steps;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_twenty_steps_snap_to_target() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = FadeController::new(20, tx);

        let start = Instant::now();
        let started = controller.fade(
            ChannelId::A,
            0.0,
            1.0,
            Duration::from_secs(2),
            FadeCompletion::None,
        );
        assert_eq!(started, FadeStart::Running);

        let steps = drain(&mut controller, &mut rx).await;
        assert_eq!(steps.len(), 20);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(steps[0], FadeStep::Gain(0.05));
        assert_eq!(
            steps[19],
            FadeStep::Completed {
                gain: 1.0,
                completion: FadeCompletion::None
            }
        );
        assert!(!controller.is_active(ChannelId::A));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_fade_never_completes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = FadeController::new(20, tx);

        controller.fade(
            ChannelId::B,
            1.0,
            0.0,
            Duration::from_millis(500),
            FadeCompletion::PauseSettled,
        );
        let first = rx.recv().await.unwrap();
        assert!(matches!(controller.on_tick(first), FadeStep::Gain(_)));

        controller.cancel(ChannelId::B);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Anything that slipped into the mailbox before the abort is inert
        while let Ok(tick) = rx.try_recv() {
            assert_eq!(controller.on_tick(tick), FadeStep::Ignored);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_fade_supersedes_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = FadeController::new(4, tx);

        controller.fade(
            ChannelId::A,
            1.0,
            0.0,
            Duration::from_secs(1),
            FadeCompletion::PauseSettled,
        );
        let stale = rx.recv().await.unwrap();

        controller.fade(
            ChannelId::A,
            0.0,
            1.0,
            Duration::from_secs(1),
            FadeCompletion::None,
        );
        assert_eq!(controller.on_tick(stale), FadeStep::Ignored);

        let steps = drain(&mut controller, &mut rx).await;
        assert_eq!(
            steps.last(),
            Some(&FadeStep::Completed {
                gain: 1.0,
                completion: FadeCompletion::None
            })
        );
    }

    #[tokio::test]
    async fn test_zero_duration_is_immediate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = FadeController::new(20, tx);

        let started = controller.fade(
            ChannelId::A,
            1.0,
            0.0,
            Duration::ZERO,
            FadeCompletion::CrossfadeSettled,
        );
        assert_eq!(started, FadeStart::Immediate(FadeCompletion::CrossfadeSettled));
        assert!(!controller.is_active(ChannelId::A));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gains_stay_in_range() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = FadeController::new(20, tx);

        controller.fade(
            ChannelId::A,
            0.3,
            0.9,
            Duration::from_millis(200),
            FadeCompletion::None,
        );
        for step in drain(&mut controller, &mut rx).await {
            let gain = match step {
                FadeStep::Gain(g) | FadeStep::Completed { gain: g, .. } => g,
                FadeStep::Ignored => panic!("unexpected ignored tick"),
            };
            assert!((0.0..=1.0).contains(&gain));
        }
    }
}
