//! Position ticker
//!
//! A background interval task that nudges the engine at a fixed cadence. The
//! engine answers each tick by reading the active channel's render position,
//! publishing elapsed time, and deciding whether to start the crossfade into
//! the next queued track. The decision itself is the pure `evaluate` function.

use cadence_common::events::PlaybackState;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// A tick from a specific ticker run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionTick {
    pub run: u64,
}

/// Background interval task, started while playing
pub struct PositionTicker {
    interval: Duration,
    tx: mpsc::UnboundedSender<PositionTick>,
    task: Option<JoinHandle<()>>,
    run: u64,
}

impl PositionTicker {
    pub fn new(interval: Duration, tx: mpsc::UnboundedSender<PositionTick>) -> Self {
        Self {
            interval,
            tx,
            task: None,
            run: 0,
        }
    }

    /// Start ticking; a running ticker is left alone
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        self.run += 1;
        let run = self.run;
        let period = self.interval;
        let tx = self.tx.clone();

        self.task = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(PositionTick { run }).is_err() {
                    break;
                }
            }
        }));
        debug!("Position ticker started ({:?} interval)", period);
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Position ticker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Whether a tick belongs to the current run
    pub fn is_current(&self, tick: PositionTick) -> bool {
        self.task.is_some() && tick.run == self.run
    }
}

impl Drop for PositionTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything a tick decision depends on
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub state: PlaybackState,
    pub is_seeking: bool,
    pub is_transitioning: bool,
    pub schedule_offset: f64,
    pub rendered: f64,
    pub duration: f64,
    pub crossfade: f64,
    pub queue_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// New elapsed time to publish, if any
    pub position: Option<f64>,
    pub auto_advance: bool,
}

impl TickOutcome {
    const IDLE: TickOutcome = TickOutcome {
        position: None,
        auto_advance: false,
    };
}

/// Compute elapsed time and the auto-advance decision for one tick
pub fn evaluate(input: TickInput) -> TickOutcome {
    if input.state != PlaybackState::Playing || input.is_seeking {
        return TickOutcome::IDLE;
    }

    let mut position = (input.schedule_offset + input.rendered).max(0.0);
    if input.duration > 0.0 {
        position = position.min(input.duration);
    }

    let remaining = input.duration - position;
    let auto_advance = input.duration > 0.0
        && remaining <= input.crossfade
        && input.queue_len > 0
        && !input.is_transitioning;

    TickOutcome {
        position: Some(position),
        auto_advance,
    }
}
