//! Clock-driven output graph with no audio device
//!
//! Each path plays its source in wall-clock time measured with
//! `tokio::time::Instant`, so it follows a paused test clock exactly. End of
//! source is a spawned sleep that fires the schedule's `EndSignal` unless the
//! path was stopped or reloaded first.

use crate::audio::graph::{EndSignal, OutputBackend, OutputPath};
use crate::audio::mixer::EffectChain;
use crate::audio::source::AudioSource;
use crate::audio::types::{ChannelId, STEREO};
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Rate reported to the effect chain; nothing is rendered at it
const NOMINAL_SAMPLE_RATE: u32 = 44_100;

struct Loaded {
    /// Seconds from the schedule offset to the end of the source
    length: f64,
    offset: f64,
}

struct Slot {
    gain: f32,
    loaded: Option<Loaded>,
    end: Option<EndSignal>,
    running_since: Option<Instant>,
    accumulated: Duration,
    /// Bumped on every load/start/stop so stale end timers do nothing
    run_id: u64,
    load_count: u32,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            gain: 1.0,
            loaded: None,
            end: None,
            running_since: None,
            accumulated: Duration::ZERO,
            run_id: 0,
            load_count: 0,
        }
    }
}

impl Slot {
    fn rendered(&self) -> f64 {
        let running = self
            .running_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        let rendered = (self.accumulated + running).as_secs_f64();
        match &self.loaded {
            Some(loaded) => rendered.min(loaded.length),
            None => 0.0,
        }
    }
}

struct Shared {
    slots: [Slot; 2],
    master_gain: f32,
    effects: Option<Box<dyn EffectChain>>,
    reinit_count: u32,
    failing_loads: u32,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Output backend without a device
pub struct HeadlessBackend {
    shared: Arc<Mutex<Shared>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                slots: [Slot::default(), Slot::default()],
                master_gain: 1.0,
                effects: None,
                reinit_count: 0,
                failing_loads: 0,
            })),
        }
    }

    /// Read-only view used by tests and diagnostics
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for HeadlessBackend {
    fn path(&mut self, channel: ChannelId) -> Box<dyn OutputPath> {
        Box::new(HeadlessPath {
            channel,
            shared: Arc::clone(&self.shared),
        })
    }

    fn set_master_gain(&mut self, gain: f32) {
        lock(&self.shared).master_gain = gain.clamp(0.0, 1.0);
    }

    fn set_effects(&mut self, effects: Option<Box<dyn EffectChain>>) {
        lock(&self.shared).effects = effects;
    }

    fn reinitialize(&mut self) -> Result<()> {
        let mut shared = lock(&self.shared);
        shared.reinit_count += 1;
        debug!("Headless output reinitialized ({} times)", shared.reinit_count);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "headless"
    }
}

struct HeadlessPath {
    channel: ChannelId,
    shared: Arc<Mutex<Shared>>,
}

impl OutputPath for HeadlessPath {
    fn load(&mut self, source: AudioSource, offset_secs: f64, on_end: EndSignal) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.failing_loads > 0 {
            shared.failing_loads -= 1;
            return Err(Error::ScheduleFailed(format!(
                "headless channel {} rejected schedule",
                self.channel
            )));
        }

        let slot = &mut shared.slots[self.channel.index()];
        slot.loaded = Some(Loaded {
            length: (source.duration() - offset_secs).max(0.0),
            offset: offset_secs,
        });
        slot.end = Some(on_end);
        slot.running_since = None;
        slot.accumulated = Duration::ZERO;
        slot.run_id += 1;
        slot.load_count += 1;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let mut shared = lock(&self.shared);
        let slot = &mut shared.slots[self.channel.index()];

        let Some(loaded) = &slot.loaded else {
            return Err(Error::ScheduleFailed(format!(
                "nothing scheduled on channel {}",
                self.channel
            )));
        };
        if slot.running_since.is_some() {
            return Ok(());
        }

        let remaining = (loaded.length - slot.accumulated.as_secs_f64()).max(0.0);
        slot.running_since = Some(Instant::now());
        slot.run_id += 1;
        let run_id = slot.run_id;
        drop(shared);

        let shared = Arc::clone(&self.shared);
        let index = self.channel.index();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(remaining)).await;
            let end = {
                let mut shared = lock(&shared);
                let slot = &mut shared.slots[index];
                if slot.run_id != run_id {
                    return;
                }
                if let Some(since) = slot.running_since.take() {
                    slot.accumulated += since.elapsed();
                }
                slot.end.take()
            };
            if let Some(end) = end {
                end.fire();
            }
        });
        Ok(())
    }

    fn stop(&mut self) {
        let mut shared = lock(&self.shared);
        let slot = &mut shared.slots[self.channel.index()];
        if let Some(since) = slot.running_since.take() {
            slot.accumulated += since.elapsed();
        }
        slot.end = None;
        slot.run_id += 1;
    }

    fn unload(&mut self) {
        let mut shared = lock(&self.shared);
        let slot = &mut shared.slots[self.channel.index()];
        slot.loaded = None;
        slot.end = None;
        slot.running_since = None;
        slot.accumulated = Duration::ZERO;
        slot.run_id += 1;
    }

    fn set_gain(&mut self, gain: f32) {
        lock(&self.shared).slots[self.channel.index()].gain = gain.clamp(0.0, 1.0);
    }

    fn rendered_seconds(&self) -> f64 {
        lock(&self.shared).slots[self.channel.index()].rendered()
    }
}

/// Inspection handle onto a `HeadlessBackend`
#[derive(Clone)]
pub struct HeadlessProbe {
    shared: Arc<Mutex<Shared>>,
}

impl HeadlessProbe {
    pub fn gain(&self, channel: ChannelId) -> f32 {
        lock(&self.shared).slots[channel.index()].gain
    }

    pub fn is_running(&self, channel: ChannelId) -> bool {
        lock(&self.shared).slots[channel.index()].running_since.is_some()
    }

    pub fn master_gain(&self) -> f32 {
        lock(&self.shared).master_gain
    }

    pub fn reinit_count(&self) -> u32 {
        lock(&self.shared).reinit_count
    }

    pub fn load_count(&self, channel: ChannelId) -> u32 {
        lock(&self.shared).slots[channel.index()].load_count
    }

    /// Offset the current schedule on `channel` started from
    pub fn loaded_offset(&self, channel: ChannelId) -> Option<f64> {
        lock(&self.shared).slots[channel.index()]
            .loaded
            .as_ref()
            .map(|l| l.offset)
    }

    pub fn has_effects(&self) -> bool {
        lock(&self.shared).effects.is_some()
    }

    /// Run `block` (interleaved stereo) through the installed effect chain.
    /// Returns false when none is installed.
    pub fn apply_effects(&self, block: &mut [f32]) -> bool {
        match lock(&self.shared).effects.as_mut() {
            Some(effects) => {
                effects.process(block, STEREO, NOMINAL_SAMPLE_RATE);
                true
            }
            None => false,
        }
    }

    /// Make the next `count` schedule calls fail
    pub fn fail_next_loads(&self, count: u32) {
        lock(&self.shared).failing_loads = count;
    }
}
