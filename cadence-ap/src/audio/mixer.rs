//! Two-slot mixer shared by the device callback and the channel paths
//!
//! Each slot drains a ring buffer filled by its decoder thread. The mixer sums
//! both slots with their gains, runs the optional effect chain, then applies
//! master gain and clamps. It runs on the real-time audio thread: no
//! allocation after construction and no blocking.

use crate::audio::graph::EndSignal;
use crate::audio::types::{ChannelId, STEREO};
use ringbuf::{traits::*, HeapCons};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Externally configured effect insert (equalizer and the like).
///
/// The mixer calls it on the summed signal before master gain; the engine
/// never inspects it.
pub trait EffectChain: Send {
    fn process(&mut self, samples: &mut [f32], channels: usize, sample_rate: u32);
}

/// Consumer side of one schedule's decoded audio
pub struct SlotFeed {
    pub consumer: HeapCons<f32>,
    /// Set by the decoder thread after its last push
    pub producer_done: Arc<AtomicBool>,
    /// Set by the mixer side to stop the decoder thread early
    pub cancel: Arc<AtomicBool>,
    pub end: Option<EndSignal>,
}

impl Drop for SlotFeed {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Release);
    }
}

#[derive(Default)]
struct MixSlot {
    gain: f32,
    running: bool,
    feed: Option<SlotFeed>,
    rendered_frames: u64,
}

/// Mixer state, guarded by a mutex shared with the output stream
pub struct Mixer {
    slots: [MixSlot; 2],
    master_gain: f32,
    effects: Option<Box<dyn EffectChain>>,
    sample_rate: u32,
    scratch: Vec<f32>,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            slots: [
                MixSlot {
                    gain: 1.0,
                    ..Default::default()
                },
                MixSlot {
                    gain: 1.0,
                    ..Default::default()
                },
            ],
            master_gain: 1.0,
            effects: None,
            sample_rate,
            scratch: vec![0.0; 8192],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Replace a slot's schedule; the new one is silent until started
    pub fn attach(&mut self, channel: ChannelId, feed: SlotFeed) {
        let slot = &mut self.slots[channel.index()];
        slot.feed = Some(feed);
        slot.running = false;
        slot.rendered_frames = 0;
    }

    /// Whether a schedule is bound to the slot
    pub fn is_attached(&self, channel: ChannelId) -> bool {
        self.slots[channel.index()].feed.is_some()
    }

    pub fn set_running(&mut self, channel: ChannelId, running: bool) {
        self.slots[channel.index()].running = running;
    }

    /// Stop a slot and drop its end signal without firing it
    pub fn halt(&mut self, channel: ChannelId) {
        let slot = &mut self.slots[channel.index()];
        slot.running = false;
        if let Some(feed) = slot.feed.as_mut() {
            feed.end = None;
        }
    }

    /// Stop a slot and drop its schedule; the decoder thread is cancelled
    pub fn detach(&mut self, channel: ChannelId) {
        let slot = &mut self.slots[channel.index()];
        slot.running = false;
        slot.feed = None;
        slot.rendered_frames = 0;
    }

    pub fn set_gain(&mut self, channel: ChannelId, gain: f32) {
        self.slots[channel.index()].gain = gain.clamp(0.0, 1.0);
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain.clamp(0.0, 1.0);
    }

    pub fn set_effects(&mut self, effects: Option<Box<dyn EffectChain>>) {
        self.effects = effects;
    }

    pub fn rendered_seconds(&self, channel: ChannelId) -> f64 {
        self.slots[channel.index()].rendered_frames as f64 / self.sample_rate as f64
    }

    /// Fill `out` (interleaved stereo) with the next block of mixed audio
    pub fn mix_into(&mut self, out: &mut [f32]) {
        out.fill(0.0);

        if self.scratch.len() < out.len() {
            // Only reached if the device asks for an unusually large block
            self.scratch.resize(out.len(), 0.0);
        }

        for slot in self.slots.iter_mut() {
            if !slot.running {
                continue;
            }
            let Some(feed) = slot.feed.as_mut() else {
                continue;
            };

            let wanted = out.len();
            let popped = feed.consumer.pop_slice(&mut self.scratch[..wanted]);
            let popped = popped - popped % STEREO;
            let gain = slot.gain;
            for (o, s) in out[..popped].iter_mut().zip(&self.scratch[..popped]) {
                *o += s * gain;
            }
            slot.rendered_frames += (popped / STEREO) as u64;

            if popped < wanted
                && feed.producer_done.load(Ordering::Acquire)
                && feed.consumer.is_empty()
            {
                slot.running = false;
                if let Some(end) = feed.end.take() {
                    end.fire();
                }
            }
        }

        if let Some(effects) = self.effects.as_mut() {
            effects.process(out, STEREO, self.sample_rate);
        }

        let master = self.master_gain;
        for sample in out.iter_mut() {
            *sample = (*sample * master).clamp(-1.0, 1.0);
        }
    }
}
