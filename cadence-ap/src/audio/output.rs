//! Audio output using cpal
//!
//! `AudioOutput` opens a device and runs one stream whose callback pulls from
//! the shared `Mixer`. `CpalBackend` owns that stream on a dedicated device
//! thread (cpal streams are not `Send` on every platform) and hands out one
//! `CpalPath` per channel. Each `load` spawns a decoder thread that resamples
//! the source to the device rate and feeds a ring buffer the mixer drains.

use crate::audio::graph::{EndSignal, OutputBackend, OutputPath};
use crate::audio::mixer::{EffectChain, Mixer, SlotFeed};
use crate::audio::resampler::StreamResampler;
use crate::audio::source::AudioSource;
use crate::audio::types::{ChannelId, STEREO};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Preferred device rate when the device supports it
const PREFERRED_SAMPLE_RATE: u32 = 44_100;

/// Ring buffer length per schedule, in seconds of device-rate audio
const RING_SECONDS: usize = 2;

/// How often the device thread checks the stream error flag
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(500);

fn lock_mixer(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Audio output manager using cpal.
pub struct AudioOutput {
    device: Device,
    device_name: String,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    /// Set by the stream's error callback
    error_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device, falling back to the default device when the
    /// requested one is not present.
    pub fn open(device_name: Option<&str>, preferred_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::AudioOutput(format!("Failed to enumerate devices: {}", e))
                })?;

                match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    Some(dev) => {
                        info!("Found requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!(
                            "Requested device '{}' not found, falling back to default device",
                            name
                        );
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let (config, sample_format) = Self::get_best_config(&device, preferred_rate)?;

        info!(
            "Audio device '{}': sample_rate={}, channels={}, format={:?}",
            device_name, config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            device_name,
            config,
            sample_format,
            stream: None,
            error_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Prefer stereo f32 at `preferred_rate`, else the device default.
    fn get_best_config(
        device: &Device,
        preferred_rate: u32,
    ) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported_configs.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= preferred_rate
                && config.max_sample_rate().0 >= preferred_rate
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(preferred_rate))
                .config();
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        let sample_format = supported_config.sample_format();
        Ok((supported_config.config(), sample_format))
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    /// Build and start the stream, pulling audio from `mixer`.
    pub fn start(&mut self, mixer: Arc<Mutex<Mixer>>) -> Result<()> {
        info!("Starting audio stream on '{}'", self.device_name);

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(mixer)?,
            SampleFormat::I16 => self.build_stream::<i16>(mixer)?,
            SampleFormat::U16 => self.build_stream::<u16>(mixer)?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        self.error_flag.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn build_stream<T>(&self, mixer: Arc<Mutex<Mixer>>) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = self.config.channels as usize;
        let error_flag = Arc::clone(&self.error_flag);
        let mut block: Vec<f32> = vec![0.0; 4096 * STEREO];

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    if block.len() < frames * STEREO {
                        block.resize(frames * STEREO, 0.0);
                    }
                    let block = &mut block[..frames * STEREO];

                    // Never wait on the engine from the audio thread
                    match mixer.try_lock() {
                        Ok(mut mixer) => mixer.mix_into(block),
                        Err(_) => block.fill(0.0),
                    }

                    let pairs = data.chunks_mut(channels).zip(block.chunks_exact(STEREO));
                    for (frame, stereo) in pairs {
                        if channels == 1 {
                            frame[0] = T::from_sample((stereo[0] + stereo[1]) * 0.5);
                            continue;
                        }
                        for (i, out) in frame.iter_mut().enumerate() {
                            let value = if i < STEREO { stereo[i] } else { 0.0 };
                            *out = T::from_sample(value);
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {} - marking for recovery", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause stream: {}", e);
            }
        }
    }
}

enum DeviceRequest {
    Rebuild,
    Shutdown,
}

/// Output backend driving a real audio device
pub struct CpalBackend {
    device_name: Option<String>,
    mixer: Arc<Mutex<Mixer>>,
    control: std_mpsc::Sender<DeviceRequest>,
}

impl CpalBackend {
    /// Open the device and start its stream.
    ///
    /// Blocks until the device thread reports that the stream is running.
    pub fn new(device_name: Option<String>) -> Result<Self> {
        let output = AudioOutput::open(device_name.as_deref(), PREFERRED_SAMPLE_RATE)?;
        let mixer = Arc::new(Mutex::new(Mixer::new(output.sample_rate())));

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let control = spawn_device_thread(
            output,
            device_name.clone(),
            Arc::clone(&mixer),
            Some(ready_tx),
        )?;

        ready_rx.recv().map_err(|_| {
            Error::AudioOutput("Audio device thread exited during start-up".to_string())
        })??;

        Ok(Self {
            device_name,
            mixer,
            control,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        lock_mixer(&self.mixer).sample_rate()
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        let _ = self.control.send(DeviceRequest::Shutdown);
    }
}

fn spawn_device_thread(
    mut output: AudioOutput,
    device_name: Option<String>,
    mixer: Arc<Mutex<Mixer>>,
    ready: Option<std_mpsc::Sender<Result<()>>>,
) -> Result<std_mpsc::Sender<DeviceRequest>> {
    let (control_tx, control_rx) = std_mpsc::channel();

    thread::Builder::new()
        .name("cadence-audio-device".to_string())
        .spawn(move || {
            let started = output.start(Arc::clone(&mixer));
            let failed = started.is_err();
            match ready {
                Some(ready) => {
                    let _ = ready.send(started);
                }
                None => {
                    if let Err(e) = started {
                        error!("Audio stream restart failed: {}", e);
                    }
                }
            }
            if failed {
                return;
            }

            loop {
                let rebuild = match control_rx.recv_timeout(HEALTH_CHECK_INTERVAL) {
                    Ok(DeviceRequest::Rebuild) => true,
                    Ok(DeviceRequest::Shutdown)
                    | Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(std_mpsc::RecvTimeoutError::Timeout) => output.has_error(),
                };
                if !rebuild {
                    continue;
                }

                warn!("Rebuilding audio stream on '{}'", output.device_name());
                output.stop();
                let rate = lock_mixer(&mixer).sample_rate();
                match AudioOutput::open(device_name.as_deref(), rate) {
                    Ok(reopened) => {
                        if reopened.sample_rate() != rate {
                            warn!(
                                "Device rate changed from {} to {} Hz; \
                                 pitch is off until the next schedule",
                                rate,
                                reopened.sample_rate()
                            );
                        }
                        output = reopened;
                    }
                    Err(e) => {
                        error!("Failed to reopen audio device: {}", e);
                        continue;
                    }
                }
                match output.start(Arc::clone(&mixer)) {
                    Ok(()) => info!("Audio stream recovery successful"),
                    Err(e) => error!("Audio stream recovery failed: {}", e),
                }
            }

            output.stop();
            debug!("Audio device thread exiting");
        })
        .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio device thread: {}", e)))?;

    Ok(control_tx)
}

impl OutputBackend for CpalBackend {
    fn path(&mut self, channel: ChannelId) -> Box<dyn OutputPath> {
        Box::new(CpalPath {
            channel,
            mixer: Arc::clone(&self.mixer),
        })
    }

    fn set_master_gain(&mut self, gain: f32) {
        lock_mixer(&self.mixer).set_master_gain(gain);
    }

    fn set_effects(&mut self, effects: Option<Box<dyn EffectChain>>) {
        lock_mixer(&self.mixer).set_effects(effects);
    }

    /// Ask the device thread to rebuild its stream; respawn it if it died.
    fn reinitialize(&mut self) -> Result<()> {
        if self.control.send(DeviceRequest::Rebuild).is_ok() {
            return Ok(());
        }

        warn!("Audio device thread is gone, reopening device");
        let rate = lock_mixer(&self.mixer).sample_rate();
        let output = AudioOutput::open(self.device_name.as_deref(), rate)?;
        self.control = spawn_device_thread(
            output,
            self.device_name.clone(),
            Arc::clone(&self.mixer),
            None,
        )?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

struct CpalPath {
    channel: ChannelId,
    mixer: Arc<Mutex<Mixer>>,
}

impl OutputPath for CpalPath {
    fn load(&mut self, source: AudioSource, offset_secs: f64, on_end: EndSignal) -> Result<()> {
        let device_rate = lock_mixer(&self.mixer).sample_rate();
        let rb = HeapRb::<f32>::new(device_rate as usize * STEREO * RING_SECONDS);
        let (producer, consumer) = rb.split();

        let producer_done = Arc::new(AtomicBool::new(false));
        let cancel = Arc::new(AtomicBool::new(false));

        let feeder = Feeder {
            source,
            offset_secs,
            device_rate,
            producer,
            producer_done: Arc::clone(&producer_done),
            cancel: Arc::clone(&cancel),
        };
        thread::Builder::new()
            .name(format!("cadence-feed-{}", self.channel))
            .spawn(move || feeder.run())
            .map_err(|e| Error::ScheduleFailed(format!("Failed to spawn decoder thread: {}", e)))?;

        lock_mixer(&self.mixer).attach(
            self.channel,
            SlotFeed {
                consumer,
                producer_done,
                cancel,
                end: Some(on_end),
            },
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let mut mixer = lock_mixer(&self.mixer);
        if !mixer.is_attached(self.channel) {
            return Err(Error::ScheduleFailed(format!(
                "nothing scheduled on channel {}",
                self.channel
            )));
        }
        mixer.set_running(self.channel, true);
        Ok(())
    }

    fn stop(&mut self) {
        lock_mixer(&self.mixer).halt(self.channel);
    }

    fn unload(&mut self) {
        lock_mixer(&self.mixer).detach(self.channel);
    }

    fn set_gain(&mut self, gain: f32) {
        lock_mixer(&self.mixer).set_gain(self.channel, gain);
    }

    fn rendered_seconds(&self) -> f64 {
        lock_mixer(&self.mixer).rendered_seconds(self.channel)
    }
}

/// Decoder thread body for one schedule
struct Feeder {
    source: AudioSource,
    offset_secs: f64,
    device_rate: u32,
    producer: ringbuf::HeapProd<f32>,
    producer_done: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl Feeder {
    fn run(mut self) {
        if let Err(e) = self.pump() {
            error!("Decoder thread failed: {}", e);
        }
        self.producer_done.store(true, Ordering::Release);
    }

    fn pump(&mut self) -> Result<()> {
        let mut reader = self.source.open_reader(self.offset_secs)?;
        let mut resampler = StreamResampler::new(reader.sample_rate(), self.device_rate)?;
        let mut decoded = Vec::new();
        let mut resampled = Vec::new();

        loop {
            if self.cancel.load(Ordering::Acquire) {
                return Ok(());
            }

            decoded.clear();
            resampled.clear();
            let more = reader.read_chunk(&mut decoded)?;
            resampler.process(&decoded, &mut resampled)?;
            if !more {
                resampler.flush(&mut resampled)?;
            }

            if !self.push_all(&resampled) || !more {
                return Ok(());
            }
        }
    }

    /// Push everything, backing off while the ring is full.
    /// Returns false if cancelled.
    fn push_all(&mut self, mut samples: &[f32]) -> bool {
        while !samples.is_empty() {
            if self.cancel.load(Ordering::Acquire) {
                return false;
            }
            let pushed = self.producer.push_slice(samples);
            samples = &samples[pushed..];
            if pushed == 0 {
                thread::sleep(Duration::from_millis(5));
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires audio hardware
    fn test_list_devices() {
        let devices = AudioOutput::list_devices().unwrap();
        assert!(!devices.is_empty());
    }

    #[test]
    fn test_feeder_fills_ring_and_finishes() {
        use crate::audio::types::PcmBuffer;

        let rb = HeapRb::<f32>::new(100_000);
        let (producer, mut consumer) = rb.split();
        let done = Arc::new(AtomicBool::new(false));
        let feeder = Feeder {
            source: AudioSource::buffered(PcmBuffer::silence(1.0, 8000)),
            offset_secs: 0.5,
            device_rate: 8000,
            producer,
            producer_done: Arc::clone(&done),
            cancel: Arc::new(AtomicBool::new(false)),
        };
        feeder.run();

        assert!(done.load(Ordering::Acquire));
        assert_eq!(consumer.occupied_len(), 4000 * STEREO);
        let mut sink = vec![0.0; 10];
        assert_eq!(consumer.pop_slice(&mut sink), 10);
    }

    #[test]
    fn test_cancelled_feeder_stops_early() {
        use crate::audio::types::PcmBuffer;

        let rb = HeapRb::<f32>::new(64);
        let (producer, _consumer) = rb.split();
        let cancel = Arc::new(AtomicBool::new(true));
        let done = Arc::new(AtomicBool::new(false));
        let feeder = Feeder {
            source: AudioSource::buffered(PcmBuffer::silence(10.0, 8000)),
            offset_secs: 0.0,
            device_rate: 8000,
            producer,
            producer_done: Arc::clone(&done),
            cancel,
        };
        feeder.run();
        assert!(done.load(Ordering::Acquire));
    }
}
