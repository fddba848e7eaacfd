//! Audible alert playback.
//!
//! Two tiers share one cpal player: [`ClipChime`] loops a caller-supplied
//! PCM clip, [`SynthChime`] renders a bell strike procedurally so alerts
//! still sound when no clip asset is available. [`ChimeChain`] tries the
//! tiers in order and stops at the first that starts.
//!
//! cpal's `Stream` is not `Send`, so each playback runs on a dedicated
//! OS thread that owns the stream for its whole lifetime. Start results
//! are reported back over a channel before the caller returns.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::{PipelineError, PipelineResult};

/// How long to wait for the playback thread to report stream creation.
const STREAM_READY_TIMEOUT: Duration = Duration::from_secs(2);

/// One audio tier.
pub trait Chime: Send + Sync {
    /// Stable tier name for logs and fallback reporting.
    fn name(&self) -> &str;

    /// Begin looping playback. Must not block on the audio device
    /// beyond stream setup. Idempotent while already playing.
    fn start(&self) -> PipelineResult<()>;

    /// Stop playback and release the device.
    fn stop(&self);
}

/// Render a single bell strike as mono f32 PCM at the given rate.
///
/// Fundamental near 830 Hz with two overtones, exponentially decayed.
/// Amplitudes sum below 1.0 so the mix never clips.
pub fn synthesize_bell(sample_rate: u32) -> Vec<f32> {
    const STRIKE_SECS: f32 = 1.2;
    const FUNDAMENTAL_HZ: f32 = 830.0;
    const DECAY_TAU: f32 = 0.35;
    const PARTIALS: [(f32, f32); 3] = [(1.0, 0.6), (2.0, 0.25), (3.0, 0.12)];

    let frames = (sample_rate as f32 * STRIKE_SECS) as usize;
    let mut pcm = Vec::with_capacity(frames);
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let envelope = (-t / DECAY_TAU).exp();
        let mut sample = 0.0f32;
        for (ratio, amplitude) in PARTIALS {
            sample += amplitude
                * (2.0 * std::f32::consts::PI * FUNDAMENTAL_HZ * ratio * t).sin();
        }
        pcm.push(sample * envelope);
    }
    pcm
}

/// Renders the mono PCM to loop, at the device's sample rate.
type Renderer = Arc<dyn Fn(u32) -> Vec<f32> + Send + Sync>;

/// Shared cpal playback driver.
///
/// Owns no stream itself; `start` spawns a thread that builds and holds
/// the stream, and `stop` signals that thread to drop it.
struct CpalPlayer {
    label: String,
    renderer: Renderer,
    /// Silence inserted after each pass through the clip.
    repeat_gap: Duration,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl CpalPlayer {
    fn new(label: impl Into<String>, renderer: Renderer, repeat_gap: Duration) -> Self {
        Self {
            label: label.into(),
            renderer,
            repeat_gap,
            stop_tx: Mutex::new(None),
        }
    }

    fn start(&self) -> PipelineResult<()> {
        let mut guard = self.stop_tx.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<PipelineResult<()>>();
        let renderer = Arc::clone(&self.renderer);
        let repeat_gap = self.repeat_gap;
        let thread_name = format!("chime-{}", self.label);

        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                match build_stream(renderer, repeat_gap) {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            let _ = ready_tx.send(Err(PipelineError::Audio(e.to_string())));
                            return;
                        }
                        let _ = ready_tx.send(Ok(()));
                        // Keep the stream alive until stop (or the
                        // sender is dropped on player teardown).
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| PipelineError::Audio(format!("playback thread spawn failed: {e}")))?;

        match ready_rx.recv_timeout(STREAM_READY_TIMEOUT) {
            Ok(Ok(())) => {
                *guard = Some(stop_tx);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PipelineError::Audio(
                "audio device did not respond in time".into(),
            )),
        }
    }

    fn stop(&self) {
        // Dropping the sender unblocks the playback thread's recv.
        self.stop_tx.lock().unwrap().take();
    }
}

fn build_stream(renderer: Renderer, repeat_gap: Duration) -> PipelineResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PipelineError::Audio("no audio output device available".into()))?;
    let config = device
        .default_output_config()
        .map_err(|e| PipelineError::Audio(e.to_string()))?;
    if config.sample_format() != cpal::SampleFormat::F32 {
        return Err(PipelineError::Audio(format!(
            "unsupported sample format: {:?}",
            config.sample_format()
        )));
    }

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let pcm = renderer(sample_rate);
    if pcm.is_empty() {
        return Err(PipelineError::Audio("rendered clip is empty".into()));
    }
    let gap_frames = (sample_rate as u64 * repeat_gap.as_millis() as u64 / 1000) as usize;
    let period = pcm.len() + gap_frames;
    let position = AtomicUsize::new(0);

    let config: cpal::StreamConfig = config.into();
    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let pos = position.fetch_add(1, Ordering::Relaxed) % period;
                    let value = pcm.get(pos).copied().unwrap_or(0.0);
                    for sample in frame {
                        *sample = value;
                    }
                }
            },
            |err| tracing::error!("Audio stream error: {err}"),
            None,
        )
        .map_err(|e| PipelineError::Audio(e.to_string()))
}

/// Primary tier: loops a caller-supplied mono PCM clip back to back.
pub struct ClipChime {
    player: CpalPlayer,
}

impl ClipChime {
    pub fn new(pcm: Vec<f32>, pcm_rate: u32) -> Self {
        let pcm = Arc::new(pcm);
        let renderer: Renderer = Arc::new(move |device_rate| {
            resample_nearest(&pcm, pcm_rate, device_rate)
        });
        Self {
            player: CpalPlayer::new("clip", renderer, Duration::ZERO),
        }
    }
}

impl Chime for ClipChime {
    fn name(&self) -> &str {
        "clip"
    }

    fn start(&self) -> PipelineResult<()> {
        self.player.start()
    }

    fn stop(&self) {
        self.player.stop()
    }
}

/// Fallback tier: procedurally synthesized bell, repeated with a gap.
pub struct SynthChime {
    player: CpalPlayer,
}

impl SynthChime {
    pub fn new(repeat_gap: Duration) -> Self {
        let renderer: Renderer = Arc::new(synthesize_bell);
        Self {
            player: CpalPlayer::new("synth", renderer, repeat_gap),
        }
    }
}

impl Chime for SynthChime {
    fn name(&self) -> &str {
        "synth"
    }

    fn start(&self) -> PipelineResult<()> {
        self.player.start()
    }

    fn stop(&self) {
        self.player.stop()
    }
}

/// Ordered fallback chain over audio tiers.
pub struct ChimeChain {
    tiers: Vec<Arc<dyn Chime>>,
    active: Mutex<Option<Arc<dyn Chime>>>,
}

impl ChimeChain {
    pub fn new(tiers: Vec<Arc<dyn Chime>>) -> Self {
        Self {
            tiers,
            active: Mutex::new(None),
        }
    }

    /// Default storefront chain: clip first when one is provided, the
    /// synthesized bell as fallback.
    pub fn standard(clip: Option<ClipChime>, repeat_gap: Duration) -> Self {
        let mut tiers: Vec<Arc<dyn Chime>> = Vec::new();
        if let Some(clip) = clip {
            tiers.push(Arc::new(clip));
        }
        tiers.push(Arc::new(SynthChime::new(repeat_gap)));
        Self::new(tiers)
    }

    /// Start the first tier that works. Returns that tier's name.
    /// Errors only when every tier failed.
    pub fn start(&self) -> PipelineResult<String> {
        let mut active = self.active.lock().unwrap();
        if let Some(playing) = active.as_ref() {
            return Ok(playing.name().to_string());
        }
        let mut last_error = None;
        for tier in &self.tiers {
            match tier.start() {
                Ok(()) => {
                    let name = tier.name().to_string();
                    *active = Some(Arc::clone(tier));
                    return Ok(name);
                }
                Err(e) => {
                    tracing::warn!(tier = tier.name(), error = %e, "Audio tier failed, trying next");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| PipelineError::Audio("no audio tiers configured".into())))
    }

    pub fn stop(&self) {
        if let Some(playing) = self.active.lock().unwrap().take() {
            playing.stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }
}

fn resample_nearest(pcm: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || pcm.is_empty() {
        return pcm.to_vec();
    }
    let frames = (pcm.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    (0..frames)
        .map(|i| {
            let src = (i as u64 * from_rate as u64 / to_rate as u64) as usize;
            pcm[src.min(pcm.len() - 1)]
        })
        .collect()
}
