//! Output streams for the playback multiplexer
//!
//! Every playback instance owns one cpal output stream on its own thread.
//! cpal streams are not `Send` on every platform, so the thread builds the
//! stream, reports back once the device is bound, and then takes start and
//! stop requests over a channel.

use crate::audio::cpal_backend::CpalEnumerator;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Stream, StreamConfig as CpalStreamConfig};
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use soundboard_core::domain::audio::{AudioError, DecodedAudio, DeviceId, Result};
use soundboard_core::domain::playback::{AudioSink, PlaybackInstance};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

const CONTROL_POLL: Duration = Duration::from_millis(50);

/// Simple resampler using linear interpolation
pub struct Resampler {
    channels: usize,
    ratio: f64,
    position: f64,
}

impl Resampler {
    pub fn new(source_rate: u32, target_rate: u32, channels: u16) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(AudioError::UnsupportedConfiguration(format!(
                "cannot resample {}Hz -> {}Hz",
                source_rate, target_rate
            )));
        }

        let channels = channels.max(1) as usize;
        if source_rate == target_rate {
            debug!(
                "Source and target rates match ({}Hz), bypassing resampling",
                source_rate
            );
            return Ok(Self {
                channels,
                ratio: 1.0,
                position: 0.0,
            });
        }

        debug!(
            "Creating resampler: {}Hz -> {}Hz, {} channels",
            source_rate, target_rate, channels
        );

        Ok(Self {
            channels,
            ratio: target_rate as f64 / source_rate as f64,
            position: 0.0,
        })
    }

    /// Samples needed to hold the resampled form of `input_len` samples
    pub fn output_len(&self, input_len: usize) -> usize {
        let frames = input_len / self.channels;
        ((frames as f64 * self.ratio).ceil() as usize + 1) * self.channels
    }

    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> Result<usize> {
        if self.ratio == 1.0 {
            let to_copy = input.len().min(output.len());
            output[..to_copy].copy_from_slice(&input[..to_copy]);
            return Ok(to_copy);
        }

        let input_frames = input.len() / self.channels;
        if input_frames == 0 {
            return Ok(0);
        }
        let max_output_frames = output.len() / self.channels;

        let mut output_frame = 0;

        while self.position < input_frames as f64 && output_frame < max_output_frames {
            let i0 = self.position.floor() as usize;
            let i1 = (i0 + 1).min(input_frames - 1);
            let frac = (self.position - i0 as f64) as f32;

            for ch in 0..self.channels {
                let s0 = input[i0 * self.channels + ch];
                let s1 = input[i1 * self.channels + ch];
                output[output_frame * self.channels + ch] = s0 + frac * (s1 - s0);
            }

            output_frame += 1;
            self.position += self.ratio.recip();
        }

        if self.position >= input_frames as f64 {
            self.position -= input_frames as f64;
        }

        Ok(output_frame * self.channels)
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }
}

/// Map interleaved samples from one channel count to another.
///
/// Mono is spread to every output channel and anything folded down to mono is
/// averaged. Otherwise shared channels are copied and extra outputs stay silent.
pub fn remap_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    let (from, to) = (from.max(1) as usize, to.max(1) as usize);
    if from == to {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
            continue;
        }
        for ch in 0..to {
            let sample = if from == 1 {
                frame[0]
            } else if ch < from {
                frame[ch]
            } else {
                0.0
            };
            out.push(sample);
        }
    }
    out
}

/// Convert decoded audio to a device's channel count and sample rate
pub fn convert_for_device(audio: &DecodedAudio, channels: u16, sample_rate: u32) -> Result<Vec<f32>> {
    let remapped = remap_channels(audio.samples(), audio.channels(), channels);
    let mut resampler = Resampler::new(audio.sample_rate(), sample_rate, channels)?;
    if resampler.ratio() == 1.0 {
        return Ok(remapped);
    }

    let mut output = vec![0.0; resampler.output_len(remapped.len())];
    let written = resampler.process(&remapped, &mut output)?;
    output.truncate(written);
    Ok(output)
}

/// Output format of a bound device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

enum Control {
    Start(Arc<DecodedAudio>),
    Stop,
}

/// Opens cpal output streams by device id
#[derive(Debug, Clone, Default)]
pub struct CpalSink {
    enumerator: CpalEnumerator,
}

impl CpalSink {
    pub fn new(enumerator: CpalEnumerator) -> Self {
        Self { enumerator }
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    #[instrument(skip(self), fields(device = %device))]
    async fn bind(&self, device: &DeviceId) -> Result<Box<dyn PlaybackInstance>> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (control_tx, control_rx) = unbounded();
        let finished = Arc::new(AtomicBool::new(false));

        let enumerator = self.enumerator;
        let id = device.clone();
        let thread_finished = finished.clone();
        std::thread::Builder::new()
            .name(format!("output {}", device))
            .spawn(move || run_output(enumerator, id, control_rx, thread_finished, ready_tx))
            .map_err(|e| AudioError::StreamError(format!("Failed to spawn output thread: {}", e)))?;

        let format = ready_rx
            .await
            .map_err(|_| AudioError::StreamError("Output thread exited".to_string()))??;
        debug!(channels = format.channels, sample_rate = format.sample_rate, "Output bound");

        Ok(Box::new(CpalInstance {
            device: device.clone(),
            control: control_tx,
            finished,
        }))
    }
}

/// Handle to one output stream thread
pub struct CpalInstance {
    device: DeviceId,
    control: Sender<Control>,
    finished: Arc<AtomicBool>,
}

impl PlaybackInstance for CpalInstance {
    fn start(&mut self, audio: Arc<DecodedAudio>) -> Result<()> {
        self.control
            .send(Control::Start(audio))
            .map_err(|_| AudioError::StreamError(format!("Output {} is closed", self.device)))
    }

    fn stop(&mut self) {
        // A closed channel means the thread already finished
        let _ = self.control.send(Control::Stop);
        self.finished.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Samples queued for the audio callback and how far it got
struct Playhead {
    feed: Receiver<Vec<f32>>,
    samples: Vec<f32>,
    position: usize,
    started: bool,
    finished: Arc<AtomicBool>,
}

impl Playhead {
    fn next(&mut self) -> f32 {
        if !self.started {
            match self.feed.try_recv() {
                Ok(samples) => {
                    self.samples = samples;
                    self.started = true;
                }
                Err(_) => return 0.0,
            }
        }

        if self.finished.load(Ordering::Relaxed) {
            return 0.0;
        }

        match self.samples.get(self.position) {
            Some(&sample) => {
                self.position += 1;
                sample
            }
            None => {
                self.finished.store(true, Ordering::SeqCst);
                0.0
            }
        }
    }
}

fn run_output(
    enumerator: CpalEnumerator,
    device: DeviceId,
    control: Receiver<Control>,
    finished: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<OutputFormat>>,
) {
    let (feed_tx, feed_rx) = bounded(1);
    let playhead = Playhead {
        feed: feed_rx,
        samples: Vec::new(),
        position: 0,
        started: false,
        finished: finished.clone(),
    };

    let (stream, format) = match open_stream(&enumerator, &device, playhead) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(format)).is_err() {
        // bind was abandoned
        return;
    }

    loop {
        match control.recv_timeout(CONTROL_POLL) {
            Ok(Control::Start(audio)) => {
                let samples = match convert_for_device(&audio, format.channels, format.sample_rate) {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!(device = %device, error = %e, "Could not convert audio for device");
                        finished.store(true, Ordering::SeqCst);
                        break;
                    }
                };
                let _ = feed_tx.try_send(samples);
                if let Err(e) = stream.play() {
                    error!(device = %device, error = %e, "Failed to start stream");
                    finished.store(true, Ordering::SeqCst);
                    break;
                }
                debug!(device = %device, "Playback started");
            }
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if finished.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
    }

    finished.store(true, Ordering::SeqCst);
    debug!(device = %device, "Output stream closed");
}

fn open_stream(
    enumerator: &CpalEnumerator,
    device: &DeviceId,
    playhead: Playhead,
) -> Result<(Stream, OutputFormat)> {
    let cpal_device = enumerator.open_output(device)?;
    let supported = cpal_device
        .default_output_config()
        .map_err(|e| AudioError::UnsupportedConfiguration(e.to_string()))?;

    let format = OutputFormat {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
    };
    info!(
        device = %device,
        channels = format.channels,
        sample_rate = format.sample_rate,
        "Creating output stream"
    );

    let config: CpalStreamConfig = supported.config();
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&cpal_device, &config, playhead, device)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&cpal_device, &config, playhead, device)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&cpal_device, &config, playhead, device)?,
        cpal::SampleFormat::I32 => build_stream::<i32>(&cpal_device, &config, playhead, device)?,
        format => {
            return Err(AudioError::UnsupportedConfiguration(format!(
                "Unsupported sample format: {:?}",
                format
            )))
        }
    };

    Ok((stream, format))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    cpal_device: &cpal::Device,
    config: &CpalStreamConfig,
    mut playhead: Playhead,
    device: &DeviceId,
) -> Result<Stream> {
    let finished = playhead.finished.clone();
    let name = device.clone();

    cpal_device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    *sample = T::from_sample(playhead.next());
                }
            },
            move |err| {
                error!(device = %name, "Output stream error: {}", err);
                finished.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build stream: {}", e)))
}
