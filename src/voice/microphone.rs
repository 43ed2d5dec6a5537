// Microphone capture with cpal.
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use crate::config::MicrophoneConfig;
use crate::errors::{VoxPlayError, VoxPlayResult};
use crate::voice::audio::{PhraseDetector, Utterance};
use crate::voice::listener::PhraseSource;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn voice_err(context: &str, e: impl std::fmt::Display) -> VoxPlayError {
    VoxPlayError::Voice(format!("{context}: {e}"))
}

/// Records one phrase per call from the configured input device.
pub struct CpalMicrophone {
    config: MicrophoneConfig,
}

impl CpalMicrophone {
    /// Fails when no matching input device exists.
    pub fn new(config: MicrophoneConfig) -> VoxPlayResult<Self> {
        let device = input_device(config.device.as_deref())?;
        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            "microphone ready"
        );
        Ok(Self { config })
    }
}

#[async_trait]
impl PhraseSource for CpalMicrophone {
    async fn next_phrase(&mut self) -> VoxPlayResult<Utterance> {
        let config = self.config.clone();
        // cpal streams are !Send, so the stream lives and dies on one blocking thread.
        tokio::task::spawn_blocking(move || record_phrase(&config))
            .await
            .map_err(|e| voice_err("microphone thread", e))?
    }
}

fn input_device(name: Option<&str>) -> VoxPlayResult<cpal::Device> {
    let host = cpal::default_host();
    let Some(wanted) = name else {
        return host
            .default_input_device()
            .ok_or_else(|| VoxPlayError::Voice("no default input device".to_string()));
    };

    let wanted = wanted.to_lowercase();
    let mut devices = host
        .input_devices()
        .map_err(|e| voice_err("list input devices", e))?;
    devices
        .find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(&wanted))
                .unwrap_or(false)
        })
        .ok_or_else(|| VoxPlayError::Voice(format!("no input device matching '{wanted}'")))
}

/// Blocks until a phrase has been spoken and closed by a pause. Ambient
/// noise is re-measured at the start of every call.
pub fn record_phrase(config: &MicrophoneConfig) -> VoxPlayResult<Utterance> {
    let device = input_device(config.device.as_deref())?;
    let supported = device
        .default_input_config()
        .map_err(|e| voice_err("input config", e))?;
    let sample_rate = supported.sample_rate().0;
    let channels = usize::from(supported.channels());
    let stream_config = supported.config();

    let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
    let (err_tx, err_rx) = mpsc::channel();
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &stream_config, channels, buffer.clone(), err_tx)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &stream_config, channels, buffer.clone(), err_tx)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(&device, &stream_config, channels, buffer.clone(), err_tx)
        }
        other => {
            return Err(VoxPlayError::Voice(format!(
                "unsupported input sample format {other:?}"
            )))
        }
    }?;
    stream.play().map_err(|e| voice_err("start microphone", e))?;
    tracing::debug!(sample_rate, channels, "microphone capture started");

    let mut detector = PhraseDetector::new(config, sample_rate);
    loop {
        std::thread::sleep(POLL_INTERVAL);
        if let Ok(e) = err_rx.try_recv() {
            return Err(VoxPlayError::Voice(format!("microphone stream: {e}")));
        }
        let chunk = match buffer.lock() {
            Ok(mut captured) => std::mem::take(&mut *captured),
            Err(_) => return Err(VoxPlayError::Voice("capture buffer poisoned".to_string())),
        };
        if let Some(samples) = detector.push(&chunk) {
            return Ok(Utterance {
                sample_rate,
                samples,
            });
        }
    }
}

/// Input stream that downmixes every frame to one channel of `f32`.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sink: Arc<Mutex<Vec<f32>>>,
    errors: mpsc::Sender<String>,
) -> VoxPlayResult<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let Ok(mut captured) = sink.lock() else {
                    return;
                };
                for frame in data.chunks(channels.max(1)) {
                    let sum: f32 = frame.iter().map(|&s| s.to_sample::<f32>()).sum();
                    captured.push(sum / frame.len() as f32);
                }
            },
            move |e| {
                let _ = errors.send(e.to_string());
            },
            None,
        )
        .map_err(|e| voice_err("open microphone stream", e))
}
