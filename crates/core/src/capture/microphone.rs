use crate::capture::{AudioStream, CaptureError, CaptureSource, SampleTap};
use crate::decode::i16_to_f32_pcm;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

/// Seconds of audio kept in the tap; the analyzer only reads the newest window.
const TAP_SECONDS: u32 = 1;

pub fn list_input_devices() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::Backend(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

#[derive(Clone, Debug, Default)]
pub struct MicrophoneSource {
    device_name: Option<String>,
}

impl MicrophoneSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device_name<S: Into<String>>(mut self, name: S) -> Self {
        self.device_name = Some(name.into());
        self
    }
}

impl CaptureSource for MicrophoneSource {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn AudioStream>, CaptureError>> {
        let device_name = self.device_name.clone();
        async move {
            let stream = MicrophoneStream::spawn(device_name).await?;
            Ok(Box::new(stream) as Box<dyn AudioStream>)
        }
        .boxed()
    }
}

/// Platform input streams are not `Send`, so a dedicated thread owns the
/// cpal stream and feeds a [`SampleTap`] until it is told to shut down.
pub struct MicrophoneStream {
    tap: SampleTap,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneStream {
    async fn spawn(device_name: Option<String>) -> Result<Self, CaptureError> {
        let tap = SampleTap::new(48_000, 48_000 * TAP_SECONDS as usize);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_tap = tap.clone();
        let thread = thread::Builder::new()
            .name("tone-capture".to_owned())
            .spawn(move || capture_thread(device_name, thread_tap, ready_tx, shutdown_rx))
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                tap,
                shutdown: Some(shutdown_tx),
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                join_capture_thread(thread);
                Err(e)
            }
            Err(_) => {
                join_capture_thread(thread);
                Err(CaptureError::ThreadExited)
            }
        }
    }
}

impl AudioStream for MicrophoneStream {
    fn audio_tracks(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.tap.sample_rate()
    }

    fn copy_latest(&self, out: &mut [f32]) -> usize {
        self.tap.copy_latest(out)
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            join_capture_thread(thread);
        }
        self.tap.close();
    }
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        self.close();
    }
}

fn join_capture_thread(thread: JoinHandle<()>) {
    if thread.join().is_err() {
        tracing::warn!("capture thread panicked");
    }
}

fn capture_thread(
    device_name: Option<String>,
    tap: SampleTap,
    ready: oneshot::Sender<Result<(), CaptureError>>,
    shutdown: mpsc::Receiver<()>,
) {
    let stream = match open_input_stream(device_name.as_deref(), &tap) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    // Blocks until a shutdown signal arrives or the sender is dropped.
    let _ = shutdown.recv();

    if let Err(e) = stream.pause() {
        tracing::warn!(error = %e, "failed to pause input stream");
    }
    drop(stream);
    tracing::debug!("capture thread stopped");
}

fn open_input_stream(wanted: Option<&str>, tap: &SampleTap) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = match wanted {
        Some(name) => {
            let found = host
                .input_devices()
                .map_err(|e| CaptureError::Backend(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false));
            match found {
                Some(device) => device,
                None => {
                    let available = list_input_devices().unwrap_or_default();
                    return Err(CaptureError::DeviceNotFound {
                        wanted: name.to_owned(),
                        available: format_device_list(&available),
                    });
                }
            }
        }
        None => host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?,
    };

    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::Backend(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let channels = config.channels;
    tap.set_sample_rate(config.sample_rate.0);

    tracing::info!(
        device = %device.name().unwrap_or_else(|_| "<unknown>".to_owned()),
        sample_rate = config.sample_rate.0,
        channels,
        ?sample_format,
        "opened input device"
    );

    let err_fn = |err: cpal::StreamError| tracing::warn!(error = %err, "input stream error");

    let stream = match sample_format {
        SampleFormat::F32 => {
            let tap = tap.clone();
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    tap.push_interleaved(data, channels)
                },
                err_fn,
                None,
            )
        }
        SampleFormat::I16 => {
            let tap = tap.clone();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    tap.push_interleaved(&i16_to_f32_pcm(data), channels)
                },
                err_fn,
                None,
            )
        }
        SampleFormat::U16 => {
            let tap = tap.clone();
            device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data
                        .iter()
                        .map(|&s| (f32::from(s) - 32768.0) / 32768.0)
                        .collect();
                    tap.push_interleaved(&samples, channels)
                },
                err_fn,
                None,
            )
        }
        other => return Err(CaptureError::UnsupportedSampleFormat(format!("{other:?}"))),
    }
    .map_err(|e| CaptureError::Backend(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::Backend(e.to_string()))?;
    Ok(stream)
}

fn format_device_list(devices: &[String]) -> String {
    if devices.is_empty() {
        "<none>".to_owned()
    } else {
        devices.join(", ")
    }
}
