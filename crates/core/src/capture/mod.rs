#[cfg(feature = "microphone")]
mod microphone;
mod tap;

use futures::future::BoxFuture;

#[cfg(feature = "microphone")]
pub use microphone::{list_input_devices, MicrophoneSource, MicrophoneStream};
pub use tap::SampleTap;

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("no default input device available")]
    NoInputDevice,

    #[error("input device {wanted:?} not found (available: {available})")]
    DeviceNotFound { wanted: String, available: String },

    #[error("unsupported input sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("audio backend error: {0}")]
    Backend(String),

    #[error("capture thread exited before the stream was ready")]
    ThreadExited,
}

/// A live audio handle the analyzer samples from.
pub trait AudioStream: Send {
    fn audio_tracks(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// Copies the most recent samples, oldest first, into the front of `out`
    /// and returns how many were written.
    fn copy_latest(&self, out: &mut [f32]) -> usize;

    /// Releases the underlying capture resource. Must be idempotent.
    fn close(&mut self);
}

pub trait CaptureSource: Send + Sync {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn AudioStream>, CaptureError>>;
}
