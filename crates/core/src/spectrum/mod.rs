//! Frequency-domain analysis node.
//!
//! Produces byte-normalized magnitude bins the same way a browser
//! `AnalyserNode` does for `getByteFrequencyData`: Blackman window, forward
//! FFT, temporal smoothing, decibel conversion, and a linear map of the
//! decibel range onto `0..=255`.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32_768;
pub const DEFAULT_MIN_DECIBELS: f32 = -100.0;
pub const DEFAULT_MAX_DECIBELS: f32 = -30.0;
pub const DEFAULT_SMOOTHING: f32 = 0.8;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SpectrumError {
    #[error("fft size must be a power of two in 32..=32768, got {0}")]
    InvalidFftSize(usize),
}

pub fn validate_fft_size(fft_size: usize) -> Result<(), SpectrumError> {
    if !fft_size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
        return Err(SpectrumError::InvalidFftSize(fft_size));
    }
    Ok(())
}

pub struct FrequencyAnalyser {
    fft_size: usize,
    min_decibels: f32,
    max_decibels: f32,
    smoothing: f32,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl fmt::Debug for FrequencyAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrequencyAnalyser")
            .field("fft_size", &self.fft_size)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .field("smoothing", &self.smoothing)
            .finish_non_exhaustive()
    }
}

impl FrequencyAnalyser {
    pub fn new(fft_size: usize) -> Result<Self, SpectrumError> {
        validate_fft_size(fft_size)?;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        Ok(Self {
            fft_size,
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
            smoothing: DEFAULT_SMOOTHING,
            window: blackman_window(fft_size),
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
        })
    }

    /// `0.0` disables smoothing; values are clamped to `[0, 1)`.
    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing.clamp(0.0, 0.999);
        self
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Fills `out` (up to `frequency_bin_count` entries) from the newest
    /// `fft_size` samples of `time_domain`. Shorter input is zero-padded in
    /// front so the newest sample always lands at the end of the window.
    pub fn byte_frequency_data(&mut self, time_domain: &[f32], out: &mut [u8]) {
        let n = self.fft_size;
        let take = time_domain.len().min(n);
        let recent = &time_domain[time_domain.len() - take..];
        let offset = n - take;

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < offset { 0.0 } else { recent[i - offset] };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let scale = 1.0 / n as f32;
        let range = self.max_decibels - self.min_decibels;
        for ((bin, prev), value) in out
            .iter_mut()
            .zip(self.smoothed.iter_mut())
            .zip(self.buffer.iter())
        {
            let magnitude = value.norm() * scale;
            let smoothed = self.smoothing * *prev + (1.0 - self.smoothing) * magnitude;
            *prev = if smoothed.is_finite() { smoothed } else { 0.0 };

            let db = if *prev > 0.0 {
                20.0 * prev.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = (255.0 / range) * (db - self.min_decibels);
            *bin = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }
}

fn blackman_window(n: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_sizes() {
        assert_eq!(
            FrequencyAnalyser::new(1000).unwrap_err(),
            SpectrumError::InvalidFftSize(1000)
        );
        assert!(FrequencyAnalyser::new(16).is_err());
        assert!(FrequencyAnalyser::new(65_536).is_err());
        assert_eq!(
            FrequencyAnalyser::new(2048)
                .expect("valid size")
                .frequency_bin_count(),
            1024
        );
    }

    #[test]
    fn silence_maps_to_zero_bins() {
        let mut analyser = FrequencyAnalyser::new(2048).expect("valid size");
        let mut bins = vec![7u8; analyser.frequency_bin_count()];
        analyser.byte_frequency_data(&vec![0.0; 2048], &mut bins);
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_input_is_treated_as_silence() {
        let mut analyser = FrequencyAnalyser::new(256).expect("valid size");
        let mut bins = vec![9u8; analyser.frequency_bin_count()];
        analyser.byte_frequency_data(&[], &mut bins);
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let n = 2048;
        let cycles = 64.0;
        let samples: Vec<f32> = (0..n)
            .map(|i| 0.05 * (2.0 * PI * cycles * i as f32 / n as f32).sin())
            .collect();

        let mut analyser = FrequencyAnalyser::new(n).expect("valid size");
        let mut bins = vec![0u8; analyser.frequency_bin_count()];
        analyser.byte_frequency_data(&samples, &mut bins);

        let (peak, _) = bins
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .expect("non-empty");
        assert_eq!(peak, 64);
        assert!(bins[64] > bins[512]);
    }

    #[test]
    fn smoothing_ramps_towards_steady_level() {
        let n = 512;
        let samples: Vec<f32> = (0..n)
            .map(|i| 0.05 * (2.0 * PI * 32.0 * i as f32 / n as f32).sin())
            .collect();
        let mut analyser = FrequencyAnalyser::new(n).expect("valid size");
        let mut first = vec![0u8; n / 2];
        let mut later = vec![0u8; n / 2];

        analyser.byte_frequency_data(&samples, &mut first);
        for _ in 0..20 {
            analyser.byte_frequency_data(&samples, &mut later);
        }
        assert!(later[32] > first[32]);

        analyser.reset();
        let mut after_reset = vec![0u8; n / 2];
        analyser.byte_frequency_data(&samples, &mut after_reset);
        assert_eq!(after_reset, first);
    }
}
