//! Per-frame tone math over byte frequency bins and the rolling history.

use crate::tone::ToneAnalysis;
use crate::util::RingBuffer;

pub const ENERGY_GAIN: f32 = 1.2;
/// Reported for history-derived metrics until two frames exist.
pub const NEUTRAL_METRIC: f32 = 0.5;

pub fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

fn mean_byte_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| u64::from(b)).sum();
    (sum as f64 / (bins.len() as f64 * 255.0)) as f32
}

/// Mean bin magnitude over the whole spectrum.
pub fn volume(bins: &[u8]) -> f32 {
    mean_byte_level(bins)
}

/// Mean magnitude of the upper half of the spectrum.
pub fn pitch_presence(bins: &[u8]) -> f32 {
    mean_byte_level(&bins[bins.len() / 2..])
}

/// Mean magnitude of the middle half, bins `[n/4, 3n/4)`.
pub fn clarity(bins: &[u8]) -> f32 {
    let n = bins.len();
    mean_byte_level(&bins[n / 4..n * 3 / 4])
}

pub fn energy(volume: f32) -> f32 {
    volume * ENERGY_GAIN
}

/// Sum of absolute frame-to-frame changes averaged over the history length,
/// or `None` below two frames.
fn mean_abs_change(
    history: &RingBuffer<ToneAnalysis>,
    signal: impl Fn(&ToneAnalysis) -> f32,
) -> Option<f32> {
    if history.len() < 2 {
        return None;
    }
    let total: f32 = history
        .pairs()
        .map(|(prev, curr)| (signal(curr) - signal(prev)).abs())
        .sum();
    Some(total / history.len() as f32)
}

pub fn pace(history: &RingBuffer<ToneAnalysis>) -> f32 {
    mean_abs_change(history, |a| a.volume).map_or(NEUTRAL_METRIC, |d| clamp01(1.0 - d))
}

pub fn variation(history: &RingBuffer<ToneAnalysis>) -> f32 {
    mean_abs_change(history, |a| a.pitch).map_or(NEUTRAL_METRIC, clamp01)
}

/// Same volume-change signal as [`pace`].
pub fn steadiness(history: &RingBuffer<ToneAnalysis>) -> f32 {
    mean_abs_change(history, |a| a.volume).map_or(NEUTRAL_METRIC, |d| clamp01(1.0 - d))
}

/// Mean of volume, clarity and steadiness, except that a frame with no
/// spectral energy carries no confidence, so an all-silent session reports
/// zero overall confidence.
pub fn confidence(volume: f32, clarity: f32, steadiness: f32) -> f32 {
    if volume <= 0.0 {
        return 0.0;
    }
    (volume + clarity + steadiness) / 3.0
}
