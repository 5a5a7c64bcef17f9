use crate::tone::{AggregateAnalysis, PitchRange, SilenceTracker, ToneAnalysis, ToneMetrics};
use crate::util::RingBuffer;
use std::time::Duration;

/// Summarizes the rolling history. An empty history divides by one and
/// reports a zero pitch range; a zero-length session reports no silence.
pub fn aggregate(
    history: &RingBuffer<ToneAnalysis>,
    silence: &SilenceTracker,
    total_speaking_time: Duration,
    frames_analyzed: u64,
) -> AggregateAnalysis {
    let count = history.len().max(1) as f32;

    let sums = history.iter().fold(ToneMetrics::default(), |acc, a| ToneMetrics {
        pace: acc.pace + a.metrics.pace,
        variation: acc.variation + a.metrics.variation,
        energy: acc.energy + a.metrics.energy,
        steadiness: acc.steadiness + a.metrics.steadiness,
    });
    let average_metrics = ToneMetrics {
        pace: sums.pace / count,
        variation: sums.variation / count,
        energy: sums.energy / count,
        steadiness: sums.steadiness / count,
    };

    let pitch_range = if history.is_empty() {
        PitchRange::default()
    } else {
        let (min, max, sum) = history.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY, 0.0f32),
            |(min, max, sum), a| (min.min(a.pitch), max.max(a.pitch), sum + a.pitch),
        );
        PitchRange {
            min,
            max,
            average: sum / count,
        }
    };

    let avg_volume = history.iter().map(|a| a.volume).sum::<f32>() / count;
    let volume_variation = history
        .iter()
        .map(|a| (a.volume - avg_volume).abs())
        .sum::<f32>()
        / count;

    let overall_confidence = history.iter().map(|a| a.confidence).sum::<f32>() / count;

    let total_secs = total_speaking_time.as_secs_f64();
    let silence_percentage = if total_secs > 0.0 {
        (silence.total_silence().as_secs_f64() / total_secs * 100.0) as f32
    } else {
        0.0
    };

    AggregateAnalysis {
        average_metrics,
        overall_confidence,
        total_speaking_time,
        total_silence: silence.total_silence(),
        silence_percentage,
        volume_variation,
        pitch_range,
        significant_pauses: silence.significant_pauses(),
        frames_analyzed,
    }
}
