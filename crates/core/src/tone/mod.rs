mod aggregate;
mod analyzer;
pub mod metrics;
mod silence;

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

pub use aggregate::aggregate;
pub use analyzer::{AnalyzerError, ToneAnalyzer, ToneCallback};
pub use silence::SilenceTracker;

/// Heuristic speech-delivery scores derived from the rolling history.
///
/// Each value is nominally in `[0, 1]`; `energy` is an amplified volume and
/// may exceed 1.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ToneMetrics {
    pub pace: f32,
    pub variation: f32,
    pub energy: f32,
    pub steadiness: f32,
}

/// One frame's tone snapshot. Never mutated after creation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToneAnalysis {
    pub volume: f32,
    /// Upper-spectrum presence, not a fundamental-frequency estimate.
    pub pitch: f32,
    pub clarity: f32,
    pub confidence: f32,
    pub metrics: ToneMetrics,
    pub timestamp: SystemTime,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PitchRange {
    pub min: f32,
    pub max: f32,
    pub average: f32,
}

/// Session-level summary over the rolling history and lifetime counters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AggregateAnalysis {
    pub average_metrics: ToneMetrics,
    pub overall_confidence: f32,
    pub total_speaking_time: Duration,
    pub total_silence: Duration,
    pub silence_percentage: f32,
    pub volume_variation: f32,
    pub pitch_range: PitchRange,
    pub significant_pauses: u32,
    pub frames_analyzed: u64,
}
