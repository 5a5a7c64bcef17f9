//! Human-readable interview voice summary built from an aggregate.

use crate::tone::AggregateAnalysis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PerformanceLevel {
    Excellent,
    Good,
    Fair,
    NeedsImprovement,
}

impl PerformanceLevel {
    pub fn from_score(value: f32) -> Self {
        if value >= 0.8 {
            Self::Excellent
        } else if value >= 0.6 {
            Self::Good
        } else if value >= 0.4 {
            Self::Fair
        } else {
            Self::NeedsImprovement
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::NeedsImprovement => "Needs Improvement",
        }
    }
}

impl fmt::Display for PerformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct MetricLine {
    pub label: &'static str,
    pub value: f32,
    pub level: PerformanceLevel,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SummaryReport {
    pub speaking_time: String,
    pub silence_percent: i64,
    pub significant_pauses: u32,
    pub metrics: Vec<MetricLine>,
    pub lowest_pitch_percent: i64,
    pub average_pitch_percent: i64,
    pub highest_pitch_percent: i64,
}

/// `m:ss`, truncating partial seconds.
pub fn format_clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn percent(value: f32) -> i64 {
    (f64::from(value) * 100.0).round() as i64
}

impl SummaryReport {
    pub fn from_aggregate(analysis: &AggregateAnalysis) -> Self {
        let m = &analysis.average_metrics;
        let metrics = [
            ("Speaking Pace", m.pace),
            ("Voice Variation", m.variation),
            ("Energy Level", m.energy),
            ("Voice Steadiness", m.steadiness),
            ("Overall Confidence", analysis.overall_confidence),
        ]
        .into_iter()
        .map(|(label, value)| MetricLine {
            label,
            value,
            level: PerformanceLevel::from_score(value),
        })
        .collect();

        Self {
            speaking_time: format_clock(analysis.total_speaking_time),
            silence_percent: f64::from(analysis.silence_percentage).round() as i64,
            significant_pauses: analysis.significant_pauses,
            metrics,
            lowest_pitch_percent: percent(analysis.pitch_range.min),
            average_pitch_percent: percent(analysis.pitch_range.average),
            highest_pitch_percent: percent(analysis.pitch_range.max),
        }
    }
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Interview Voice Analysis Summary")?;
        writeln!(
            f,
            "  Speaking time: {} (including {}% silence)",
            self.speaking_time, self.silence_percent
        )?;
        writeln!(f, "  Significant pauses detected: {}", self.significant_pauses)?;
        writeln!(f, "  Voice metrics:")?;
        for line in &self.metrics {
            writeln!(
                f,
                "    {:<20} {:>4}%  {}",
                line.label,
                percent(line.value),
                line.level
            )?;
        }
        write!(
            f,
            "  Pitch: lowest {}%, average {}%, highest {}%",
            self.lowest_pitch_percent, self.average_pitch_percent, self.highest_pitch_percent
        )
    }
}

pub fn to_json_pretty(analysis: &AggregateAnalysis) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone::{PitchRange, ToneMetrics};

    fn sample() -> AggregateAnalysis {
        AggregateAnalysis {
            average_metrics: ToneMetrics {
                pace: 0.85,
                variation: 0.3,
                energy: 1.1,
                steadiness: 0.6,
            },
            overall_confidence: 0.45,
            total_speaking_time: Duration::from_millis(125_900),
            total_silence: Duration::from_secs(21),
            silence_percentage: 16.68,
            volume_variation: 0.05,
            pitch_range: PitchRange {
                min: 0.124,
                max: 0.456,
                average: 0.25,
            },
            significant_pauses: 4,
            frames_analyzed: 7_500,
        }
    }

    #[test]
    fn performance_level_thresholds() {
        assert_eq!(PerformanceLevel::from_score(0.8), PerformanceLevel::Excellent);
        assert_eq!(PerformanceLevel::from_score(1.4), PerformanceLevel::Excellent);
        assert_eq!(PerformanceLevel::from_score(0.79), PerformanceLevel::Good);
        assert_eq!(PerformanceLevel::from_score(0.4), PerformanceLevel::Fair);
        assert_eq!(
            PerformanceLevel::from_score(0.39),
            PerformanceLevel::NeedsImprovement
        );
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(Duration::ZERO), "0:00");
        assert_eq!(format_clock(Duration::from_millis(59_999)), "0:59");
        assert_eq!(format_clock(Duration::from_secs(605)), "10:05");
    }

    #[test]
    fn report_from_aggregate() {
        let report = SummaryReport::from_aggregate(&sample());
        assert_eq!(report.speaking_time, "2:05");
        assert_eq!(report.silence_percent, 17);
        assert_eq!(report.metrics.len(), 5);
        assert_eq!(report.metrics[0].level, PerformanceLevel::Excellent);
        assert_eq!(report.metrics[1].level, PerformanceLevel::NeedsImprovement);
        assert_eq!(report.metrics[4].label, "Overall Confidence");
        assert_eq!(report.metrics[4].level, PerformanceLevel::Fair);
        assert_eq!(report.lowest_pitch_percent, 12);
        assert_eq!(report.highest_pitch_percent, 46);

        let text = report.to_string();
        assert!(text.contains("2:05 (including 17% silence)"));
        assert!(text.contains("Significant pauses detected: 4"));
        assert!(text.contains("Needs Improvement"));
    }

    #[test]
    fn json_uses_field_names() {
        let json = to_json_pretty(&sample()).expect("serializes");
        assert!(json.contains("\"significant_pauses\": 4"));
        assert!(json.contains("\"pitch_range\""));
    }
}
