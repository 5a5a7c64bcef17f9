//! Offline analysis: walk decoded PCM at frame cadence on a manual clock.

use crate::capture::SampleTap;
use crate::clock::ManualClock;
use crate::config::AnalyzerConfig;
use crate::decode::{duration_from_sample_count, DecodedAudio};
use crate::tone::{AggregateAnalysis, AnalyzerError, ToneAnalysis, ToneAnalyzer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReplayOutcome {
    pub frames: u64,
    pub duration: Duration,
    pub aggregate: AggregateAnalysis,
}

pub fn replay<F>(
    audio: &DecodedAudio,
    config: AnalyzerConfig,
    on_tone_update: F,
) -> Result<ReplayOutcome, AnalyzerError>
where
    F: FnMut(&ToneAnalysis) + Send + 'static,
{
    let hop = config.frame_rate.samples_per_frame(audio.sample_rate);
    let tap = SampleTap::new(audio.sample_rate, config.fft_size);
    let clock = ManualClock::new(SystemTime::now());

    let mut analyzer =
        ToneAnalyzer::new(config, on_tone_update)?.with_clock(Arc::new(clock.clone()));
    analyzer.start(Box::new(tap.clone()))?;

    let mut frames = 0u64;
    for chunk in audio.samples.chunks(hop) {
        tap.push(chunk);
        clock.advance(duration_from_sample_count(audio.sample_rate, 1, chunk.len()));
        if analyzer.analyze_frame().is_some() {
            frames += 1;
        }
    }

    let aggregate = analyzer.stop().ok_or(AnalyzerError::NotStarted)?;
    tracing::info!(
        frames,
        hop,
        duration_secs = audio.duration().as_secs_f32(),
        "replay finished"
    );
    Ok(ReplayOutcome {
        frames,
        duration: audio.duration(),
        aggregate,
    })
}
