use crate::clock::elapsed_between;
use crate::config::{AnalyzerConfig, PauseCounting};
use std::time::{Duration, SystemTime};

/// Tracks sub-threshold stretches and significant pauses for one session.
#[derive(Clone, Debug)]
pub struct SilenceTracker {
    threshold: f32,
    significant: Duration,
    counting: PauseCounting,
    last_sound: SystemTime,
    total_silence: Duration,
    significant_pauses: u32,
    // OncePerEpisode: set once the current silence has been counted; holds the
    // instant up to which its silence was accrued.
    accrued_until: Option<SystemTime>,
}

impl SilenceTracker {
    pub fn new(config: &AnalyzerConfig, started_at: SystemTime) -> Self {
        Self {
            threshold: config.silence_threshold,
            significant: config.significant_pause,
            counting: config.pause_counting,
            last_sound: started_at,
            total_silence: Duration::ZERO,
            significant_pauses: 0,
            accrued_until: None,
        }
    }

    /// Feeds one frame's volume. Returns `true` when the frame counted a
    /// significant pause.
    pub fn observe(&mut self, volume: f32, now: SystemTime) -> bool {
        if volume > self.threshold {
            self.last_sound = now;
            self.accrued_until = None;
            return false;
        }

        let silent_for = elapsed_between(self.last_sound, now);
        if silent_for <= self.significant {
            return false;
        }

        match self.counting {
            PauseCounting::EveryFrame => {
                self.total_silence += silent_for;
                self.significant_pauses = self.significant_pauses.saturating_add(1);
                true
            }
            PauseCounting::OncePerEpisode => match self.accrued_until {
                Some(since) => {
                    self.total_silence += elapsed_between(since, now);
                    self.accrued_until = Some(now);
                    false
                }
                None => {
                    self.total_silence += silent_for;
                    self.significant_pauses = self.significant_pauses.saturating_add(1);
                    self.accrued_until = Some(now);
                    true
                }
            },
        }
    }

    pub fn total_silence(&self) -> Duration {
        self.total_silence
    }

    pub fn significant_pauses(&self) -> u32 {
        self.significant_pauses
    }
}
