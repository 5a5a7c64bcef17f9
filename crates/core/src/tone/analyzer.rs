use crate::capture::AudioStream;
use crate::clock::{elapsed_between, Clock, SystemClock};
use crate::config::{AnalyzerConfig, ConfigError};
use crate::spectrum::{FrequencyAnalyser, SpectrumError};
use crate::tone::{aggregate, metrics, AggregateAnalysis, SilenceTracker, ToneAnalysis, ToneMetrics};
use crate::util::RingBuffer;
use std::sync::Arc;
use std::time::SystemTime;

pub type ToneCallback = Box<dyn FnMut(&ToneAnalysis) + Send>;

#[derive(thiserror::Error, Debug)]
pub enum AnalyzerError {
    #[error("analyzer session already started")]
    AlreadyStarted,

    #[error("no analyzer session is running")]
    NotStarted,

    #[error("capture stream carries no audio track")]
    NoAudioTrack,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Spectrum(#[from] SpectrumError),
}

/// Stream plus analysis node; both released when the session ends.
struct CaptureNode {
    stream: Box<dyn AudioStream>,
    spectrum: FrequencyAnalyser,
    samples: Vec<f32>,
    bins: Vec<u8>,
}

impl CaptureNode {
    fn read_bins(&mut self) -> &[u8] {
        let n = self.stream.copy_latest(&mut self.samples);
        self.spectrum
            .byte_frequency_data(&self.samples[..n], &mut self.bins);
        &self.bins
    }
}

struct SessionState {
    history: RingBuffer<ToneAnalysis>,
    started_at: SystemTime,
    silence: SilenceTracker,
    frames: u64,
}

impl SessionState {
    fn record(&mut self, bins: &[u8], now: SystemTime) -> ToneAnalysis {
        let volume = metrics::volume(bins);
        let pitch = metrics::pitch_presence(bins);
        let clarity = metrics::clarity(bins);
        let tone_metrics = ToneMetrics {
            pace: metrics::pace(&self.history),
            variation: metrics::variation(&self.history),
            energy: metrics::energy(volume),
            steadiness: metrics::steadiness(&self.history),
        };

        if self.silence.observe(volume, now) {
            tracing::debug!(
                pauses = self.silence.significant_pauses(),
                "significant pause detected"
            );
        }

        let analysis = ToneAnalysis {
            volume,
            pitch,
            clarity,
            confidence: metrics::confidence(volume, clarity, tone_metrics.steadiness),
            metrics: tone_metrics,
            timestamp: now,
        };
        self.history.push(analysis);
        self.frames += 1;
        analysis
    }

    fn summarize(&self, now: SystemTime) -> AggregateAnalysis {
        aggregate(
            &self.history,
            &self.silence,
            elapsed_between(self.started_at, now),
            self.frames,
        )
    }
}

struct Session {
    capture: Option<CaptureNode>,
    state: SessionState,
}

/// Owns one live tone-analysis session at a time.
///
/// `start` acquires the stream and analysis node, each tick
/// ([`ToneAnalyzer::analyze_frame`]) produces one [`ToneAnalysis`] and hands
/// it to the callback, and `stop` releases everything. Ticks outside a
/// session do nothing.
pub struct ToneAnalyzer {
    config: AnalyzerConfig,
    clock: Arc<dyn Clock>,
    on_tone_update: ToneCallback,
    session: Option<Session>,
}

impl ToneAnalyzer {
    pub fn new<F>(config: AnalyzerConfig, on_tone_update: F) -> Result<Self, AnalyzerError>
    where
        F: FnMut(&ToneAnalysis) + Send + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            clock: Arc::new(SystemClock),
            on_tone_update: Box::new(on_tone_update),
            session: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn history_len(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.state.history.len())
    }

    pub fn start(&mut self, stream: Box<dyn AudioStream>) -> Result<(), AnalyzerError> {
        let capture = self.open_capture(stream)?;
        self.begin(Some(capture));
        Ok(())
    }

    /// Starts a session fed only through [`ToneAnalyzer::analyze_bins`].
    pub fn start_detached(&mut self) -> Result<(), AnalyzerError> {
        if self.session.is_some() {
            return Err(AnalyzerError::AlreadyStarted);
        }
        self.begin(None);
        Ok(())
    }

    fn open_capture(&self, mut stream: Box<dyn AudioStream>) -> Result<CaptureNode, AnalyzerError> {
        if self.session.is_some() {
            stream.close();
            return Err(AnalyzerError::AlreadyStarted);
        }
        if stream.audio_tracks() == 0 {
            stream.close();
            return Err(AnalyzerError::NoAudioTrack);
        }
        let spectrum =
            FrequencyAnalyser::new(self.config.fft_size)?.with_smoothing(self.config.smoothing);
        let bins = vec![0u8; spectrum.frequency_bin_count()];
        let samples = vec![0.0; spectrum.fft_size()];
        tracing::info!(
            fft_size = self.config.fft_size,
            smoothing = self.config.smoothing,
            sample_rate = stream.sample_rate(),
            "tone analysis session starting"
        );
        Ok(CaptureNode {
            stream,
            spectrum,
            samples,
            bins,
        })
    }

    fn begin(&mut self, capture: Option<CaptureNode>) {
        let started_at = self.clock.now();
        self.session = Some(Session {
            capture,
            state: SessionState {
                history: RingBuffer::new(self.config.history_capacity),
                started_at,
                silence: SilenceTracker::new(&self.config, started_at),
                frames: 0,
            },
        });
    }

    /// One scheduler tick: sample the stream, record and emit a snapshot.
    /// Returns `None` without side effects when no stream-backed session is
    /// running.
    pub fn analyze_frame(&mut self) -> Option<ToneAnalysis> {
        let now = self.clock.now();
        let session = self.session.as_mut()?;
        let capture = session.capture.as_mut()?;
        let analysis = session.state.record(capture.read_bins(), now);
        self.emit(&analysis);
        Some(analysis)
    }

    /// Records a frame from precomputed byte frequency bins.
    pub fn analyze_bins(&mut self, bins: &[u8]) -> Option<ToneAnalysis> {
        let now = self.clock.now();
        let session = self.session.as_mut()?;
        let analysis = session.state.record(bins, now);
        self.emit(&analysis);
        Some(analysis)
    }

    fn emit(&mut self, analysis: &ToneAnalysis) {
        tracing::trace!(
            volume = analysis.volume,
            pitch = analysis.pitch,
            clarity = analysis.clarity,
            confidence = analysis.confidence,
            "tone frame"
        );
        (self.on_tone_update)(analysis);
    }

    /// Summary of the running session; `None` when no session is active.
    /// Does not modify session state.
    pub fn aggregate_analysis(&self) -> Option<AggregateAnalysis> {
        let now = self.clock.now();
        self.session.as_ref().map(|s| s.state.summarize(now))
    }

    /// Ends the session, releasing the stream and analysis node, and returns
    /// its final summary. Later calls return `None`.
    pub fn stop(&mut self) -> Option<AggregateAnalysis> {
        let session = self.session.take()?;
        let summary = session.state.summarize(self.clock.now());
        if let Some(mut capture) = session.capture {
            capture.stream.close();
        }
        tracing::info!(
            frames = summary.frames_analyzed,
            significant_pauses = summary.significant_pauses,
            speaking_secs = summary.total_speaking_time.as_secs_f32(),
            "tone analysis session stopped"
        );
        Some(summary)
    }
}

impl Drop for ToneAnalyzer {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Some(mut capture) = session.capture {
                capture.stream.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SampleTap;
    use crate::clock::ManualClock;
    use crate::config::PauseCounting;
    use std::sync::Mutex;
    use std::time::Duration;

    const TICK: Duration = Duration::from_millis(16);

    fn manual_clock() -> ManualClock {
        ManualClock::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000))
    }

    fn recording_analyzer(
        config: AnalyzerConfig,
        clock: &ManualClock,
    ) -> (ToneAnalyzer, Arc<Mutex<Vec<ToneAnalysis>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let analyzer = ToneAnalyzer::new(config, move |a: &ToneAnalysis| {
            sink.lock().expect("lock").push(*a)
        })
        .expect("valid config")
        .with_clock(Arc::new(clock.clone()));
        (analyzer, seen)
    }

    struct TracklessStream;

    impl AudioStream for TracklessStream {
        fn audio_tracks(&self) -> usize {
            0
        }
        fn sample_rate(&self) -> u32 {
            48_000
        }
        fn copy_latest(&self, _out: &mut [f32]) -> usize {
            0
        }
        fn close(&mut self) {}
    }

    #[test]
    fn rejects_invalid_config() {
        let config = AnalyzerConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            ToneAnalyzer::new(config, |_: &ToneAnalysis| {}),
            Err(AnalyzerError::Config(ConfigError::ZeroHistory))
        ));
    }

    #[test]
    fn rejects_stream_without_audio_track() {
        let mut analyzer =
            ToneAnalyzer::new(AnalyzerConfig::default(), |_: &ToneAnalysis| {}).expect("valid");
        assert!(matches!(
            analyzer.start(Box::new(TracklessStream)),
            Err(AnalyzerError::NoAudioTrack)
        ));
        assert!(!analyzer.is_running());
    }

    #[test]
    fn second_start_is_rejected_and_closes_the_extra_stream() {
        let clock = manual_clock();
        let (mut analyzer, _) = recording_analyzer(AnalyzerConfig::default(), &clock);
        analyzer
            .start(Box::new(SampleTap::new(16_000, 2048)))
            .expect("first start");
        let extra = SampleTap::new(16_000, 2048);
        assert!(matches!(
            analyzer.start(Box::new(extra.clone())),
            Err(AnalyzerError::AlreadyStarted)
        ));
        assert!(extra.is_closed());
    }

    #[test]
    fn first_two_frames_are_neutral() {
        let clock = manual_clock();
        let (mut analyzer, _) = recording_analyzer(AnalyzerConfig::default(), &clock);
        analyzer.start_detached().expect("start");

        let bins = vec![128u8; 1024];
        for _ in 0..2 {
            clock.advance(TICK);
            let a = analyzer.analyze_bins(&bins).expect("running");
            assert_eq!(a.metrics.pace, 0.5);
            assert_eq!(a.metrics.variation, 0.5);
            assert_eq!(a.metrics.steadiness, 0.5);
        }
        clock.advance(TICK);
        let third = analyzer.analyze_bins(&bins).expect("running");
        assert_eq!(third.metrics.steadiness, 1.0);
        assert_eq!(third.metrics.variation, 0.0);
    }

    #[test]
    fn steady_loud_frames_scenario() {
        let clock = manual_clock();
        let (mut analyzer, seen) = recording_analyzer(AnalyzerConfig::default(), &clock);
        analyzer.start_detached().expect("start");

        let bins = vec![204u8; 1024];
        for _ in 0..5 {
            clock.advance(TICK);
            let a = analyzer.analyze_bins(&bins).expect("running");
            assert!((a.volume - 0.8).abs() < 1e-6);
        }

        let agg = analyzer.aggregate_analysis().expect("running");
        assert!((agg.average_metrics.energy - 0.96).abs() < 1e-5);
        assert!(agg.silence_percentage.abs() < 1e-6);
        assert_eq!(agg.significant_pauses, 0);
        assert_eq!(agg.total_speaking_time, TICK * 5);
        assert_eq!(seen.lock().expect("lock").len(), 5);
    }

    #[test]
    fn snapshot_is_emitted_exactly_as_returned() {
        let clock = manual_clock();
        let (mut analyzer, seen) = recording_analyzer(AnalyzerConfig::default(), &clock);
        analyzer.start_detached().expect("start");
        clock.advance(TICK);
        let a = analyzer.analyze_bins(&[10, 200, 30, 90]).expect("running");
        assert_eq!(seen.lock().expect("lock").as_slice(), &[a]);
        assert_eq!(a.timestamp, clock.now());
    }

    #[test]
    fn history_is_bounded_and_evicts_oldest() {
        let clock = manual_clock();
        let (mut analyzer, _) = recording_analyzer(AnalyzerConfig::default(), &clock);
        analyzer.start_detached().expect("start");

        clock.advance(TICK);
        analyzer.analyze_bins(&vec![255u8; 1024]);
        for _ in 0..30 {
            clock.advance(TICK);
            analyzer.analyze_bins(&vec![0u8; 1024]);
            assert!(analyzer.history_len() <= 30);
        }

        let agg = analyzer.aggregate_analysis().expect("running");
        assert_eq!(analyzer.history_len(), 30);
        assert_eq!(agg.frames_analyzed, 31);
        assert_eq!(agg.pitch_range.max, 0.0);
    }

    #[test]
    fn all_zero_session_has_no_confidence_or_pitch() {
        let clock = manual_clock();
        let (mut analyzer, _) = recording_analyzer(AnalyzerConfig::default(), &clock);
        analyzer.start_detached().expect("start");
        for _ in 0..40 {
            clock.advance(TICK);
            analyzer.analyze_bins(&vec![0u8; 1024]);
        }
        let agg = analyzer.aggregate_analysis().expect("running");
        assert_eq!(agg.overall_confidence, 0.0);
        assert_eq!(
            agg.pitch_range,
            crate::tone::PitchRange {
                min: 0.0,
                max: 0.0,
                average: 0.0
            }
        );
    }

    #[test]
    fn aggregate_is_idempotent() {
        let clock = manual_clock();
        let (mut analyzer, _) = recording_analyzer(AnalyzerConfig::default(), &clock);
        analyzer.start_detached().expect("start");
        for level in [40u8, 90, 160, 20] {
            clock.advance(TICK);
            analyzer.analyze_bins(&vec![level; 512]);
        }
        let first = analyzer.aggregate_analysis();
        let second = analyzer.aggregate_analysis();
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(analyzer.history_len(), 4);
    }

    #[test]
    fn sustained_silence_counts_a_pause() {
        for counting in [PauseCounting::EveryFrame, PauseCounting::OncePerEpisode] {
            let clock = manual_clock();
            let config = AnalyzerConfig::default().with_pause_counting(counting);
            let (mut analyzer, _) = recording_analyzer(config, &clock);
            analyzer.start_detached().expect("start");

            let before = analyzer
                .aggregate_analysis()
                .expect("running")
                .significant_pauses;
            for _ in 0..15 {
                clock.advance(Duration::from_millis(100));
                analyzer.analyze_bins(&vec![5u8; 1024]);
            }
            let agg = analyzer.aggregate_analysis().expect("running");
            assert!(agg.significant_pauses > before, "{counting}");
            assert!(agg.total_silence >= Duration::from_millis(1_100));
        }
    }

    #[test]
    fn stop_is_idempotent_and_late_ticks_are_no_ops() {
        let clock = manual_clock();
        let (mut analyzer, seen) = recording_analyzer(AnalyzerConfig::default(), &clock);
        let tap = SampleTap::new(16_000, 2048);
        tap.push(&[0.25; 2048]);
        analyzer.start(Box::new(tap.clone())).expect("start");

        clock.advance(TICK);
        assert!(analyzer.analyze_frame().is_some());

        let summary = analyzer.stop().expect("first stop returns summary");
        assert_eq!(summary.frames_analyzed, 1);
        assert!(tap.is_closed());
        assert!(analyzer.stop().is_none());

        clock.advance(TICK);
        assert!(analyzer.analyze_frame().is_none());
        assert!(analyzer.analyze_bins(&[255; 16]).is_none());
        assert!(analyzer.aggregate_analysis().is_none());
        assert_eq!(seen.lock().expect("lock").len(), 1);
    }

    #[test]
    fn can_restart_after_stop() {
        let clock = manual_clock();
        let (mut analyzer, _) = recording_analyzer(AnalyzerConfig::default(), &clock);
        analyzer.start_detached().expect("start");
        clock.advance(TICK);
        analyzer.analyze_bins(&[100; 64]);
        analyzer.stop();

        analyzer.start_detached().expect("restart");
        let agg = analyzer.aggregate_analysis().expect("running");
        assert_eq!(agg.frames_analyzed, 0);
        assert_eq!(agg.total_speaking_time, Duration::ZERO);
    }

    #[test]
    fn dropping_a_running_analyzer_closes_its_stream() {
        let tap = SampleTap::new(16_000, 2048);
        {
            let mut analyzer = ToneAnalyzer::new(AnalyzerConfig::default(), |_: &ToneAnalysis| {})
                .expect("valid");
            analyzer.start(Box::new(tap.clone())).expect("start");
        }
        assert!(tap.is_closed());
    }

    #[test]
    fn short_every_frame_silence_can_exceed_full_session_time() {
        let clock = manual_clock();
        let config = AnalyzerConfig::default().with_pause_counting(PauseCounting::EveryFrame);
        let (mut analyzer, _) = recording_analyzer(config, &clock);
        analyzer.start_detached().expect("start");
        for _ in 0..30 {
            clock.advance(Duration::from_millis(100));
            analyzer.analyze_bins(&vec![0u8; 1024]);
        }

        let agg = analyzer.aggregate_analysis().expect("running");
        // frames at 1.1s..=3.0s each add their whole stretch
        assert_eq!(agg.significant_pauses, 20);
        assert!(agg.silence_percentage > 100.0);
        assert!(agg.silence_percentage.is_finite());
        assert_eq!(agg.overall_confidence, 0.0);
    }

    #[test]
    fn configured_smoothing_reaches_the_analyser() {
        let samples: Vec<f32> = (0..2048)
            .map(|i| 0.05 * (2.0 * std::f32::consts::PI * 64.0 * i as f32 / 2048.0).sin())
            .collect();
        let first_volume = |smoothing: f32| {
            let clock = manual_clock();
            let config = AnalyzerConfig {
                smoothing,
                ..Default::default()
            };
            let (mut analyzer, _) = recording_analyzer(config, &clock);
            let tap = SampleTap::new(16_000, 2048);
            tap.push(&samples);
            analyzer.start(Box::new(tap)).expect("start");
            clock.advance(TICK);
            analyzer.analyze_frame().expect("running").volume
        };

        // without smoothing the first frame is not damped towards silence
        assert!(first_volume(0.0) > first_volume(0.8));
    }
}
