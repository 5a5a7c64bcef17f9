//! Repeating frame task that drives a [`ToneAnalyzer`] at the configured rate.

use crate::tone::{AggregateAnalysis, ToneAnalyzer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

fn lock(analyzer: &Mutex<ToneAnalyzer>) -> MutexGuard<'_, ToneAnalyzer> {
    match analyzer.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("analyzer lock was poisoned; recovering and continuing");
            poisoned.into_inner()
        }
    }
}

/// Handle to a running frame loop. Dropping it stops the session.
pub struct FrameLoopHandle {
    analyzer: Arc<Mutex<ToneAnalyzer>>,
    stopped: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

/// Spawns the frame loop on the current tokio runtime. The analyzer should
/// already be started; the loop ends on its own once the session is gone.
pub fn spawn(analyzer: ToneAnalyzer) -> FrameLoopHandle {
    let period = analyzer.config().frame_rate.period();
    let analyzer = Arc::new(Mutex::new(analyzer));
    let stopped = Arc::new(AtomicBool::new(false));

    let task = {
        let analyzer = Arc::clone(&analyzer);
        let stopped = Arc::clone(&stopped);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // A slow tick delays the next one instead of bursting to catch up.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if stopped.load(Ordering::Acquire) {
                    break;
                }
                let mut guard = lock(&analyzer);
                if stopped.load(Ordering::Acquire) {
                    break;
                }
                if guard.analyze_frame().is_none() {
                    tracing::debug!("frame loop exiting: no active session");
                    break;
                }
            }
        })
    };

    tracing::debug!(period_ms = period.as_secs_f64() * 1000.0, "frame loop started");
    FrameLoopHandle {
        analyzer,
        stopped,
        task: Some(task),
    }
}

impl FrameLoopHandle {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn aggregate_analysis(&self) -> Option<AggregateAnalysis> {
        lock(&self.analyzer).aggregate_analysis()
    }

    /// Stops sampling and releases the capture stream. Safe from any thread
    /// and idempotent; only the first call returns the summary.
    pub fn stop(&self) -> Option<AggregateAnalysis> {
        self.stopped.store(true, Ordering::Release);
        lock(&self.analyzer).stop()
    }

    /// Waits for the loop task to finish. Call after [`FrameLoopHandle::stop`]
    /// or once the session ends.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "frame loop task failed");
            }
        }
    }
}

impl Drop for FrameLoopHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
