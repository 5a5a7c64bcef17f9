use crate::capture::{AudioStream, CaptureError, CaptureSource};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct TapState {
    samples: VecDeque<f32>,
    capacity: usize,
    sample_rate: u32,
    closed: bool,
}

/// In-memory mono stream. Producers push samples from any thread; the
/// analyzer reads the newest window. Clones share the same buffer.
#[derive(Clone, Debug)]
pub struct SampleTap {
    inner: Arc<Mutex<TapState>>,
}

impl SampleTap {
    pub fn new(sample_rate: u32, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(TapState {
                samples: VecDeque::with_capacity(capacity),
                capacity,
                sample_rate,
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TapState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, samples: &[f32]) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        let skip = samples.len().saturating_sub(state.capacity);
        for &s in &samples[skip..] {
            if state.samples.len() == state.capacity {
                state.samples.pop_front();
            }
            state.samples.push_back(s);
        }
    }

    /// Averages interleaved frames down to mono before buffering.
    pub fn push_interleaved(&self, data: &[f32], channels: u16) {
        let channels = usize::from(channels.max(1));
        if channels == 1 {
            self.push(data);
            return;
        }
        let mono: Vec<f32> = data
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        self.push(&mono);
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.lock().sample_rate = sample_rate;
    }

    pub fn buffered(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl AudioStream for SampleTap {
    fn audio_tracks(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    fn copy_latest(&self, out: &mut [f32]) -> usize {
        let state = self.lock();
        let take = out.len().min(state.samples.len());
        let start = state.samples.len() - take;
        for (dst, src) in out.iter_mut().zip(state.samples.range(start..)) {
            *dst = *src;
        }
        take
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.closed = true;
        state.samples.clear();
    }
}

impl CaptureSource for SampleTap {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn AudioStream>, CaptureError>> {
        let stream: Box<dyn AudioStream> = Box::new(self.clone());
        async move { Ok(stream) }.boxed()
    }
}
