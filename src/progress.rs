//! Progress reporting for research runs.
//!
//! Observers are purely informational: they are called synchronously and
//! cannot fail or alter the run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::pipeline::Stage;

/// Human-readable signals emitted after each summarisation batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPreview {
    /// 1-based index of the batch just completed
    pub batch: usize,
    pub batches: usize,
    /// Title of the first thread in the completed batch
    pub lead_title: String,
    /// Title of a thread picked by the run's sampler
    pub sample_title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageChanged(Stage),
    ThreadFetched { index: usize, title: String },
    /// Fraction of threads summarised so far, in `0.0..=1.0`
    SummaryProgress(f64),
    BatchCompleted(BatchPreview),
}

pub trait ProgressObserver {
    fn on_event(&mut self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&ProgressEvent),
{
    fn on_event(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// Observer that ignores everything
pub struct Silent;

impl ProgressObserver for Silent {
    fn on_event(&mut self, _event: &ProgressEvent) {}
}

/// Picks which thread to show as the "random thread" preview.
pub trait ThreadSampler {
    /// Return an index in `0..len`; `len` is never zero
    fn pick(&mut self, len: usize) -> usize;
}

impl<F> ThreadSampler for F
where
    F: FnMut(usize) -> usize,
{
    fn pick(&mut self, len: usize) -> usize {
        self(len)
    }
}

/// Uniform sampler backed by `rand`
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic sampler for reproducible previews
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadSampler for RandomSampler {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_samplers_agree() {
        let mut a = RandomSampler::seeded(7);
        let mut b = RandomSampler::seeded(7);
        let picks_a: Vec<_> = (0..20).map(|_| a.pick(12)).collect();
        let picks_b: Vec<_> = (0..20).map(|_| b.pick(12)).collect();
        assert_eq!(picks_a, picks_b);
        assert!(picks_a.iter().all(|&i| i < 12));
    }

    #[test]
    fn closures_are_observers_and_samplers() {
        let mut events = Vec::new();
        {
            let mut observer = |e: &ProgressEvent| events.push(e.clone());
            observer.on_event(&ProgressEvent::SummaryProgress(0.5));
        }
        assert_eq!(events, [ProgressEvent::SummaryProgress(0.5)]);

        let mut last = |len: usize| len - 1;
        assert_eq!(ThreadSampler::pick(&mut last, 4), 3);
    }
}
