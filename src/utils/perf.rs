//! Timing helpers used to log where a production spends its time

use std::time::{Duration, Instant};

/// Stopwatch with labelled splits, one per pipeline stage
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
    splits: Vec<(String, Duration)>,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            splits: Vec::new(),
        }
    }

    /// Record the time since start under `label`
    pub fn split(&mut self, label: impl Into<String>) {
        self.splits.push((label.into(), self.start.elapsed()));
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Time between the previous split (or the start) and the split `label`
    pub fn lap(&self, label: &str) -> Option<Duration> {
        let idx = self.splits.iter().position(|(l, _)| l == label)?;
        let previous = idx
            .checked_sub(1)
            .map(|i| self.splits[i].1)
            .unwrap_or(Duration::ZERO);
        Some(self.splits[idx].1 - previous)
    }
}
