//! Raw samples buffered between flushes.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// One raw snapshot and how long it took to take.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<S> {
    pub collected_at: DateTime<Utc>,
    pub duration: Duration,
    pub data: S,
}

/// Ordered samples since the last successful flush.
///
/// Appends and drains take the same lock, so a drain never sees a
/// half-appended sample and an append never lands in a drain in progress.
pub struct SampleBuffer<S> {
    samples: Mutex<Vec<Sample<S>>>,
}

impl<S> Default for SampleBuffer<S> {
    fn default() -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
        }
    }
}

impl<S> SampleBuffer<S> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sample<S>>> {
        self.samples.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends a sample and returns the new length.
    pub fn push(&self, sample: Sample<S>) -> usize {
        let mut samples = self.lock();
        samples.push(sample);
        samples.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Runs `flush` over the buffered samples and clears them only if it succeeds.
    ///
    /// Returns the number of samples consumed along with the flush result.
    pub fn drain_with<T, E>(
        &self,
        flush: impl FnOnce(&[Sample<S>]) -> Result<T, E>,
    ) -> Result<(usize, T), E> {
        let mut samples = self.lock();
        let value = flush(&samples)?;
        let consumed = samples.len();
        samples.clear();
        Ok((consumed, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v: u32) -> Sample<u32> {
        Sample {
            collected_at: Utc::now(),
            duration: Duration::from_millis(1),
            data: v,
        }
    }

    #[test]
    fn test_drain_clears_on_success() {
        let buffer = SampleBuffer::new();
        buffer.push(sample(1));
        assert_eq!(buffer.push(sample(2)), 2);

        let (consumed, sum) = buffer
            .drain_with(|s| Ok::<_, ()>(s.iter().map(|s| s.data).sum::<u32>()))
            .unwrap();
        assert_eq!((consumed, sum), (2, 3));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_retains_on_failure() {
        let buffer = SampleBuffer::new();
        buffer.push(sample(1));
        buffer.push(sample(2));

        let result = buffer.drain_with(|_| Err::<(), _>("insert failed"));
        assert_eq!(result, Err("insert failed"));
        assert_eq!(buffer.len(), 2);
    }
}
