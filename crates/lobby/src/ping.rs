//! Round-trip-time sampling for one connection.

/// A fixed-window ring of recent ping samples with a running average.
///
/// Once the window is full the oldest sample is overwritten. The average is
/// recomputed over the valid samples on every push, so a connection's
/// reported latency tracks its recent behavior, not its lifetime history.
pub(crate) struct PingTracker {
    samples: Vec<Option<u16>>,
    cursor: usize,
    average: Option<f32>,
}

impl PingTracker {
    pub(crate) fn new(window: usize) -> Self {
        debug_assert!(window > 0, "ping window must be non-empty");
        Self {
            samples: vec![None; window.max(1)],
            cursor: 0,
            average: None,
        }
    }

    /// Record one round-trip sample in milliseconds.
    pub(crate) fn push(&mut self, sample_ms: u16) {
        self.samples[self.cursor] = Some(sample_ms);
        self.cursor = (self.cursor + 1) % self.samples.len();

        let mut total: u32 = 0;
        let mut valid: u32 = 0;
        for sample in self.samples.iter().flatten() {
            total += u32::from(*sample);
            valid += 1;
        }
        self.average = (valid > 0).then(|| total as f32 / valid as f32);
    }

    /// Running average over the window, `None` until a sample arrives.
    pub(crate) fn average(&self) -> Option<f32> {
        self.average
    }

    /// Forget all samples (slot reuse).
    pub(crate) fn reset(&mut self) {
        self.samples.fill(None);
        self.cursor = 0;
        self.average = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_over_partial_window() {
        let mut ping = PingTracker::new(3);
        assert_eq!(ping.average(), None);
        ping.push(10);
        ping.push(20);
        ping.push(30);
        assert!((ping.average().unwrap() - 20.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_full_window_evicts_oldest() {
        let mut ping = PingTracker::new(3);
        for sample in [10, 20, 30] {
            ping.push(sample);
        }
        ping.push(60);
        // (20 + 30 + 60) / 3
        assert!((ping.average().unwrap() - 36.666_668).abs() < 0.001);
    }

    #[test]
    fn test_reset_clears_samples() {
        let mut ping = PingTracker::new(3);
        ping.push(100);
        ping.reset();
        assert_eq!(ping.average(), None);
        ping.push(50);
        assert!((ping.average().unwrap() - 50.0).abs() < f32::EPSILON);
    }
}
