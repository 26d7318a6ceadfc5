//! Per-block performance counters
//!
//! Exponentially-weighted moving averages over the executor's bookkeeping
//! step. Counters are owned by the scheduler's metrics table and shared
//! with the block's execution thread; there is no process-global state.

use std::time::Duration;

/// EWMA counters for one block. Updated once per completed `work` call.
#[derive(Debug, Clone)]
pub struct PerfCounters {
    alpha: f64,
    /// Completed work invocations
    pub work_calls: u64,
    /// Total items produced across all outputs
    pub total_items: u64,
    /// Smoothed items produced per work call
    pub avg_items_per_work: f64,
    /// Smoothed wall-clock nanoseconds spent inside `work`
    pub avg_work_time_ns: f64,
    /// Smoothed fraction of input buffer occupancy, 0.0..=1.0
    pub avg_input_fullness: f64,
    /// Smoothed fraction of output buffer occupancy, 0.0..=1.0
    pub avg_output_fullness: f64,
}

impl PerfCounters {
    pub fn new(alpha: f64) -> Self {
        assert!(alpha > 0.0 && alpha <= 1.0, "alpha must be in (0, 1]");
        Self {
            alpha,
            work_calls: 0,
            total_items: 0,
            avg_items_per_work: 0.0,
            avg_work_time_ns: 0.0,
            avg_input_fullness: 0.0,
            avg_output_fullness: 0.0,
        }
    }

    fn smooth(&self, avg: f64, sample: f64) -> f64 {
        if self.work_calls == 0 {
            sample
        } else {
            avg + self.alpha * (sample - avg)
        }
    }

    /// Fold in one completed work call.
    pub fn record_work(
        &mut self,
        produced: usize,
        elapsed: Duration,
        input_fullness: f64,
        output_fullness: f64,
    ) {
        self.avg_items_per_work = self.smooth(self.avg_items_per_work, produced as f64);
        self.avg_work_time_ns = self.smooth(self.avg_work_time_ns, elapsed.as_nanos() as f64);
        self.avg_input_fullness = self.smooth(self.avg_input_fullness, input_fullness);
        self.avg_output_fullness = self.smooth(self.avg_output_fullness, output_fullness);
        self.work_calls += 1;
        self.total_items += produced as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_seeds_averages() {
        let mut perf = PerfCounters::new(0.1);
        perf.record_work(100, Duration::from_micros(50), 0.5, 0.25);
        assert_eq!(perf.work_calls, 1);
        assert_eq!(perf.total_items, 100);
        assert_eq!(perf.avg_items_per_work, 100.0);
        assert_eq!(perf.avg_work_time_ns, 50_000.0);
        assert_eq!(perf.avg_input_fullness, 0.5);
    }

    #[test]
    fn test_ewma_converges_toward_samples() {
        let mut perf = PerfCounters::new(0.5);
        perf.record_work(0, Duration::ZERO, 0.0, 0.0);
        for _ in 0..20 {
            perf.record_work(64, Duration::from_micros(10), 1.0, 1.0);
        }
        assert!((perf.avg_items_per_work - 64.0).abs() < 1e-3);
        assert!((perf.avg_input_fullness - 1.0).abs() < 1e-3);
        assert_eq!(perf.total_items, 20 * 64);
    }

    #[test]
    #[should_panic(expected = "alpha")]
    fn test_invalid_alpha_panics() {
        let _ = PerfCounters::new(0.0);
    }
}
