use crate::threshold::ThresholdResult;
use std::time::Duration;

/// Final outcome of a load test run.
///
/// `passed` is the conjunction of every threshold verdict, with
/// indeterminate results excluded or counted as failures per the
/// configured [`IndeterminatePolicy`](crate::IndeterminatePolicy).
#[derive(Debug, Clone)]
pub struct TestReport {
    /// Total iterations recorded across all virtual users.
    pub iterations: u64,
    /// Iterations that errored or returned a 4xx/5xx status.
    pub failed: u64,
    /// Virtual users force-terminated at the grace deadline.
    pub aborted_vus: usize,
    pub elapsed: Duration,
    pub latency: LatencySummary,
    pub error_rate: f64,
    /// Mean iterations per second over the whole run.
    pub rate: f64,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
}

/// Latency distribution of the run, exact over all recorded samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencySummary {
    pub mean: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
}
