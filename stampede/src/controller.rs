use crate::collector::Collector;
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::runner::RunnerShared;
use crate::scheduler::Scheduler;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use stampede_core::{
    Aggregation, ConfigError, LatencySummary, Metric, TestConfig, TestReport, ThresholdResult,
    Verdict, DEFAULT_PROGRESS_INTERVAL,
};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, Interval};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// Orchestrates one load test: scheduler lifecycle, sample intake,
/// threshold evaluation, and the final report.
#[instrument(name = "load_test", skip_all, fields(name = config.name))]
pub(crate) async fn run_test<T, F, E>(config: TestConfig, callback: T) -> Result<TestReport, Error>
where
    T: Fn() -> F + Send + Sync + Clone + 'static,
    F: Future<Output = Result<u16, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    config.validate()?;
    let thresholds = config.parse_thresholds()?;
    let total = config
        .total_duration()
        .ok_or(ConfigError::MissingDuration)?;

    info!(
        "Running {} for {} with config {:?}",
        config.name,
        humantime::format_duration(total),
        &config
    );

    let mut collector = Collector::new();
    let pacing = config.pacing.map(|quota| Arc::new(rate_limiter(quota)));
    let started = Instant::now();
    let shared = RunnerShared {
        sink: collector.sink(),
        pacing,
        started,
    };
    let mut scheduler = Scheduler::new(callback, shared);
    let evaluator = Evaluator::new(thresholds, config.indeterminate);

    // Abort-on-fail without an explicit cadence means checking every tick.
    let eval_interval = config
        .eval_interval
        .or_else(|| config.abort_on_fail.then_some(config.tick));

    let mut timer = Timer::new(config.tick).await;
    let mut last_eval = Duration::ZERO;
    let mut last_progress = Duration::ZERO;
    let mut aborted_early = false;

    // NOTE: This loop is time-sensitive. Any long awaits besides the tick
    // throw off the concurrency profile.
    loop {
        let elapsed = started.elapsed();
        if elapsed >= total {
            break;
        }

        scheduler.reconcile(config.target_at(elapsed));

        timer.tick().await;
        collector.drain();

        let elapsed = started.elapsed();
        if let Some(eval_interval) = eval_interval {
            if elapsed - last_eval >= eval_interval {
                last_eval = elapsed;
                let results = evaluator.evaluate(&collector, elapsed);
                log_verdicts(&results);
                if config.abort_on_fail && evaluator.should_abort(&results) {
                    warn!("Threshold failed mid-run; aborting");
                    aborted_early = true;
                    break;
                }
            }
        }

        if elapsed - last_progress >= DEFAULT_PROGRESS_INTERVAL {
            last_progress = elapsed;
            progress(&collector, scheduler.active(), elapsed);
        }
    }

    let aborted_vus = scheduler.drain(config.grace_period).await;
    collector.drain();

    let elapsed = started.elapsed();
    let results = evaluator.evaluate(&collector, elapsed);
    let passed = evaluator.passed(&results) && !aborted_early;
    log_verdicts(&results);

    info!(
        "{} complete: {} iterations, passed={passed}",
        config.name,
        collector.total()
    );

    Ok(build_report(
        &collector,
        elapsed,
        aborted_vus,
        results,
        passed,
    ))
}

fn build_report(
    collector: &Collector,
    elapsed: Duration,
    aborted_vus: usize,
    thresholds: Vec<ThresholdResult>,
    passed: bool,
) -> TestReport {
    let iterations = collector.total();
    let failed = collector.failed();

    let series = collector.query(Metric::IterationDuration, None, elapsed);
    let millis = |agg| {
        series
            .value(agg)
            .map(|ms| Duration::from_secs_f64(ms / 1e3))
            .unwrap_or_default()
    };
    let latency = LatencySummary {
        mean: millis(Aggregation::Mean),
        p50: millis(Aggregation::Percentile(50.)),
        p90: millis(Aggregation::Percentile(90.)),
        p95: millis(Aggregation::Percentile(95.)),
        p99: millis(Aggregation::Percentile(99.)),
    };

    let error_rate = if iterations == 0 {
        0.
    } else {
        failed as f64 / iterations as f64
    };
    let rate = if elapsed.is_zero() {
        0.
    } else {
        iterations as f64 / elapsed.as_secs_f64()
    };

    TestReport {
        iterations,
        failed,
        aborted_vus,
        elapsed,
        latency,
        error_rate,
        rate,
        thresholds,
        passed,
    }
}

/// Metric snapshot emitted at a fixed interval; the only externally
/// visible behavior during the run besides the final report.
fn progress(collector: &Collector, active: usize, elapsed: Duration) {
    let iterations = collector.total();
    let failed = collector.failed();
    let p95 = collector
        .query(Metric::IterationDuration, None, elapsed)
        .value(Aggregation::Percentile(95.));

    info!(
        "t={} vus={active} iterations={iterations} failed={failed} p95={}",
        humantime::format_duration(Duration::from_secs(elapsed.as_secs())),
        p95.map(|ms| format!("{ms:.1}ms"))
            .unwrap_or_else(|| "-".to_string()),
    );

    #[cfg(feature = "metrics")]
    {
        metrics::gauge!("stampede_active_vus").set(active as f64);
        metrics::counter!("stampede_iterations").absolute(iterations);
        metrics::counter!("stampede_failed_iterations").absolute(failed);
        if let Some(ms) = p95 {
            metrics::gauge!("stampede_iteration_duration_p95_ms").set(ms);
        }
    }
}

fn log_verdicts(results: &[ThresholdResult]) {
    for result in results {
        match result.verdict {
            Verdict::Pass => debug!(
                "Threshold {}: {} passed (observed {:?})",
                result.metric, result.expression, result.observed
            ),
            Verdict::Fail => warn!(
                "Threshold {}: {} failed (observed {:?})",
                result.metric, result.expression, result.observed
            ),
            Verdict::Indeterminate => warn!(
                "Threshold {}: {} indeterminate (no matching samples)",
                result.metric, result.expression
            ),
        }
    }
}

fn rate_limiter(quota: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(quota).allow_burst(NonZeroU32::new(1).unwrap()))
}

struct Timer {
    interval: Interval,
    last_tick: Instant,
}

impl Timer {
    async fn new(interval_dur: Duration) -> Self {
        let mut interval = interval(interval_dur);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // NOTE: First tick completes instantly
        let last_tick = interval.tick().await;
        Self {
            interval,
            last_tick,
        }
    }

    async fn tick(&mut self) -> Duration {
        let next = self.interval.tick().await;
        let elapsed = self.last_tick.elapsed();
        self.last_tick = next;
        elapsed
    }
}
