//! The public entrypoint: a configurable, awaitable load test.
use crate::controller::run_test;
use crate::error::Error;
use stampede_core::{
    ConcurrencyProfile, IndeterminatePolicy, RampStage, TestConfig, TestReport, ThresholdSpec,
};
use std::{
    future::Future,
    num::NonZeroU32,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

/// A load test over an injected iteration callback.
///
/// The callback is invoked once per iteration by each virtual user and
/// reports a status code or an error; the engine measures latency around
/// it. `LoadTest` is a `Future`: configure it with the builder methods and
/// `.await` it to run the test.
///
/// # Example
/// ```no_run
/// use stampede::prelude::*;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let report = LoadTest::new("login", login_iteration)
///         .vus(10)
///         .duration(Duration::from_secs(60))
///         .threshold("iteration_duration", "p(95)<1000")
///         .threshold("errors", "rate<0.5")
///         .await
///         .unwrap();
///
///     assert!(report.passed);
/// }
///
/// async fn login_iteration() -> Result<u16, BoxError> {
///     // Perform one request with whatever client the test injects.
///     Ok(200)
/// }
/// ```
#[pin_project::pin_project]
pub struct LoadTest<T> {
    callback: T,
    config: TestConfig,
    runner_fut: Option<Pin<Box<dyn Future<Output = Result<TestReport, Error>> + Send>>>,
}

impl<T> LoadTest<T> {
    pub fn new(name: &str, callback: T) -> Self {
        Self {
            callback,
            config: TestConfig::new(name),
            runner_fut: None,
        }
    }

    /// Hold a fixed number of virtual users for the whole run.
    ///
    /// NOTE: Must supply a `.duration()` as well.
    pub fn vus(mut self, vus: usize) -> Self {
        self.config.concurrency = ConcurrencyProfile::Fixed(vus);
        self
    }

    /// Total wall-clock duration for a fixed-concurrency run. Ignored when
    /// ramp stages are configured; they carry their own total.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.config.duration = Some(duration);
        self
    }

    /// Append one ramp stage: interpolate linearly to `target` virtual
    /// users over `duration`. The first call switches the profile from
    /// fixed to staged.
    ///
    /// # Example
    /// ```no_run
    /// use stampede::prelude::*;
    /// use std::time::Duration;
    ///
    /// # async fn iteration() -> Result<u16, BoxError> { Ok(200) }
    /// # async fn run() {
    /// let report = LoadTest::new("ramp", iteration)
    ///     .stage(Duration::from_secs(20), 100)
    ///     .stage(Duration::from_secs(30), 300)
    ///     .stage(Duration::from_secs(20), 0)
    ///     .await;
    /// # }
    /// ```
    pub fn stage(mut self, duration: Duration, target: usize) -> Self {
        let stage = RampStage { duration, target };
        match &mut self.config.concurrency {
            ConcurrencyProfile::Stages(stages) => stages.push(stage),
            ConcurrencyProfile::Fixed(_) => {
                self.config.concurrency = ConcurrencyProfile::Stages(vec![stage]);
            }
        }
        self
    }

    /// Replace the concurrency profile with the given ramp stages.
    pub fn stages<I>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = RampStage>,
    {
        self.config.concurrency = ConcurrencyProfile::Stages(stages.into_iter().collect());
        self
    }

    /// Attach a pass/fail predicate to a metric, in the
    /// `<aggregation><operator><value>` string form: `"p(95)<1000"`,
    /// `"rate<1"`, `"count>=100"`. Parsed when the test starts; a
    /// malformed predicate fails the run before any virtual user spawns.
    pub fn threshold(mut self, metric: &str, predicate: &str) -> Self {
        if let Some(spec) = self
            .config
            .thresholds
            .iter_mut()
            .find(|spec| spec.metric == metric)
        {
            spec.predicates.push(predicate.to_string());
        } else {
            self.config.thresholds.push(ThresholdSpec {
                metric: metric.to_string(),
                predicates: vec![predicate.to_string()],
            });
        }
        self
    }

    /// Cap the global iteration rate. Without pacing, iterations run
    /// back-to-back with no artificial delay.
    pub fn pacing(mut self, per_second: NonZeroU32) -> Self {
        self.config.pacing = Some(per_second);
        self
    }

    /// Ceiling applied to any concurrency target.
    pub fn max_vus(mut self, max_vus: usize) -> Self {
        self.config.max_vus = max_vus;
        self
    }

    /// Scheduler resolution: how often the virtual user population is
    /// reconciled against the profile target.
    pub fn tick(mut self, tick: Duration) -> Self {
        self.config.tick = tick;
        self
    }

    /// How long to wait for in-flight iterations after the stop signal
    /// before force-terminating stragglers.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.config.grace_period = grace;
        self
    }

    /// Also evaluate thresholds every `interval` during the run, not just
    /// at the end.
    pub fn eval_interval(mut self, interval: Duration) -> Self {
        self.config.eval_interval = Some(interval);
        self
    }

    /// Stop the test as soon as a periodic threshold evaluation fails.
    /// Implies per-tick evaluation unless `.eval_interval()` is set.
    pub fn abort_on_fail(mut self) -> Self {
        self.config.abort_on_fail = true;
        self
    }

    /// Count indeterminate thresholds (no matching samples) as failures
    /// instead of excluding them from the overall result.
    pub fn fail_on_indeterminate(mut self) -> Self {
        self.config.indeterminate = IndeterminatePolicy::Fail;
        self
    }
}

impl<T, F, E> Future for LoadTest<T>
where
    T: Fn() -> F + Send + Sync + Clone + 'static,
    F: Future<Output = Result<u16, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    type Output = Result<TestReport, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if this.runner_fut.is_none() {
            let callback = this.callback.clone();
            let config = this.config.clone();
            *this.runner_fut = Some(Box::pin(run_test(config, callback)));
        }

        if let Some(runner) = this.runner_fut.as_mut() {
            runner.as_mut().poll(cx)
        } else {
            unreachable!()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::ConfigError;

    async fn noop() -> Result<u16, &'static str> {
        Ok(200)
    }

    #[tokio::test]
    async fn config_errors_fail_fast() {
        let err = LoadTest::new("no-duration", noop).vus(10).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Config(ConfigError::MissingDuration)
        ));

        let err = LoadTest::new("bad-threshold", noop)
            .vus(1)
            .duration(Duration::from_secs(1))
            .threshold("errors", "p(95)<1000")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Config(ConfigError::InvalidAggregation { .. })
        ));
    }

    #[test]
    fn threshold_builder_groups_by_metric() {
        let test = LoadTest::new("grouping", noop)
            .threshold("iteration_duration", "p(95)<1000")
            .threshold("iteration_duration", "p(99)<2000")
            .threshold("errors", "rate<1");

        assert_eq!(test.config.thresholds.len(), 2);
        assert_eq!(test.config.thresholds[0].predicates.len(), 2);
    }

    #[test]
    fn stage_builder_switches_to_a_ramp_profile() {
        let test = LoadTest::new("ramp", noop)
            .stage(Duration::from_secs(20), 100)
            .stage(Duration::from_secs(30), 300);

        match &test.config.concurrency {
            ConcurrencyProfile::Stages(stages) => assert_eq!(stages.len(), 2),
            other => panic!("expected stages, got {other:?}"),
        }
    }
}
