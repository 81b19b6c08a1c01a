use crate::constants::{DEFAULT_GRACE_PERIOD, DEFAULT_MAX_VUS, DEFAULT_TICK};
use crate::metrics::Metric;
use crate::threshold::{ParseError, Predicate, Threshold};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

/// Rejected test configuration. Raised before any virtual user is spawned;
/// a test never partially starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("fixed concurrency must be at least 1 virtual user")]
    ZeroVus,
    #[error("fixed concurrency requires a total duration")]
    MissingDuration,
    #[error("ramp profile requires at least one stage")]
    EmptyStages,
    #[error("ramp stage {0} has a zero duration")]
    ZeroDurationStage(usize),
    #[error("scheduler tick must be non-zero")]
    ZeroTick,
    #[error("max_vus must be at least 1")]
    ZeroMaxVus,
    #[error(transparent)]
    Threshold(#[from] ParseError),
    #[error("aggregation `{expression}` does not apply to metric `{metric}`")]
    InvalidAggregation { metric: String, expression: String },
}

/// How the target virtual-user count evolves over the test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcurrencyProfile {
    /// Hold a constant number of virtual users for the whole run.
    Fixed(usize),
    /// Ramp through an ordered set of stages, interpolating linearly
    /// towards each stage's target over its duration.
    Stages(Vec<RampStage>),
}

/// One time-bounded segment of a ramp profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampStage {
    pub duration: Duration,
    pub target: usize,
}

/// A threshold as written by the test author: a metric name and the raw
/// predicate strings attached to it. Parsed and checked by
/// [`TestConfig::parse_thresholds`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSpec {
    pub metric: String,
    pub predicates: Vec<String>,
}

/// Whether an indeterminate threshold (no matching samples) counts against
/// the overall result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndeterminatePolicy {
    /// Surface the indeterminate result but exclude it from the overall
    /// pass/fail outcome.
    #[default]
    Ignore,
    /// Treat indeterminate as a failure.
    Fail,
}

/// Everything a test run is parameterized by. Immutable once the run
/// starts: the controller takes it by value.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub name: String,
    pub concurrency: ConcurrencyProfile,
    /// Wall-clock duration for a fixed profile. Ignored for staged ramps,
    /// which carry their own total.
    pub duration: Option<Duration>,
    pub thresholds: Vec<ThresholdSpec>,
    /// Optional global iterations/sec cap shared by all virtual users.
    pub pacing: Option<NonZeroU32>,
    pub max_vus: usize,
    pub tick: Duration,
    pub grace_period: Duration,
    /// `None` evaluates thresholds only at the end of the test.
    pub eval_interval: Option<Duration>,
    pub abort_on_fail: bool,
    pub indeterminate: IndeterminatePolicy,
}

impl TestConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            concurrency: ConcurrencyProfile::Fixed(1),
            duration: None,
            thresholds: Vec::new(),
            pacing: None,
            max_vus: DEFAULT_MAX_VUS,
            tick: DEFAULT_TICK,
            grace_period: DEFAULT_GRACE_PERIOD,
            eval_interval: None,
            abort_on_fail: false,
            indeterminate: IndeterminatePolicy::default(),
        }
    }

    /// Target virtual-user count at `elapsed`: a step function for fixed
    /// profiles, piecewise-linear interpolation between stage boundaries
    /// for ramps. Always clamped to `0..=max_vus`.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let target = match &self.concurrency {
            ConcurrencyProfile::Fixed(vus) => *vus,
            ConcurrencyProfile::Stages(stages) => interpolate(stages, elapsed),
        };
        target.min(self.max_vus)
    }

    /// Total wall-clock duration of the run. `None` only for an
    /// unvalidated fixed profile missing its duration.
    pub fn total_duration(&self) -> Option<Duration> {
        match &self.concurrency {
            ConcurrencyProfile::Fixed(_) => self.duration,
            ConcurrencyProfile::Stages(stages) => {
                Some(stages.iter().map(|stage| stage.duration).sum())
            }
        }
    }

    /// Parse every configured threshold string and check each aggregation
    /// against its metric's kind. Unknown metric names are allowed through;
    /// they evaluate as indeterminate.
    pub fn parse_thresholds(&self) -> Result<Vec<Threshold>, ConfigError> {
        let mut thresholds = Vec::with_capacity(self.thresholds.len());
        for spec in &self.thresholds {
            let mut predicates = Vec::with_capacity(spec.predicates.len());
            for raw in &spec.predicates {
                let predicate: Predicate = raw.parse()?;
                if let Some(metric) = Metric::from_name(&spec.metric) {
                    if !predicate.agg.valid_for(metric.kind()) {
                        return Err(ConfigError::InvalidAggregation {
                            metric: spec.metric.clone(),
                            expression: raw.clone(),
                        });
                    }
                }
                predicates.push(predicate);
            }
            thresholds.push(Threshold {
                metric: spec.metric.clone(),
                predicates,
            });
        }
        Ok(thresholds)
    }

    /// Fail-fast structural validation, run before any virtual user spawns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.concurrency {
            ConcurrencyProfile::Fixed(0) => return Err(ConfigError::ZeroVus),
            ConcurrencyProfile::Fixed(_) => {
                if self.duration.is_none() {
                    return Err(ConfigError::MissingDuration);
                }
            }
            ConcurrencyProfile::Stages(stages) => {
                if stages.is_empty() {
                    return Err(ConfigError::EmptyStages);
                }
                for (idx, stage) in stages.iter().enumerate() {
                    if stage.duration.is_zero() {
                        return Err(ConfigError::ZeroDurationStage(idx));
                    }
                }
            }
        }

        if self.tick.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        if self.max_vus == 0 {
            return Err(ConfigError::ZeroMaxVus);
        }

        self.parse_thresholds().map(|_| ())
    }
}

// Ramps start from zero and interpolate towards each stage's target; past
// the final boundary the last target holds.
fn interpolate(stages: &[RampStage], elapsed: Duration) -> usize {
    let mut start = Duration::ZERO;
    let mut prev = 0usize;
    for stage in stages {
        let end = start + stage.duration;
        if elapsed < end {
            let frac = (elapsed - start).as_secs_f64() / stage.duration.as_secs_f64();
            let delta = stage.target as f64 - prev as f64;
            return (prev as f64 + delta * frac).round().max(0.) as usize;
        }
        start = end;
        prev = stage.target;
    }
    prev
}
