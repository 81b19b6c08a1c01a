use crate::sample::{ErrorKind, Outcome, Sample};
use crate::threshold::ParseError;
use std::str::FromStr;
use std::time::Duration;

/// Built-in metrics a threshold can reference.
///
/// The names mirror the conventional load-testing surface: `iterations` and
/// `iteration_duration` describe the injected callback, `errors` the failed
/// fraction. The `http_reqs`/`http_req_duration`/`http_req_failed` spellings
/// are accepted as aliases for configurations ported from HTTP-centric tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Counter over completed iterations.
    Iterations,
    /// Trend over per-iteration wall-clock latency, in milliseconds.
    IterationDuration,
    /// Failed fraction of iterations (errors and 4xx/5xx statuses).
    Errors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

impl Metric {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "iterations" | "http_reqs" => Some(Self::Iterations),
            "iteration_duration" | "http_req_duration" => Some(Self::IterationDuration),
            "errors" | "error_rate" | "http_req_failed" => Some(Self::Errors),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Iterations => "iterations",
            Self::IterationDuration => "iteration_duration",
            Self::Errors => "errors",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Iterations => MetricKind::Counter,
            Self::IterationDuration => MetricKind::Trend,
            Self::Errors => MetricKind::Rate,
        }
    }
}

/// A statistic derived from a [`MetricSeries`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Count,
    /// Per-second rate for counters; failed fraction for rate metrics.
    Rate,
    Mean,
    Min,
    Max,
    Med,
    /// Quantile in percent, e.g. `Percentile(95.)` for p(95).
    Percentile(f64),
}

impl Aggregation {
    pub fn valid_for(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Counter => matches!(self, Self::Count | Self::Rate),
            MetricKind::Rate => matches!(self, Self::Rate),
            MetricKind::Trend => matches!(
                self,
                Self::Mean | Self::Min | Self::Max | Self::Med | Self::Percentile(_)
            ),
        }
    }
}

impl FromStr for Aggregation {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(Self::Count),
            "rate" => Ok(Self::Rate),
            "mean" | "avg" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "med" => Ok(Self::Med),
            other => {
                let quantile = other
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|inner| inner.parse::<f64>().ok())
                    .filter(|q| (0. ..=100.).contains(q));
                match quantile {
                    Some(q) => Ok(Self::Percentile(q)),
                    None => Err(ParseError::Aggregation(other.to_string())),
                }
            }
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Rate => write!(f, "rate"),
            Self::Mean => write!(f, "mean"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
            Self::Med => write!(f, "med"),
            Self::Percentile(q) => write!(f, "p({q})"),
        }
    }
}

/// Aggregate view over a set of samples for one metric.
///
/// Recomputed per query from the retained samples. Percentiles are exact
/// (nearest-rank over the sorted values); no approximation structure is
/// used since the sample store holds every latency anyway.
#[derive(Debug, Clone)]
pub struct MetricSeries {
    metric: Metric,
    count: u64,
    failed: u64,
    values: Vec<f64>,
    span: Duration,
}

impl MetricSeries {
    /// Compute the series for `metric` over `samples` covering `span` of
    /// wall-clock time.
    ///
    /// Selectors: `iterations` and `errors` match every sample;
    /// `iteration_duration` excludes force-aborted iterations, whose
    /// latency is not meaningful.
    pub fn compute<'a, I>(metric: Metric, samples: I, span: Duration) -> Self
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let mut count = 0;
        let mut failed = 0;
        let mut values = Vec::new();

        for sample in samples {
            match metric {
                Metric::Iterations => count += 1,
                Metric::Errors => {
                    count += 1;
                    if sample.is_failed() {
                        failed += 1;
                    }
                }
                Metric::IterationDuration => {
                    if sample.outcome == Outcome::Error(ErrorKind::Aborted) {
                        continue;
                    }
                    count += 1;
                    values.push(sample.latency.as_secs_f64() * 1e3);
                }
            }
        }
        values.sort_by(f64::total_cmp);

        Self {
            metric,
            count,
            failed,
            values,
            span,
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of samples matching the metric's selector.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The aggregated statistic, or `None` when no samples matched the
    /// metric's selector (an indeterminate observation).
    pub fn value(&self, agg: Aggregation) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        match agg {
            Aggregation::Count => Some(self.count as f64),
            Aggregation::Rate => match self.metric.kind() {
                MetricKind::Rate => Some(self.failed as f64 / self.count as f64),
                _ => {
                    if self.span.is_zero() {
                        None
                    } else {
                        Some(self.count as f64 / self.span.as_secs_f64())
                    }
                }
            },
            Aggregation::Mean => {
                if self.values.is_empty() {
                    None
                } else {
                    Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
                }
            }
            Aggregation::Min => self.values.first().copied(),
            Aggregation::Max => self.values.last().copied(),
            Aggregation::Med => self.percentile(50.),
            Aggregation::Percentile(q) => self.percentile(q),
        }
    }

    // Nearest-rank: the smallest value such that at least q% of the data is
    // at or below it.
    fn percentile(&self, q: f64) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let rank = ((q / 100.) * self.values.len() as f64).ceil().max(1.) as usize;
        Some(self.values[rank.min(self.values.len()) - 1])
    }
}
