use crate::metrics::{Aggregation, MetricSeries};
use std::str::FromStr;
use thiserror::Error;

/// Failure to parse a threshold predicate string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed threshold predicate `{0}`")]
    Predicate(String),
    #[error("unknown aggregation `{0}`")]
    Aggregation(String),
    #[error("invalid numeric bound in `{0}`")]
    Bound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Comparison {
    pub fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Le => observed <= bound,
            Self::Gt => observed > bound,
            Self::Ge => observed >= bound,
            Self::Eq => observed == bound,
        }
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
        };
        write!(f, "{s}")
    }
}

/// One pass/fail predicate over an aggregated metric, parsed from the
/// `<aggregation><operator><value>` string form, e.g. `p(95)<1000` or
/// `rate<1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub agg: Aggregation,
    pub cmp: Comparison,
    pub bound: f64,
}

impl Predicate {
    /// Check the predicate against the current series value. A series with
    /// no matching samples yields an indeterminate verdict, not a failure.
    pub fn evaluate(&self, series: &MetricSeries) -> (Verdict, Option<f64>) {
        match series.value(self.agg) {
            Some(observed) => {
                let verdict = if self.cmp.holds(observed, self.bound) {
                    Verdict::Pass
                } else {
                    Verdict::Fail
                };
                (verdict, Some(observed))
            }
            None => (Verdict::Indeterminate, None),
        }
    }
}

impl FromStr for Predicate {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(['<', '>', '='])
            .ok_or_else(|| ParseError::Predicate(s.to_string()))?;
        let (agg_str, rest) = s.split_at(split);

        let (cmp, bound_str) = if let Some(rest) = rest.strip_prefix("<=") {
            (Comparison::Le, rest)
        } else if let Some(rest) = rest.strip_prefix(">=") {
            (Comparison::Ge, rest)
        } else if let Some(rest) = rest.strip_prefix("==") {
            (Comparison::Eq, rest)
        } else if let Some(rest) = rest.strip_prefix('<') {
            (Comparison::Lt, rest)
        } else if let Some(rest) = rest.strip_prefix('>') {
            (Comparison::Gt, rest)
        } else {
            return Err(ParseError::Predicate(s.to_string()));
        };

        let agg = agg_str.trim().parse()?;
        let bound = bound_str
            .trim()
            .parse()
            .map_err(|_| ParseError::Bound(s.to_string()))?;

        Ok(Self { agg, cmp, bound })
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.agg, self.cmp, self.bound)
    }
}

/// All predicates configured for one metric name, as written in the test
/// configuration. The name is kept verbatim so a threshold referencing an
/// unknown metric can still be surfaced as indeterminate.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// The referenced metric had no matching samples.
    Indeterminate,
}

/// Outcome of checking one predicate at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub verdict: Verdict,
    pub observed: Option<f64>,
}
