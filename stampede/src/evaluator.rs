use crate::collector::Collector;
use stampede_core::{IndeterminatePolicy, Metric, Threshold, ThresholdResult, Verdict};
use std::time::Duration;

/// Checks the configured thresholds against the collected samples, either
/// periodically during the run or once at the end.
pub(crate) struct Evaluator {
    thresholds: Vec<Threshold>,
    policy: IndeterminatePolicy,
}

impl Evaluator {
    pub fn new(thresholds: Vec<Threshold>, policy: IndeterminatePolicy) -> Self {
        Self { thresholds, policy }
    }

    /// Evaluate every predicate against the current sample store. A
    /// threshold naming a metric with no matching samples (or an unknown
    /// metric) is reported as indeterminate, never a pass or a failure.
    pub fn evaluate(&self, collector: &Collector, elapsed: Duration) -> Vec<ThresholdResult> {
        let mut results = Vec::new();
        for threshold in &self.thresholds {
            let series = Metric::from_name(&threshold.metric)
                .map(|metric| collector.query(metric, None, elapsed));

            for predicate in &threshold.predicates {
                let (verdict, observed) = match &series {
                    Some(series) => predicate.evaluate(series),
                    None => (Verdict::Indeterminate, None),
                };
                results.push(ThresholdResult {
                    metric: threshold.metric.clone(),
                    expression: predicate.to_string(),
                    verdict,
                    observed,
                });
            }
        }
        results
    }

    /// Overall verdict: the conjunction of all results, with indeterminate
    /// counted per the configured policy.
    pub fn passed(&self, results: &[ThresholdResult]) -> bool {
        results.iter().all(|result| match result.verdict {
            Verdict::Pass => true,
            Verdict::Fail => false,
            Verdict::Indeterminate => self.policy == IndeterminatePolicy::Ignore,
        })
    }

    pub fn should_abort(&self, results: &[ThresholdResult]) -> bool {
        !self.passed(results)
    }
}
