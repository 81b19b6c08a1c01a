use metrics_util::AtomicBucket;
use stampede_core::{Metric, MetricSeries, Sample};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

/// Intake handle cloned into every runner task.
///
/// Appends go through an [`AtomicBucket`], so runners never coordinate
/// with each other; the running totals are plain relaxed counters used for
/// cheap progress snapshots.
#[derive(Clone)]
pub(crate) struct SampleSink {
    bucket: Arc<AtomicBucket<Sample>>,
    total: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl SampleSink {
    pub fn record(&self, sample: Sample) {
        if sample.is_failed() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
        self.bucket.push(sample);
    }
}

/// Append-only store of every sample recorded during the run.
///
/// The collector is the single owner of the store; it drains the shared
/// bucket on each scheduler tick and once more at shutdown. Samples are
/// never deleted or mutated, so the store length is monotonically
/// non-decreasing. Within one virtual user, ordering is carried by the
/// sample's iteration index.
pub(crate) struct Collector {
    sink: SampleSink,
    store: Vec<Sample>,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            sink: SampleSink {
                bucket: Arc::new(AtomicBucket::new()),
                total: Arc::new(AtomicU64::new(0)),
                failed: Arc::new(AtomicU64::new(0)),
            },
            store: Vec::new(),
        }
    }

    pub fn sink(&self) -> SampleSink {
        self.sink.clone()
    }

    /// Move everything the runners have pushed since the last drain into
    /// the store.
    pub fn drain(&mut self) {
        let store = &mut self.store;
        self.sink.bucket.clear_with(|batch| {
            store.extend_from_slice(batch);
        });
    }

    pub fn samples(&self) -> &[Sample] {
        &self.store
    }

    /// Total recorded iterations, including any not yet drained.
    pub fn total(&self) -> u64 {
        self.sink.total.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.sink.failed.load(Ordering::Relaxed)
    }

    /// Aggregate the drained samples for `metric`, optionally restricted
    /// to the trailing `window` of the run.
    pub fn query(&self, metric: Metric, window: Option<Duration>, elapsed: Duration) -> MetricSeries {
        match window {
            Some(window) => {
                let cutoff = elapsed.saturating_sub(window);
                let span = elapsed - cutoff;
                MetricSeries::compute(
                    metric,
                    self.store.iter().filter(|sample| sample.offset >= cutoff),
                    span,
                )
            }
            None => MetricSeries::compute(metric, &self.store, elapsed),
        }
    }
}
