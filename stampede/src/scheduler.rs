use crate::runner::{spawn_runner, RunnerHandle, RunnerShared};
use stampede_core::{ErrorKind, Outcome, Sample};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

/// Owns the virtual user population. Single writer: only the controller's
/// tick loop touches the spawn/retire bookkeeping.
pub(crate) struct Scheduler<T> {
    callback: T,
    shared: RunnerShared,
    runners: Vec<RunnerHandle>,
    /// Retired mid-run, still finishing their current iteration.
    retiring: Vec<RunnerHandle>,
    next_id: u64,
}

impl<T, F, E> Scheduler<T>
where
    T: Fn() -> F + Send + Sync + Clone + 'static,
    F: Future<Output = Result<u16, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    pub fn new(callback: T, shared: RunnerShared) -> Self {
        Self {
            callback,
            shared,
            runners: Vec::new(),
            retiring: Vec::new(),
            next_id: 0,
        }
    }

    pub fn active(&self) -> usize {
        self.runners.len()
    }

    /// Bring the active population to `target`: spawn the delta
    /// immediately (no queueing, load generation is unthrottled beyond the
    /// configured concurrency) or retire the newest runners gracefully.
    pub fn reconcile(&mut self, target: usize) {
        self.retiring.retain(|runner| !runner.is_finished());

        // A runner only exits on retire, so an early exit means the
        // callback panicked; replace it on the next delta below.
        let before = self.runners.len();
        self.runners.retain(|runner| !runner.is_finished());
        if self.runners.len() < before {
            warn!(
                "{} virtual user(s) exited unexpectedly",
                before - self.runners.len()
            );
        }

        let active = self.runners.len();
        if active < target {
            debug!("Scaling up: {active} -> {target}");
            while self.runners.len() < target {
                let id = self.next_id;
                self.next_id += 1;
                self.runners
                    .push(spawn_runner(id, self.callback.clone(), self.shared.clone()));
            }
        } else if active > target {
            debug!("Scaling down: {active} -> {target}");
            for runner in self.runners.drain(target..) {
                runner.retire();
                self.retiring.push(runner);
            }
        }
    }

    /// Stop everything: signal retirement, wait for the last runner to
    /// exit or the grace deadline to expire, then force-terminate the
    /// stragglers. Each aborted runner is recorded as one aborted
    /// iteration. Returns the number of aborted virtual users.
    pub async fn drain(&mut self, grace: Duration) -> usize {
        for runner in &self.runners {
            runner.retire();
        }
        let pending: Vec<RunnerHandle> = self
            .runners
            .drain(..)
            .chain(self.retiring.drain(..))
            .collect();

        let deadline = Instant::now() + grace;
        let mut aborted = 0;
        for mut runner in pending {
            match tokio::time::timeout_at(deadline, &mut runner.task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    error!(vu = runner.id, "Virtual user task failed: {join_err}");
                }
                Err(_elapsed) => {
                    warn!(
                        vu = runner.id,
                        "Grace deadline expired; aborting in-flight iteration"
                    );
                    runner.task.abort();
                    self.shared.sink.record(Sample {
                        offset: self.shared.started.elapsed(),
                        // Not meaningful for a request that never finished.
                        latency: Duration::ZERO,
                        outcome: Outcome::Error(ErrorKind::Aborted),
                        iteration: runner.in_flight(),
                        vu: runner.id,
                    });
                    aborted += 1;
                }
            }
        }

        aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Collector;

    fn shared(collector: &Collector) -> RunnerShared {
        RunnerShared {
            sink: collector.sink(),
            pacing: None,
            started: Instant::now(),
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn reconcile_converges_to_the_target() {
        let collector = Collector::new();
        let mut scheduler = Scheduler::new(
            || async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok::<u16, &str>(200)
            },
            shared(&collector),
        );

        scheduler.reconcile(10);
        assert_eq!(scheduler.active(), 10);

        scheduler.reconcile(10);
        assert_eq!(scheduler.active(), 10);

        scheduler.reconcile(3);
        assert_eq!(scheduler.active(), 3);

        scheduler.drain(Duration::from_secs(1)).await;
        assert_eq!(scheduler.active(), 0);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn vu_ids_are_unique_across_respawns() {
        let mut collector = Collector::new();
        let mut scheduler = Scheduler::new(
            || async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok::<u16, &str>(200)
            },
            shared(&collector),
        );

        scheduler.reconcile(4);
        scheduler.reconcile(1);
        scheduler.reconcile(4);
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.drain(Duration::from_secs(1)).await;

        collector.drain();
        let mut ids: Vec<u64> = collector.samples().iter().map(|s| s.vu).collect();
        ids.sort_unstable();
        ids.dedup();
        // 4 initial + 3 respawned
        assert!(ids.len() <= 7);
        assert!(ids.iter().all(|&id| id < 7));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn drain_stops_sample_collection() {
        let collector = Collector::new();
        let mut scheduler = Scheduler::new(
            || async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok::<u16, &str>(200)
            },
            shared(&collector),
        );

        scheduler.reconcile(5);
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.drain(Duration::from_secs(1)).await;

        let settled = collector.total();
        assert!(settled > 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(collector.total(), settled);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn stragglers_are_aborted_at_the_grace_deadline() {
        let mut collector = Collector::new();
        let mut scheduler = Scheduler::new(
            || async {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok::<u16, &str>(200)
            },
            shared(&collector),
        );

        scheduler.reconcile(2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let aborted = scheduler.drain(Duration::from_millis(100)).await;
        assert_eq!(aborted, 2);

        collector.drain();
        let aborted_samples = collector
            .samples()
            .iter()
            .filter(|s| s.outcome == Outcome::Error(ErrorKind::Aborted))
            .count();
        assert_eq!(aborted_samples, 2);
    }
}
