use crate::collector::SampleSink;
use governor::DefaultDirectRateLimiter;
use stampede_core::{ErrorKind, Outcome, Sample};
use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

/// State shared by every runner task, cloned per spawn.
#[derive(Clone)]
pub(crate) struct RunnerShared {
    pub sink: SampleSink,
    /// Optional global iterations/sec gate. Fixed for the whole run.
    pub pacing: Option<Arc<DefaultDirectRateLimiter>>,
    /// Test epoch; sample offsets are measured from here.
    pub started: Instant,
}

/// Scheduler-side handle to one virtual user.
pub(crate) struct RunnerHandle {
    pub id: u64,
    pub task: JoinHandle<()>,
    retire: Arc<AtomicBool>,
    in_flight: Arc<AtomicU64>,
}

impl RunnerHandle {
    /// Signal the runner to finish its current iteration and exit. The
    /// flag is only observed between iterations, never mid-request.
    pub fn retire(&self) {
        self.retire.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Index of the iteration the runner is currently executing.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

/// Start one virtual user: a loop that invokes the injected callback
/// back-to-back until retired, recording one sample per iteration.
pub(crate) fn spawn_runner<T, F, E>(id: u64, callback: T, shared: RunnerShared) -> RunnerHandle
where
    T: Fn() -> F + Send + Sync + Clone + 'static,
    F: Future<Output = Result<u16, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let retire = Arc::new(AtomicBool::new(false));
    let in_flight = Arc::new(AtomicU64::new(0));

    let retire_flag = retire.clone();
    let in_flight_counter = in_flight.clone();
    let task = tokio::spawn(async move {
        let mut iteration: u64 = 0;
        loop {
            if retire_flag.load(Ordering::Relaxed) {
                break;
            }
            in_flight_counter.store(iteration, Ordering::Relaxed);

            if let Some(limiter) = &shared.pacing {
                limiter.until_ready().await;
            }

            let start = Instant::now();
            // A failing iteration is recorded and the loop continues; one
            // bad iteration never stops the virtual user.
            let outcome = match callback().await {
                Ok(status) => Outcome::Status(status),
                Err(err) => {
                    trace!(vu = id, iteration, "Iteration failed: {err}");
                    Outcome::Error(ErrorKind::Callback)
                }
            };

            shared.sink.record(Sample {
                offset: shared.started.elapsed(),
                latency: start.elapsed(),
                outcome,
                iteration,
                vu: id,
            });

            iteration = iteration.wrapping_add(1);
        }
        trace!(vu = id, iterations = iteration, "Virtual user retired");
    });

    RunnerHandle {
        id,
        task,
        retire,
        in_flight,
    }
}
