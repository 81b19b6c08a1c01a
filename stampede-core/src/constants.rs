use std::time::Duration;

/// Resolution at which the scheduler reconciles the virtual user
/// population against the target concurrency.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// How long the scheduler waits for in-flight iterations to finish after a
/// stop signal before force-terminating the stragglers.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Ceiling applied to any concurrency target, regardless of profile.
pub const DEFAULT_MAX_VUS: usize = 10_000;

/// How often the controller emits a progress snapshot during the run.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
