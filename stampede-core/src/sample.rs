use std::time::Duration;

/// What a single iteration of the injected callback reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The callback completed and returned a protocol status code.
    Status(u16),
    Error(ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The callback returned an error. The virtual user keeps running.
    Callback,
    /// The iteration was force-terminated at the grace deadline.
    Aborted,
}

/// One record per completed iteration. Never mutated after creation, never
/// deleted for the duration of the test.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Offset from test start at which the iteration completed.
    pub offset: Duration,
    pub latency: Duration,
    pub outcome: Outcome,
    /// Per-virtual-user iteration index, strictly increasing.
    pub iteration: u64,
    /// Id of the virtual user that produced this sample. Unique within a run.
    pub vu: u64,
}

impl Sample {
    /// An iteration counts as failed when the callback errored out or
    /// reported a 4xx/5xx status.
    pub fn is_failed(&self) -> bool {
        match self.outcome {
            Outcome::Status(code) => code >= 400,
            Outcome::Error(_) => true,
        }
    }
}
