use thiserror::Error;

/// Failures that abort a whole run. Everything per-item is counted and skipped instead.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("work list resolved to zero items")]
    Validation,
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("partition {0} worker panicked")]
    WorkerPanicked(usize),
}
