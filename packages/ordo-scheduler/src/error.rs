use thiserror::Error;

/// Errors raised while constructing a queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no comparator was supplied and the priority type has no natural order")]
    MissingComparator,

    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),
}

/// Why a task did not produce a value. Delivered through the task's
/// [`TaskHandle`](crate::TaskHandle); never surfaces on the queue itself.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The handler returned an error.
    #[error("task failed: {0:#}")]
    Failed(anyhow::Error),

    /// The handler panicked. Holds the panic payload when it was a string.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task was dropped before it ran, e.g. the queue went away first.
    #[error("task was dropped before it ran")]
    Abandoned,
}

impl TaskError {
    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }
}
