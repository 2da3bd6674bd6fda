//! Priority-ordered task scheduling on a bounded pool of async workers.
//!
//! Work is pushed with a priority, kept in an [`ordo_heap::MinHeap`] ordered
//! by a pluggable [`Comparator`] (push order breaks ties), and launched on the
//! ambient tokio runtime while fewer than `max_workers` tasks are running.

pub mod config;
pub mod error;
pub mod logger;
pub mod queue;
pub mod stats;
pub mod task;

pub use config::QueueConfig;
pub use error::{QueueError, TaskError};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use ordo_heap::{Comparator, NaturalOrder};
pub use queue::{NO_COMPARATOR, PriorityQueue, QueueBuilder};
pub use stats::QueueStats;
pub use task::{TaskHandle, TaskNode, TaskOrder};
