use std::sync::Arc;
use tracing::Level;

/// Sink for the queue's diagnostic messages.
///
/// `queue` is the name of the emitting queue. Messages arrive already
/// labelled with that name and the delimiter, e.g. `Queue::dispatching task #3`.
/// A queue built without a logger stays silent.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, queue: &str, message: &str);
}

impl<L: Logger + ?Sized> Logger for Arc<L> {
    fn log(&self, level: Level, queue: &str, message: &str) {
        (**self).log(level, queue, message)
    }
}

/// Forwards every message to the `tracing` macros at the matching level,
/// with the queue name attached as the `queue` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, queue: &str, message: &str) {
        if level == Level::ERROR {
            tracing::error!(queue = %queue, "{}", message);
        } else if level == Level::WARN {
            tracing::warn!(queue = %queue, "{}", message);
        } else if level == Level::INFO {
            tracing::info!(queue = %queue, "{}", message);
        } else if level == Level::DEBUG {
            tracing::debug!(queue = %queue, "{}", message);
        } else {
            tracing::trace!(queue = %queue, "{}", message);
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _queue: &str, _message: &str) {}
}
