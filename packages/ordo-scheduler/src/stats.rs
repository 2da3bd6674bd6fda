use serde::Serialize;

/// Point-in-time view of a queue, taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub name: String,
    /// Tasks waiting in the heap.
    pub pending: usize,
    pub active_workers: usize,
    pub max_workers: usize,
    pub paused: bool,
    pub pushed: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    /// Handlers that returned an error or panicked.
    pub failed: u64,
}

impl QueueStats {
    /// Dispatched tasks that have not finished yet.
    pub fn in_flight(&self) -> u64 {
        self.dispatched - self.succeeded - self.failed
    }
}
