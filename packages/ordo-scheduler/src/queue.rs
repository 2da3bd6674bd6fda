use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::logger::Logger;
use crate::stats::QueueStats;
use crate::task::{TaskHandle, TaskNode, TaskOrder};
use ordo_heap::{Comparator, MinHeap, NaturalOrder};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::Level;

/// Warning emitted when a queue falls back to the natural order of its
/// priority type.
pub const NO_COMPARATOR: &str = "No comparator function was supplied. This function should be supplied unless you really want the queue to order tasks by the natural order of their priority values.";

/// Priority-ordered task queue executing on a bounded pool of tokio tasks.
///
/// Cloning is cheap and every clone drives the same queue. Pushing never
/// blocks. Dispatching (eager `push`, `process`, `resume`) spawns onto the
/// ambient tokio runtime and must happen inside one.
pub struct PriorityQueue<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for PriorityQueue<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<P> {
    config: QueueConfig,
    label: String,
    logger: Option<Arc<dyn Logger>>,
    state: Mutex<State<P>>,
    idle: Notify,
}

/// Everything a push, a dispatch or a completion touches. Only ever
/// read-modify-written under `Inner::state`.
struct State<P> {
    heap: MinHeap<TaskNode<P>, TaskOrder<P>>,
    active_workers: usize,
    paused: bool,
    /// `process` has run at least once, so dispatch is owned by the queue
    /// from here on and `resume` restarts it.
    started: bool,
    /// A paced dispatcher task is alive.
    dispatching: bool,
    next_sequence: u64,
    last_launch: Option<Instant>,
    pushed: u64,
    dispatched: u64,
    succeeded: u64,
    failed: u64,
}

impl<P> State<P> {
    fn can_dispatch(&self, max_workers: usize) -> bool {
        !self.paused && self.active_workers < max_workers && !self.heap.is_empty()
    }

    fn is_idle(&self) -> bool {
        self.active_workers == 0 && self.heap.is_empty()
    }
}

enum Step<P> {
    Launch(TaskNode<P>),
    Wait(Instant),
    Stop,
}

impl<P: Send + 'static> PriorityQueue<P> {
    /// Starts a [`QueueBuilder`] for injecting a comparator or a logger.
    pub fn builder(config: QueueConfig) -> QueueBuilder<P> {
        QueueBuilder::new(config)
    }

    /// Queues `handler(context, args)` and returns the task's completion
    /// channel. When the queue is eager and not paused this also attempts a
    /// dispatch.
    pub fn push<H, C, A, Fut, T, E>(
        &self,
        priority: P,
        handler: H,
        context: C,
        args: A,
    ) -> TaskHandle<T>
    where
        H: FnOnce(C, A) -> Fut + Send + 'static,
        C: Send + 'static,
        A: Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let (sequence, pending, handle) = {
            let mut state = self.inner.lock();
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            let (node, handle) = TaskNode::new(priority, sequence, handler, context, args);
            state.heap.insert(node);
            state.pushed += 1;
            (sequence, state.heap.len(), handle)
        };
        self.inner.log(
            Level::DEBUG,
            format_args!("queued task #{} ({} pending)", sequence, pending),
        );

        if self.inner.config.eager {
            self.inner.process();
        }
        handle
    }

    /// [`push`](Self::push) for handlers that need no context or arguments.
    pub fn push_fn<F, Fut, T, E>(&self, priority: P, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.push(priority, move |(), ()| f(), (), ())
    }

    /// Removes the highest-priority task without running it.
    ///
    /// The caller owns the node from here on: run it with
    /// [`TaskNode::run`] or drop it to abandon the task.
    pub fn dequeue(&self) -> Option<TaskNode<P>> {
        let node = {
            let mut state = self.inner.lock();
            let node = state.heap.extract_min();
            if state.is_idle() {
                self.inner.idle.notify_waiters();
            }
            node
        };
        if let Some(node) = &node {
            self.inner
                .log(Level::DEBUG, format_args!("dequeued task #{}", node.sequence()));
        }
        node
    }

    /// Starts dispatching queued tasks while worker slots are free and the
    /// queue is not paused. Safe to call at any time and from anywhere; it
    /// never pushes the worker count past `max_workers`.
    pub fn process(&self) {
        self.inner.process();
    }

    /// Stops new dispatches. Running tasks finish normally and `push` keeps
    /// accepting work.
    pub fn pause(&self) {
        self.inner.lock().paused = true;
        self.inner.log(Level::INFO, format_args!("paused"));
    }

    /// Lifts a pause and restarts dispatching. A lazy queue that was never
    /// processed keeps waiting for its first `process`.
    pub fn resume(&self) {
        let restart = {
            let mut state = self.inner.lock();
            state.paused = false;
            self.inner.config.eager || state.started
        };
        self.inner.log(Level::INFO, format_args!("resumed"));
        if restart {
            self.inner.process();
        }
    }

    /// True between `pause` and `resume`, or from construction when the
    /// config asks for a paused start.
    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Number of tasks waiting to be dispatched.
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// No task is waiting. Running tasks do not count.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    /// True while at least one task is running.
    pub fn working(&self) -> bool {
        self.inner.lock().active_workers > 0
    }

    /// Tasks dispatched and not yet finished. Never above `max_workers`.
    pub fn active_workers(&self) -> usize {
        self.inner.lock().active_workers
    }

    pub fn max_workers(&self) -> usize {
        self.inner.config.max_workers
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Nothing queued and nothing running.
    pub fn is_idle(&self) -> bool {
        self.inner.lock().is_idle()
    }

    /// Waits until the queue is idle. A paused or never-processed queue with
    /// pending work does not become idle on its own.
    pub async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Snapshot of the counters, taken under a single lock.
    pub fn stats(&self) -> QueueStats {
        let state = self.inner.lock();
        QueueStats {
            name: self.inner.config.name.clone(),
            pending: state.heap.len(),
            active_workers: state.active_workers,
            max_workers: self.inner.config.max_workers,
            paused: state.paused,
            pushed: state.pushed,
            dispatched: state.dispatched,
            succeeded: state.succeeded,
            failed: state.failed,
        }
    }
}

impl<P: PartialOrd + Send + 'static> PriorityQueue<P> {
    /// A queue without a logger, ordered by the natural order of `P`,
    /// smallest first.
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        QueueBuilder::new(config).build()
    }
}

impl<P> fmt::Debug for PriorityQueue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("name", &self.inner.config.name)
            .field("max_workers", &self.inner.config.max_workers)
            .finish_non_exhaustive()
    }
}

impl<P: Send + 'static> Inner<P> {
    fn lock(&self) -> MutexGuard<'_, State<P>> {
        // Nothing panics while holding the lock except the worker-count
        // assertions, after which the queue is unusable anyway.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self, level: Level, message: fmt::Arguments<'_>) {
        if !self.config.verbose {
            return;
        }
        if let Some(logger) = &self.logger {
            logger.log(
                level,
                &self.config.name,
                &format!("{}{}", self.label, message),
            );
        }
    }

    fn process(self: &Arc<Self>) {
        if self.config.fn_delay.is_zero() {
            loop {
                let node = {
                    let mut state = self.lock();
                    state.started = true;
                    match self.claim_next(&mut state) {
                        Some(node) => node,
                        None => break,
                    }
                };
                self.spawn_worker(node);
            }
            return;
        }

        {
            let mut state = self.lock();
            state.started = true;
            if state.dispatching || !state.can_dispatch(self.config.max_workers) {
                return;
            }
            state.dispatching = true;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.paced_dispatch().await });
    }

    /// Single dispatcher used when `fn_delay` is set: keeps launching while
    /// capacity allows, never two launches closer than `fn_delay`.
    async fn paced_dispatch(self: Arc<Self>) {
        loop {
            let step = {
                let mut state = self.lock();
                let ready_at = state.last_launch.map(|at| at + self.config.fn_delay);
                if !state.can_dispatch(self.config.max_workers) {
                    state.dispatching = false;
                    Step::Stop
                } else if let Some(at) = ready_at.filter(|at| *at > Instant::now()) {
                    Step::Wait(at)
                } else {
                    match self.claim_next(&mut state) {
                        Some(node) => Step::Launch(node),
                        None => {
                            state.dispatching = false;
                            Step::Stop
                        }
                    }
                }
            };

            match step {
                Step::Launch(node) => self.spawn_worker(node),
                Step::Wait(at) => tokio::time::sleep_until(at).await,
                Step::Stop => return,
            }
        }
    }

    /// Pops the next node and claims a worker slot for it.
    fn claim_next(&self, state: &mut State<P>) -> Option<TaskNode<P>> {
        if !state.can_dispatch(self.config.max_workers) {
            return None;
        }
        let node = state.heap.extract_min()?;
        state.active_workers += 1;
        assert!(
            state.active_workers <= self.config.max_workers,
            "active workers ({}) exceeded max_workers ({})",
            state.active_workers,
            self.config.max_workers
        );
        state.dispatched += 1;
        state.last_launch = Some(Instant::now());
        Some(node)
    }

    fn spawn_worker(self: &Arc<Self>, node: TaskNode<P>) {
        let sequence = node.sequence();
        self.log(Level::DEBUG, format_args!("dispatching task #{}", sequence));

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            // execute() catches panics, so finish() always runs.
            let outcome = node.execute().await;
            inner.finish(sequence, outcome);
        });
    }

    fn finish(self: &Arc<Self>, sequence: u64, outcome: Result<(), String>) {
        {
            let mut state = self.lock();
            assert!(
                state.active_workers > 0,
                "task #{} finished with no active workers",
                sequence
            );
            state.active_workers -= 1;
            match outcome {
                Ok(()) => state.succeeded += 1,
                Err(_) => state.failed += 1,
            }
            if state.is_idle() {
                self.idle.notify_waiters();
            }
        }

        match &outcome {
            Ok(()) => self.log(Level::DEBUG, format_args!("task #{} completed", sequence)),
            Err(error) => self.log(
                Level::WARN,
                format_args!("task #{} failed: {}", sequence, error),
            ),
        }

        self.process();
    }
}

/// Assembles a [`PriorityQueue`] from its configuration record and the two
/// injectable capabilities: ordering and logging.
pub struct QueueBuilder<P> {
    config: QueueConfig,
    comparator: Option<Arc<dyn Comparator<P> + Send + Sync>>,
    logger: Option<Arc<dyn Logger>>,
}

impl<P: Send + 'static> QueueBuilder<P> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            comparator: None,
            logger: None,
        }
    }

    /// Domain ordering of priorities: `compare(a, b)` is true when `a` must
    /// run before `b`.
    pub fn comparator<C>(mut self, comparator: C) -> Self
    where
        C: Comparator<P> + Send + Sync + 'static,
    {
        self.comparator = Some(Arc::new(comparator));
        self
    }

    pub fn logger<L>(mut self, logger: L) -> Self
    where
        L: Logger + 'static,
    {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Builds the queue, requiring an explicit comparator.
    pub fn try_build(self) -> Result<PriorityQueue<P>, QueueError> {
        let comparator = self
            .comparator
            .clone()
            .ok_or(QueueError::MissingComparator)?;
        self.assemble(comparator)
    }

    fn assemble(
        self,
        comparator: Arc<dyn Comparator<P> + Send + Sync>,
    ) -> Result<PriorityQueue<P>, QueueError> {
        self.config.validate()?;

        let state = State {
            heap: MinHeap::with_comparator(TaskOrder::new(comparator)),
            active_workers: 0,
            paused: self.config.paused,
            started: false,
            dispatching: false,
            next_sequence: 0,
            last_launch: None,
            pushed: 0,
            dispatched: 0,
            succeeded: 0,
            failed: 0,
        };
        let inner = Inner {
            label: self.config.label(),
            config: self.config,
            logger: self.logger,
            state: Mutex::new(state),
            idle: Notify::new(),
        };
        Ok(PriorityQueue {
            inner: Arc::new(inner),
        })
    }
}

impl<P: PartialOrd + Send + 'static> QueueBuilder<P> {
    /// Builds the queue. Without a comparator it orders by the natural order
    /// of `P` and warns through the logger.
    pub fn build(self) -> Result<PriorityQueue<P>, QueueError> {
        // Reject a bad config before warning about the comparator.
        self.config.validate()?;
        let comparator: Arc<dyn Comparator<P> + Send + Sync> = match &self.comparator {
            Some(comparator) => Arc::clone(comparator),
            None => {
                if let Some(logger) = &self.logger {
                    logger.log(
                        Level::WARN,
                        &self.config.name,
                        &format!("{}{}", self.config.label(), NO_COMPARATOR),
                    );
                }
                Arc::new(NaturalOrder)
            }
        };
        self.assemble(comparator)
    }
}
