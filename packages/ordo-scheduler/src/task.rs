use crate::error::TaskError;
use futures::FutureExt;
use futures::future::BoxFuture;
use ordo_heap::Comparator;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Handler, context and arguments bound together, plus the sender half of the
/// task's completion channel. Resolves to the error text on failure.
type Invocation = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

/// A unit of work waiting in the queue.
///
/// Created by `push`, consumed when dispatched. Dropping a node without
/// running it resolves its [`TaskHandle`] with [`TaskError::Abandoned`].
pub struct TaskNode<P> {
    priority: P,
    sequence: u64,
    invocation: Invocation,
}

impl<P> TaskNode<P> {
    pub(crate) fn new<H, C, A, Fut, T, E>(
        priority: P,
        sequence: u64,
        handler: H,
        context: C,
        args: A,
    ) -> (Self, TaskHandle<T>)
    where
        H: FnOnce(C, A) -> Fut + Send + 'static,
        C: Send + 'static,
        A: Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let invocation: Invocation = Box::new(move || {
            async move {
                // The handler is called inside the guarded future so a panic
                // before its first await is caught too.
                let guarded = AssertUnwindSafe(async move { handler(context, args).await });
                let outcome = match guarded.catch_unwind().await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(error)) => Err(TaskError::Failed(error.into())),
                    Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
                };
                let report = match &outcome {
                    Ok(_) => Ok(()),
                    Err(error) => Err(error.to_string()),
                };
                // The caller may have dropped the handle; the task still counts.
                let _ = sender.send(outcome);
                report
            }
            .boxed()
        });

        let node = Self {
            priority,
            sequence,
            invocation,
        };
        (node, TaskHandle { receiver })
    }

    pub fn priority(&self) -> &P {
        &self.priority
    }

    /// Position in push order. Breaks ties between equal priorities.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Runs the handler to completion and delivers its outcome to the
    /// task's handle. Never panics, even if the handler does.
    pub async fn run(self) {
        let _ = self.execute().await;
    }

    pub(crate) async fn execute(self) -> Result<(), String> {
        (self.invocation)().await
    }
}

impl<P: fmt::Debug> fmt::Debug for TaskNode<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Heap ordering for task nodes: the domain comparator decides, and push
/// order breaks ties.
pub struct TaskOrder<P> {
    domain: Arc<dyn Comparator<P> + Send + Sync>,
}

impl<P> TaskOrder<P> {
    pub fn new(domain: Arc<dyn Comparator<P> + Send + Sync>) -> Self {
        Self { domain }
    }
}

impl<P> Clone for TaskOrder<P> {
    fn clone(&self) -> Self {
        Self {
            domain: Arc::clone(&self.domain),
        }
    }
}

impl<P> Comparator<TaskNode<P>> for TaskOrder<P> {
    fn compare(&self, a: &TaskNode<P>, b: &TaskNode<P>) -> bool {
        if self.domain.compare(&a.priority, &b.priority) {
            return true;
        }
        !self.domain.compare(&b.priority, &a.priority) && a.sequence < b.sequence
    }
}

/// Completion channel of one pushed task.
///
/// Resolves exactly once, with the handler's value or the reason it produced
/// none. Dropping the handle does not cancel the task.
#[must_use = "a TaskHandle does nothing unless awaited; drop it explicitly to ignore the outcome"]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}
