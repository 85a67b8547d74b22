//! Background execution - Hands a task to a host scheduler
//!
//! Submitting returns a [`TaskHandle`] immediately. When the task ends, the
//! termination callback registered at submit time runs exactly once with the
//! [`TaskOutcome`], and the handle resolves.

use crate::orchestration::task::{Task, TaskOutcome};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Callback receiving the outcome of a background task
pub type TerminationCallback = Box<dyn FnOnce(TaskOutcome) + Send + 'static>;

/// Host-provided executor for background jobs
pub trait TaskScheduler: Send + Sync {
    fn submit(&self, job: BoxFuture<'static, ()>);
}

/// Scheduler running jobs on the current tokio runtime
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Scheduler bound to the runtime of the calling context
    ///
    /// Must be called from within a tokio runtime.
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }

    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl TaskScheduler for TokioScheduler {
    fn submit(&self, job: BoxFuture<'static, ()>) {
        self.handle.spawn(job);
    }
}

/// Handle of a submitted task
#[derive(Debug)]
pub struct TaskHandle {
    id: Uuid,
    done: oneshot::Receiver<bool>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait until the task has ended; `true` when it succeeded
    ///
    /// A job dropped by the scheduler without running counts as failed.
    pub async fn wait(self) -> bool {
        self.done.await.unwrap_or(false)
    }
}

/// Submit a task; progress is not reported in background mode
pub fn submit_task(
    scheduler: &dyn TaskScheduler,
    task: Task,
    on_terminated: TerminationCallback,
) -> TaskHandle {
    let id = Uuid::new_v4();
    let (tx, rx) = oneshot::channel();

    tracing::info!(task = %id, layers = task.layers().len(), "submitting background task");
    let job = async move {
        let result = task.run(None).await;
        let outcome = TaskOutcome::from_run(id, &task, result, true);
        let succeeded = outcome.succeeded();
        on_terminated(outcome);
        let _ = tx.send(succeeded);
    }
    .boxed();

    scheduler.submit(job);
    TaskHandle { id, done: rx }
}
