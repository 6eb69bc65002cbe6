//! Workers: drain a task queue one quantum at a time.
//!
//! ```text
//! dequeue ─→ thaw ─→ waiting? ─┬─ message arrived → resume ─┐
//!                              └─ still empty → requeue     │
//!              ┌───────────────────────────────────────────┘
//!              ▼
//!         run ≤ quantum ─┬─ completed/abandoned → post reply, ack
//!                        ├─ active/waiting      → requeue
//!                        └─ fatal error         → fail (snapshot as dequeued,
//!                                                  or as resumed)
//! ```
//!
//! Tasks share no mutable state, so a pool of workers needs no locking
//! beyond what the queue and repository already do.

use std::fmt;
use std::sync::Arc;
use std::thread;

use tessera_foundation::TaskId;
use tessera_intrinsics::Capabilities;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, VmConfig};
use crate::error::ExecutionError;
use crate::processor::Processor;
use crate::queue::{QueueError, TaskQueue};
use crate::repository::{Repository, RepositoryError};
use crate::snapshot::TaskSnapshot;
use crate::task::{Task, TaskState};

/// What one `process_next` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The queue was empty.
    Idle,
    Completed(TaskId),
    Abandoned(TaskId),
    /// Used its whole quantum and went back on the queue.
    Requeued(TaskId),
    /// Ran until it blocked on an empty bag, then went back on the queue.
    Waiting(TaskId),
    /// Was waiting and its message has not arrived; requeued untouched.
    Parked(TaskId),
    /// Hit a fatal error and was failed on the queue.
    Failed(TaskId),
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    #[error("worker thread {0} panicked")]
    Panicked(usize),
}

pub struct Worker {
    processor: Processor,
    queue: Arc<dyn TaskQueue>,
}

impl Worker {
    pub fn new(
        config: VmConfig,
        repository: Arc<dyn Repository>,
        queue: Arc<dyn TaskQueue>,
    ) -> Result<Self, WorkerError> {
        Ok(Self {
            processor: Processor::new(config, repository)?,
            queue,
        })
    }

    pub fn with_capabilities(mut self, capabilities: Arc<Capabilities>) -> Self {
        self.processor = self.processor.with_capabilities(capabilities);
        self
    }

    /// Take one task off the queue and give it one quantum.
    pub fn process_next(&mut self) -> Result<Outcome, WorkerError> {
        let Some(mut snapshot) = self.queue.dequeue_next()? else {
            return Ok(Outcome::Idle);
        };
        let id = snapshot.id;

        if let Err(e) = self.processor.load_task(snapshot.clone()).map(|_| ()) {
            return self.fail(&snapshot, &e);
        }

        if self.state() == Some(TaskState::Waiting) {
            match self.processor.resume() {
                // The message is out of its bag now; only the task holds it.
                Ok(true) => {
                    if let Some(task) = self.processor.task() {
                        snapshot = task.freeze();
                    }
                }
                Ok(false) => {
                    self.processor.take_task();
                    self.queue.enqueue(snapshot)?;
                    return Ok(Outcome::Parked(id));
                }
                Err(e) => return self.fail(&snapshot, &e),
            }
        }

        let quantum = self.processor.config().quantum;
        if let Err(e) = self.processor.run_for(quantum) {
            return self.fail(&snapshot, &e);
        }
        let Some(task) = self.processor.take_task() else {
            return self.fail(&snapshot, &ExecutionError::NoTask);
        };

        match task.state() {
            TaskState::Completed | TaskState::Abandoned => self.finish(task),
            TaskState::Active => {
                debug!(task = %id, tokens = task.tokens(), "Quantum used, requeueing");
                self.queue.enqueue(task.freeze())?;
                Ok(Outcome::Requeued(id))
            }
            TaskState::Waiting => {
                debug!(task = %id, "Task waiting on message");
                self.queue.enqueue(task.freeze())?;
                Ok(Outcome::Waiting(id))
            }
        }
    }

    /// Deliver a terminal task's outcome and acknowledge it.
    fn finish(&mut self, task: Task) -> Result<Outcome, WorkerError> {
        if let (Some(bag), Some(payload)) = (task.reply_to(), task.outcome()) {
            self.processor
                .repository()
                .post_message(bag, payload.clone())?;
        }
        self.queue.ack(&task.freeze())?;

        info!(
            task = %task.id(),
            state = ?task.state(),
            tokens_used = task.tokens_used(),
            "Task finished"
        );
        Ok(match task.state() {
            TaskState::Completed => Outcome::Completed(task.id()),
            _ => Outcome::Abandoned(task.id()),
        })
    }

    fn fail(
        &mut self,
        snapshot: &TaskSnapshot,
        reason: &dyn fmt::Display,
    ) -> Result<Outcome, WorkerError> {
        let reason = reason.to_string();
        if self.processor.config().verbosity.logs_failures() {
            error!(task = %snapshot.id, reason = %reason, "Task failed");
        }
        self.processor.take_task();
        self.queue.fail(snapshot, &reason)?;
        Ok(Outcome::Failed(snapshot.id))
    }

    fn state(&self) -> Option<TaskState> {
        self.processor.task().map(Task::state)
    }

    /// Process tasks until the queue is empty or only parked tasks remain.
    pub fn run_until_idle(&mut self) -> Result<Vec<Outcome>, WorkerError> {
        let mut outcomes = Vec::new();
        let mut parked = 0;
        loop {
            let outcome = self.process_next()?;
            match outcome {
                Outcome::Idle => break,
                Outcome::Parked(_) => parked += 1,
                _ => parked = 0,
            }
            outcomes.push(outcome);
            if parked > self.queue.pending()? {
                debug!(parked, "Only parked tasks remain");
                break;
            }
        }
        Ok(outcomes)
    }
}

/// A fixed number of workers sharing one queue and repository.
pub struct WorkerPool {
    config: VmConfig,
    repository: Arc<dyn Repository>,
    queue: Arc<dyn TaskQueue>,
    capabilities: Arc<Capabilities>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(
        config: VmConfig,
        repository: Arc<dyn Repository>,
        queue: Arc<dyn TaskQueue>,
        workers: usize,
    ) -> Result<Self, WorkerError> {
        config.validate()?;
        if workers == 0 {
            return Err(ConfigError::Invalid("workers must be > 0".to_string()).into());
        }
        Ok(Self {
            config,
            repository,
            queue,
            capabilities: Capabilities::standard(),
            workers,
        })
    }

    pub fn with_capabilities(mut self, capabilities: Arc<Capabilities>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Run every worker on its own thread until each finds nothing to do.
    /// Outcomes from all workers are returned in no particular order.
    pub fn run_until_idle(&self) -> Result<Vec<Outcome>, WorkerError> {
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.workers);
            for index in 0..self.workers {
                let handle = thread::Builder::new()
                    .name(format!("tessera-worker-{}", index))
                    .spawn_scoped(scope, move || {
                        debug!(worker = index, "Worker started");
                        let mut worker = Worker::new(
                            self.config,
                            self.repository.clone(),
                            self.queue.clone(),
                        )?
                        .with_capabilities(self.capabilities.clone());
                        worker.run_until_idle()
                    })
                    .map_err(|e| WorkerError::Spawn(e.to_string()))?;
                handles.push(handle);
            }

            let mut outcomes = Vec::new();
            for (index, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(result) => outcomes.extend(result?),
                    Err(_) => {
                        warn!(worker = index, "Worker thread panicked");
                        return Err(WorkerError::Panicked(index));
                    }
                }
            }
            Ok(outcomes)
        })
    }
}
