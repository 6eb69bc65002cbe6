//! Task queue adapter.
//!
//! The core only consumes this interface: workers dequeue a runnable task
//! snapshot, process one quantum, and hand the snapshot back with
//! `enqueue`, `ack` or `fail`. Delivery guarantees (at-least-once,
//! visibility timeouts) belong to the adapter.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tessera_foundation::TaskId;

use crate::snapshot::{decode_task, encode_task, SnapshotError, TaskSnapshot};

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("snapshot codec: {0}")]
    Codec(#[from] SnapshotError),

    #[error("task {0} is not in flight")]
    UnknownTask(TaskId),

    #[error("queue lock poisoned")]
    Poisoned,
}

/// Queue of task snapshots shared by workers.
pub trait TaskQueue: Send + Sync {
    /// Take the next runnable task, marking it in flight.
    fn dequeue_next(&self) -> Result<Option<TaskSnapshot>>;

    /// Make a task runnable, either new or returned after a quantum.
    fn enqueue(&self, snapshot: TaskSnapshot) -> Result<()>;

    /// The task terminated and its outcome was delivered.
    fn ack(&self, snapshot: &TaskSnapshot) -> Result<()>;

    /// The task hit a fatal error and must not run again.
    fn fail(&self, snapshot: &TaskSnapshot, reason: &str) -> Result<()>;

    /// Number of tasks waiting to be dequeued.
    fn pending(&self) -> Result<usize>;
}

/// A task that was failed, with the reason given.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedTask {
    pub snapshot: TaskSnapshot,
    pub reason: String,
}

#[derive(Debug, Default)]
struct Inner {
    ready: VecDeque<Vec<u8>>,
    in_flight: HashMap<TaskId, Vec<u8>>,
    acked: Vec<TaskSnapshot>,
    failed: Vec<FailedTask>,
}

/// In-process queue. Snapshots are held encoded, as a real transport would
/// carry them.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| QueueError::Poisoned)
    }

    pub fn in_flight(&self) -> Result<usize> {
        Ok(self.lock()?.in_flight.len())
    }

    /// Snapshots of every acknowledged task, in acknowledgement order.
    pub fn acked(&self) -> Result<Vec<TaskSnapshot>> {
        Ok(self.lock()?.acked.clone())
    }

    pub fn failed(&self) -> Result<Vec<FailedTask>> {
        Ok(self.lock()?.failed.clone())
    }

    /// Take every acknowledged snapshot, leaving the record empty.
    ///
    /// Acknowledged and failed tasks are kept until drained, so a
    /// long-running queue must drain them periodically.
    pub fn drain_acked(&self) -> Result<Vec<TaskSnapshot>> {
        Ok(std::mem::take(&mut self.lock()?.acked))
    }

    pub fn drain_failed(&self) -> Result<Vec<FailedTask>> {
        Ok(std::mem::take(&mut self.lock()?.failed))
    }
}

impl TaskQueue for MemoryQueue {
    fn dequeue_next(&self) -> Result<Option<TaskSnapshot>> {
        let mut inner = self.lock()?;
        let Some(bytes) = inner.ready.pop_front() else {
            return Ok(None);
        };
        let snapshot = decode_task(&bytes)?;
        inner.in_flight.insert(snapshot.id, bytes);
        Ok(Some(snapshot))
    }

    fn enqueue(&self, snapshot: TaskSnapshot) -> Result<()> {
        let bytes = encode_task(&snapshot)?;
        let mut inner = self.lock()?;
        inner.in_flight.remove(&snapshot.id);
        inner.ready.push_back(bytes);
        Ok(())
    }

    fn ack(&self, snapshot: &TaskSnapshot) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .in_flight
            .remove(&snapshot.id)
            .ok_or(QueueError::UnknownTask(snapshot.id))?;
        inner.acked.push(snapshot.clone());
        Ok(())
    }

    fn fail(&self, snapshot: &TaskSnapshot, reason: &str) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .in_flight
            .remove(&snapshot.id)
            .ok_or(QueueError::UnknownTask(snapshot.id))?;
        inner.failed.push(FailedTask {
            snapshot: snapshot.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn pending(&self) -> Result<usize> {
        Ok(self.lock()?.ready.len())
    }
}
