//! Frozen tasks and contexts.
//!
//! A snapshot is the portable form of a task between steps: it is what task
//! queues carry and what is written to disk when a task is parked. Encoding
//! is bincode followed by zstd, with a format version checked on decode.
//!
//! ```text
//! Task ──freeze──→ TaskSnapshot ──encode──→ bincode ──→ zstd ──→ bytes
//! Task ←──thaw──── TaskSnapshot ←─decode─── bincode ←── zstd ←── bytes
//! ```

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tessera_foundation::{AccountId, BagId, Symbol, TaskId, Value};
use tracing::debug;

use crate::instruction::Word;
use crate::task::{TaskState, WaitReason};
use crate::types::Bytecode;

/// Snapshot format version (increment on breaking changes).
pub const SNAPSHOT_VERSION: u32 = 1;

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Frozen execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub target: Value,
    pub message: Symbol,
    pub arguments: Vec<Value>,
    pub variables: IndexMap<Symbol, Value>,
    pub constants: Arc<[Value]>,
    pub literals: Arc<[Value]>,
    pub messages: Arc<[Symbol]>,
    pub handlers: Vec<u16>,
    pub bytecode: Arc<Bytecode>,
    /// Most recently fetched word.
    pub instruction: Word,
    /// 1-based address of the next instruction.
    pub address: u32,
    pub component_base: u32,
}

/// Frozen task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub version: u32,
    pub id: TaskId,
    pub account: AccountId,
    pub tokens: u64,
    /// Tokens the task started with.
    pub budget: u64,
    pub state: TaskState,
    pub wait: Option<WaitReason>,
    pub reply_to: Option<BagId>,
    pub components: Vec<Value>,
    /// Call stack, caller first.
    pub contexts: Vec<ContextSnapshot>,
    pub result: Option<Value>,
    pub exception: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("snapshot version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

/// Encode a task snapshot (bincode + zstd).
pub fn encode_task(snapshot: &TaskSnapshot) -> Result<Vec<u8>, SnapshotError> {
    let serialized =
        bincode::serialize(snapshot).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
    zstd::encode_all(&serialized[..], DEFAULT_COMPRESSION_LEVEL)
        .map_err(|e| SnapshotError::Compression(e.to_string()))
}

/// Decode a task snapshot, rejecting other format versions.
pub fn decode_task(bytes: &[u8]) -> Result<TaskSnapshot, SnapshotError> {
    let serialized =
        zstd::decode_all(bytes).map_err(|e| SnapshotError::Decompression(e.to_string()))?;
    let snapshot: TaskSnapshot = bincode::deserialize(&serialized)
        .map_err(|e| SnapshotError::Deserialization(e.to_string()))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::VersionMismatch {
            found: snapshot.version,
            expected: SNAPSHOT_VERSION,
        });
    }
    Ok(snapshot)
}

/// Write a task snapshot to disk.
///
/// The file is written beside `path` and renamed into place, so a reader
/// never sees a partial snapshot.
pub fn save_task(path: &Path, snapshot: &TaskSnapshot) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SnapshotError::Io(e.to_string()))?;
    }

    let bytes = encode_task(snapshot)?;
    let staging = path.with_extension("partial");
    std::fs::write(&staging, &bytes).map_err(|e| SnapshotError::Io(e.to_string()))?;
    std::fs::rename(&staging, path).map_err(|e| SnapshotError::Io(e.to_string()))?;

    debug!(
        path = %path.display(),
        task = %snapshot.id,
        bytes = bytes.len(),
        "Task snapshot written"
    );
    Ok(())
}

/// Load a task snapshot from disk.
pub fn load_task(path: &Path) -> Result<TaskSnapshot, SnapshotError> {
    let bytes = std::fs::read(path).map_err(|e| SnapshotError::Io(e.to_string()))?;
    let snapshot = decode_task(&bytes)?;

    debug!(
        path = %path.display(),
        task = %snapshot.id,
        state = ?snapshot.state,
        "Task snapshot loaded"
    );
    Ok(snapshot)
}
