//! Storage the processor reaches through while executing.
//!
//! The repository resolves compiled types, holds documents and drafts, and
//! carries messages between tasks through named bags. It is shared by every
//! processor in a worker pool, so implementations are `Send + Sync` and take
//! `&self`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use tessera_foundation::{BagId, Name, Value};

use crate::types::CompiledType;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("repository lock poisoned")]
    Poisoned,
}

/// Types, documents, drafts and message bags.
///
/// Missing entries are `Ok(None)`; errors mean the store itself failed.
pub trait Repository: Send + Sync {
    fn read_type(&self, name: &Name) -> Result<Option<Arc<CompiledType>>>;

    fn read_document(&self, name: &Name) -> Result<Option<Value>>;
    fn write_document(&self, name: &Name, document: Value) -> Result<()>;
    /// Returns whether a document was removed.
    fn delete_document(&self, name: &Name) -> Result<bool>;

    fn read_draft(&self, name: &Name) -> Result<Option<Value>>;
    fn write_draft(&self, name: &Name, draft: Value) -> Result<()>;
    fn delete_draft(&self, name: &Name) -> Result<bool>;

    /// Append a message to a bag, creating the bag if needed.
    fn post_message(&self, bag: &BagId, message: Value) -> Result<()>;
    /// Take the oldest message from a bag.
    fn retrieve_message(&self, bag: &BagId) -> Result<Option<Value>>;
}

/// In-process repository.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    types: RwLock<HashMap<Name, Arc<CompiledType>>>,
    documents: RwLock<HashMap<Name, Value>>,
    drafts: RwLock<HashMap<Name, Value>>,
    bags: Mutex<HashMap<BagId, VecDeque<Value>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled type under its own name, replacing any previous one.
    pub fn add_type(&self, compiled: CompiledType) -> Result<()> {
        let mut types = self.types.write().map_err(|_| RepositoryError::Poisoned)?;
        types.insert(compiled.name.clone(), Arc::new(compiled));
        Ok(())
    }

    /// Messages waiting in a bag.
    pub fn bag_len(&self, bag: &BagId) -> Result<usize> {
        let bags = self.bags.lock().map_err(|_| RepositoryError::Poisoned)?;
        Ok(bags.get(bag).map_or(0, VecDeque::len))
    }
}

fn read(map: &RwLock<HashMap<Name, Value>>, name: &Name) -> Result<Option<Value>> {
    let map = map.read().map_err(|_| RepositoryError::Poisoned)?;
    Ok(map.get(name).cloned())
}

fn write(map: &RwLock<HashMap<Name, Value>>, name: &Name, value: Value) -> Result<()> {
    let mut map = map.write().map_err(|_| RepositoryError::Poisoned)?;
    map.insert(name.clone(), value);
    Ok(())
}

fn delete(map: &RwLock<HashMap<Name, Value>>, name: &Name) -> Result<bool> {
    let mut map = map.write().map_err(|_| RepositoryError::Poisoned)?;
    Ok(map.remove(name).is_some())
}

impl Repository for MemoryRepository {
    fn read_type(&self, name: &Name) -> Result<Option<Arc<CompiledType>>> {
        let types = self.types.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(types.get(name).cloned())
    }

    fn read_document(&self, name: &Name) -> Result<Option<Value>> {
        read(&self.documents, name)
    }

    fn write_document(&self, name: &Name, document: Value) -> Result<()> {
        write(&self.documents, name, document)
    }

    fn delete_document(&self, name: &Name) -> Result<bool> {
        delete(&self.documents, name)
    }

    fn read_draft(&self, name: &Name) -> Result<Option<Value>> {
        read(&self.drafts, name)
    }

    fn write_draft(&self, name: &Name, draft: Value) -> Result<()> {
        write(&self.drafts, name, draft)
    }

    fn delete_draft(&self, name: &Name) -> Result<bool> {
        delete(&self.drafts, name)
    }

    fn post_message(&self, bag: &BagId, message: Value) -> Result<()> {
        let mut bags = self.bags.lock().map_err(|_| RepositoryError::Poisoned)?;
        bags.entry(bag.clone()).or_default().push_back(message);
        Ok(())
    }

    fn retrieve_message(&self, bag: &BagId) -> Result<Option<Value>> {
        let mut bags = self.bags.lock().map_err(|_| RepositoryError::Poisoned)?;
        Ok(bags.get_mut(bag).and_then(VecDeque::pop_front))
    }
}
