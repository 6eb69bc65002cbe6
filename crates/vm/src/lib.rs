//! Tessera VM - stack-based bytecode processor for long-running tasks.
//!
//! A task is one message send that may run for a long time: it executes
//! bytecode methods of compiled types, can block waiting for a message, and
//! is metered by a token budget. Between quanta a task lives only as a
//! [`TaskSnapshot`], so any worker may pick it up.
//!
//! # Architecture
//!
//! - [`instruction`] - 16-bit instruction words and their decoder
//! - [`types`] - compiled types, methods and bytecode
//! - [`assembler`] - text assembly used to build methods in tests and tools
//! - [`context`] - one activation of a method (an execution context)
//! - [`task`] - call stack, component stack, lifecycle and metering
//! - [`processor`] - the instruction cycle and opcode handlers
//! - [`repository`] - types, documents, drafts and message bags
//! - [`snapshot`] - serializable task state and its wire codec
//! - [`queue`] - the task queue adapter
//! - [`worker`] - workers pulling tasks from a queue
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera_foundation::{AccountId, Name, Value};
//! use tessera_vm::{MemoryRepository, Processor, TaskState, TypeBuilder, VmConfig};
//!
//! let echo = TypeBuilder::new("/acme/types/Echo")
//!     .method("$echo", &["$value"], "PUSH ARGUMENT $value\nPULL RESULT")
//!     .unwrap()
//!     .build();
//! let repository = MemoryRepository::new();
//! repository.add_type(echo).unwrap();
//!
//! let mut processor = Processor::new(VmConfig::default(), Arc::new(repository)).unwrap();
//! let target = Value::catalog([("$type", Value::Name(Name::from("/acme/types/Echo")))]);
//! let account = AccountId::new("/acme/accounts/alice");
//! processor
//!     .new_task(account, 10, target, "$echo".into(), vec![Value::from(5i64)])
//!     .unwrap();
//! assert_eq!(processor.run().unwrap(), TaskState::Completed);
//! assert_eq!(processor.task().unwrap().result(), Some(&Value::from(5i64)));
//! ```

pub mod assembler;
pub mod config;
pub mod context;
pub mod error;
pub mod instruction;
pub mod processor;
pub mod queue;
pub mod repository;
pub mod snapshot;
pub mod task;
pub mod types;
pub mod worker;

pub use assembler::{assemble, disassemble, AssembleError};
pub use config::{ConfigError, Verbosity, VmConfig};
pub use context::Context;
pub use error::{ActivationError, ExecutionError, Table};
pub use instruction::{decode, DecodeError, Instruction, Opcode, Word};
pub use processor::Processor;
pub use queue::{FailedTask, MemoryQueue, QueueError, TaskQueue};
pub use repository::{MemoryRepository, Repository, RepositoryError};
pub use snapshot::{ContextSnapshot, SnapshotError, TaskSnapshot};
pub use task::{Task, TaskState, WaitReason};
pub use types::{Bytecode, CompiledMethod, CompiledType, TypeBuilder};
pub use worker::{Outcome, Worker, WorkerError, WorkerPool};
