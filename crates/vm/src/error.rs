//! Fatal execution errors.
//!
//! Everything in this module is an implementation invariant violation:
//! corrupt bytecode, a bad snapshot, or a broken adapter. None of it is
//! delivered to the running task as a value. Expected failures (user
//! exceptions, unresolved targets, token exhaustion) travel through the
//! handler stack as exception values instead.

use tessera_foundation::{Name, Symbol};

use crate::instruction::{DecodeError, Word};
use crate::repository::RepositoryError;
use crate::task::TaskState;

/// Index-addressed table a lookup was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Argument,
    Constant,
    Literal,
    Message,
    Variable,
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Table::Argument => "argument",
            Table::Constant => "constant",
            Table::Literal => "literal",
            Table::Message => "message",
            Table::Variable => "variable",
        })
    }
}

/// Bytecode execution error.
///
/// These halt the task and are surfaced to the operator, never to the
/// task's own exception channel.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    /// A 1-based index fell outside its table.
    #[error("{table} index {index} out of range (table has {len} entries)")]
    InvalidIndex {
        /// The table that was indexed.
        table: Table,
        /// The requested 1-based index.
        index: usize,
        /// Number of entries in the table.
        len: usize,
    },

    /// The frame fetched past the end of its bytecode without returning.
    #[error("fetch at address {address} ran off the end of {len} instructions")]
    RanOffBytecode {
        /// Address that was fetched.
        address: usize,
        /// Length of the frame's bytecode.
        len: usize,
    },

    /// The fetched word is not a valid instruction.
    #[error("malformed instruction at address {address}: {source}")]
    Malformed {
        /// Address of the word.
        address: usize,
        /// The raw word.
        word: Word,
        /// Why it did not decode.
        source: DecodeError,
    },

    /// A jump or handler address points outside the bytecode.
    #[error("address {target} at {address} is outside 1..={len}")]
    InvalidAddress {
        /// Address of the jumping instruction.
        address: usize,
        /// The target it named.
        target: usize,
        /// Length of the frame's bytecode.
        len: usize,
    },

    /// `PULL HANDLER` or unwinding popped an empty handler stack.
    #[error("handler stack is empty at address {address}")]
    EmptyHandlerStack {
        /// Address of the popping instruction.
        address: usize,
    },

    /// An instruction popped below the frame's share of the component stack.
    #[error("component stack underflow at address {address}")]
    ComponentUnderflow {
        /// Address of the popping instruction.
        address: usize,
    },

    /// The task has no context to execute.
    #[error("call stack is empty")]
    EmptyCallStack,

    /// No dispatch handler is registered for an opcode.
    #[error("no handler registered for opcode {0}")]
    MissingHandler(&'static str),

    /// A task state change that the lifecycle does not allow.
    #[error("invalid task transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current state.
        from: TaskState,
        /// Requested state.
        to: TaskState,
    },

    /// The processor has no task loaded.
    #[error("no task is loaded")]
    NoTask,

    /// A task could not be started.
    #[error(transparent)]
    Activation(#[from] ActivationError),

    /// The repository failed while executing an instruction.
    #[error("repository failure: {0}")]
    Repository(#[from] RepositoryError),
}

/// Failure to bind a message to a compiled method.
///
/// Raised to the task as an `$unresolvedTarget` exception when it happens at
/// a `SEND`; returned as an [`ExecutionError`] when starting a new task.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActivationError {
    #[error("no compiled type named {0}")]
    UnknownType(Name),

    #[error("type {type_name} does not define {message}")]
    UnknownMessage { type_name: Name, message: Symbol },

    #[error("{message} takes {expected} argument(s) but {found} were given")]
    TooManyArguments {
        message: Symbol,
        expected: usize,
        found: usize,
    },
}
