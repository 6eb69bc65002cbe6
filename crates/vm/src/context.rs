//! Execution contexts: one activation frame per message invocation.
//!
//! A context owns its instruction pointer, its variable slots and its
//! handler stack. The constant, literal and message tables and the bytecode
//! are shared immutably with the compiled method it was activated from.
//! Only the methods below move the instruction pointer.

use std::sync::Arc;

use indexmap::IndexMap;
use tessera_foundation::{Symbol, Value};

use crate::error::{ActivationError, ExecutionError, Table};
use crate::instruction::{decode, Word};
use crate::snapshot::{ContextSnapshot, SnapshotError};
use crate::types::{Bytecode, CompiledType};

#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    target: Value,
    message: Symbol,
    arguments: Vec<Value>,
    variables: IndexMap<Symbol, Value>,
    constants: Arc<[Value]>,
    literals: Arc<[Value]>,
    messages: Arc<[Symbol]>,
    handlers: Vec<u16>,
    bytecode: Arc<Bytecode>,
    address: usize,
    instruction: Word,
    component_base: usize,
}

fn lookup<'a, T>(table: Table, entries: &'a [T], index: usize) -> Result<&'a T, ExecutionError> {
    index
        .checked_sub(1)
        .and_then(|i| entries.get(i))
        .ok_or(ExecutionError::InvalidIndex {
            table,
            index,
            len: entries.len(),
        })
}

impl Context {
    /// Bind `message` on `compiled` to a fresh frame.
    ///
    /// Missing trailing arguments are bound to `none`; surplus arguments are
    /// an error. `component_base` is the depth of the task's component stack
    /// at activation.
    pub fn activate(
        compiled: &CompiledType,
        target: Value,
        message: Symbol,
        mut arguments: Vec<Value>,
        component_base: usize,
    ) -> Result<Self, ActivationError> {
        let method = compiled
            .method(&message)
            .ok_or_else(|| ActivationError::UnknownMessage {
                type_name: compiled.name.clone(),
                message: message.clone(),
            })?;
        if arguments.len() > method.parameters.len() {
            return Err(ActivationError::TooManyArguments {
                message,
                expected: method.parameters.len(),
                found: arguments.len(),
            });
        }
        arguments.resize(method.parameters.len(), Value::None);

        Ok(Self {
            target,
            message,
            arguments,
            variables: method
                .variables
                .iter()
                .map(|name| (name.clone(), Value::None))
                .collect(),
            constants: compiled.constants.clone(),
            literals: method.literals.clone(),
            messages: method.messages.clone(),
            handlers: Vec::new(),
            bytecode: method.bytecode.clone(),
            address: 1,
            instruction: 0,
            component_base,
        })
    }

    // === Instruction pointer ===

    /// Whether `address` still names an instruction.
    pub fn is_runnable(&self) -> bool {
        self.address >= 1 && self.address <= self.bytecode.len()
    }

    /// Load the instruction at `address` into `instruction`. Returns false,
    /// leaving the context untouched, when the frame has run off its bytecode.
    pub fn fetch(&mut self) -> bool {
        match self.bytecode.get(self.address) {
            Some(word) => {
                self.instruction = word;
                true
            }
            None => false,
        }
    }

    /// The word `fetch` would load next, without loading it.
    pub fn peek(&self) -> Option<Word> {
        self.bytecode.get(self.address)
    }

    pub fn advance(&mut self) {
        self.address += 1;
    }

    pub fn jump_to(&mut self, address: usize) {
        self.address = address;
    }

    pub fn address(&self) -> usize {
        self.address
    }

    /// The most recently fetched word.
    pub fn instruction(&self) -> Word {
        self.instruction
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    // === Handlers ===

    pub fn push_handler(&mut self, address: u16) {
        self.handlers.push(address);
    }

    pub fn pop_handler(&mut self) -> Result<u16, ExecutionError> {
        self.handlers
            .pop()
            .ok_or(ExecutionError::EmptyHandlerStack {
                address: self.address,
            })
    }

    /// Pop the innermost handler and continue there.
    pub fn jump_to_handler(&mut self) -> Result<(), ExecutionError> {
        let address = self.pop_handler()?;
        self.jump_to(address as usize);
        Ok(())
    }

    pub fn has_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }

    pub fn handlers(&self) -> &[u16] {
        &self.handlers
    }

    // === Bindings ===

    pub fn target(&self) -> &Value {
        &self.target
    }

    pub fn message(&self) -> &Symbol {
        &self.message
    }

    /// Arguments after `$target`.
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Argument by 1-based index; index 1 is `$target`.
    pub fn argument(&self, index: usize) -> Result<&Value, ExecutionError> {
        if index == 1 {
            return Ok(&self.target);
        }
        match index.checked_sub(2).and_then(|i| self.arguments.get(i)) {
            Some(value) => Ok(value),
            None => Err(ExecutionError::InvalidIndex {
                table: Table::Argument,
                index,
                len: self.arguments.len() + 1,
            }),
        }
    }

    pub fn constant(&self, index: usize) -> Result<&Value, ExecutionError> {
        lookup(Table::Constant, &self.constants, index)
    }

    pub fn literal(&self, index: usize) -> Result<&Value, ExecutionError> {
        lookup(Table::Literal, &self.literals, index)
    }

    /// Message name by 1-based index.
    pub fn message_at(&self, index: usize) -> Result<&Symbol, ExecutionError> {
        lookup(Table::Message, &self.messages, index)
    }

    pub fn variable(&self, index: usize) -> Result<&Value, ExecutionError> {
        index
            .checked_sub(1)
            .and_then(|i| self.variables.get_index(i))
            .map(|(_, value)| value)
            .ok_or(ExecutionError::InvalidIndex {
                table: Table::Variable,
                index,
                len: self.variables.len(),
            })
    }

    pub fn set_variable(&mut self, index: usize, value: Value) -> Result<(), ExecutionError> {
        let len = self.variables.len();
        let slot = index
            .checked_sub(1)
            .and_then(|i| self.variables.get_index_mut(i))
            .map(|(_, slot)| slot)
            .ok_or(ExecutionError::InvalidIndex {
                table: Table::Variable,
                index,
                len,
            })?;
        *slot = value;
        Ok(())
    }

    /// Reset a variable to `none`.
    pub fn drop_variable(&mut self, index: usize) -> Result<(), ExecutionError> {
        self.set_variable(index, Value::None)
    }

    pub fn variable_named(&self, name: &Symbol) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &IndexMap<Symbol, Value> {
        &self.variables
    }

    /// Depth of the task's component stack when this frame was entered.
    pub fn component_base(&self) -> usize {
        self.component_base
    }

    // === Persistence ===

    /// Snapshot the frame. Target, variables and handlers are copied; the
    /// tables and bytecode are shared.
    pub fn freeze(&self) -> ContextSnapshot {
        ContextSnapshot {
            target: self.target.clone(),
            message: self.message.clone(),
            arguments: self.arguments.clone(),
            variables: self.variables.clone(),
            constants: self.constants.clone(),
            literals: self.literals.clone(),
            messages: self.messages.clone(),
            handlers: self.handlers.clone(),
            bytecode: self.bytecode.clone(),
            instruction: self.instruction,
            address: self.address as u32,
            component_base: self.component_base as u32,
        }
    }

    /// Rebuild a live frame from a snapshot. With `validate`, every word must
    /// decode and every handler address must fall inside the bytecode.
    pub fn thaw(snapshot: ContextSnapshot, validate: bool) -> Result<Self, SnapshotError> {
        let len = snapshot.bytecode.len();
        let address = snapshot.address as usize;
        if address == 0 || address > len + 1 {
            return Err(SnapshotError::Corrupt(format!(
                "address {} outside 1..={}",
                address,
                len + 1
            )));
        }
        if validate {
            for (index, word) in snapshot.bytecode.words().iter().enumerate() {
                decode(*word).map_err(|e| {
                    SnapshotError::Corrupt(format!("word {} at address {}: {}", word, index + 1, e))
                })?;
            }
            if let Some(bad) = snapshot
                .handlers
                .iter()
                .find(|h| **h == 0 || **h as usize > len)
            {
                return Err(SnapshotError::Corrupt(format!(
                    "handler address {} outside 1..={}",
                    bad, len
                )));
            }
        }

        Ok(Self {
            target: snapshot.target,
            message: snapshot.message,
            arguments: snapshot.arguments,
            variables: snapshot.variables,
            constants: snapshot.constants,
            literals: snapshot.literals,
            messages: snapshot.messages,
            handlers: snapshot.handlers,
            bytecode: snapshot.bytecode,
            address,
            instruction: snapshot.instruction,
            component_base: snapshot.component_base as usize,
        })
    }
}
