//! The processor: drives one task an instruction at a time.
//!
//! # Instruction cycle
//!
//! ```text
//! step_clock
//!   ├─ not active?        → false
//!   ├─ no tokens left?    → abandon ($resourceExhausted), false
//!   ├─ fetch              → RanOffBytecode if the frame has no instruction
//!   ├─ decode             → Malformed if the word is not an instruction
//!   ├─ dispatch handler   → Raise unwinds through the handler stacks
//!   ├─ consume token      → abandon if the budget reaches zero
//!   └─ state == active
//! ```
//!
//! A fatal [`ExecutionError`] halts the task where it stands: the processor
//! records the fault and refuses to step the task again. The fault reaches
//! the operator (log, queue `fail`), never the task's exception channel.

mod handlers;
mod registry;

use std::sync::Arc;

use tessera_foundation::{AccountId, Symbol, TaskId, Value};
use tessera_intrinsics::Capabilities;
use tracing::{debug, error, trace};

use crate::config::{ConfigError, VmConfig};
use crate::context::Context;
use crate::error::{ActivationError, ExecutionError};
use crate::instruction::{decode, Instruction};
use crate::repository::Repository;
use crate::snapshot::{SnapshotError, TaskSnapshot};
use crate::task::{Task, TaskState, WaitReason};

pub use handlers::{Handler, Interrupt, Machine};
pub use registry::{handler_for, opcode_specs, OpcodeSpec};

pub struct Processor {
    config: VmConfig,
    repository: Arc<dyn Repository>,
    capabilities: Arc<Capabilities>,
    task: Option<Task>,
    fault: Option<ExecutionError>,
}

impl Processor {
    /// A processor over `repository` with the standard capabilities.
    pub fn new(config: VmConfig, repository: Arc<dyn Repository>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            repository,
            capabilities: Capabilities::standard(),
            task: None,
            fault: None,
        })
    }

    pub fn with_capabilities(mut self, capabilities: Arc<Capabilities>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Start a task sending `message` to `target`, replacing any loaded task.
    pub fn new_task(
        &mut self,
        account: AccountId,
        tokens: u64,
        target: Value,
        message: Symbol,
        arguments: Vec<Value>,
    ) -> Result<&mut Task, ExecutionError> {
        let type_name = target.type_name();
        let compiled = self
            .repository
            .read_type(&type_name)?
            .ok_or(ActivationError::UnknownType(type_name))?;
        let id = TaskId::generate(&account, &message);
        let context = Context::activate(&compiled, target, message, arguments, 0)?;

        debug!(
            task = %id,
            account = %account,
            message = %context.message(),
            tokens,
            "Task created"
        );
        self.fault = None;
        Ok(self.task.insert(Task::new(id, account, tokens, context)))
    }

    /// Thaw a snapshot into the processor, replacing any loaded task.
    pub fn load_task(&mut self, snapshot: TaskSnapshot) -> Result<&mut Task, SnapshotError> {
        let task = Task::thaw(snapshot, self.config.verbosity.validates())?;
        self.fault = None;
        Ok(self.task.insert(task))
    }

    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    pub fn task_mut(&mut self) -> Option<&mut Task> {
        self.task.as_mut()
    }

    /// Unload the task.
    pub fn take_task(&mut self) -> Option<Task> {
        self.fault = None;
        self.task.take()
    }

    /// The current frame of the loaded task.
    pub fn context(&self) -> Option<&Context> {
        self.task.as_ref().and_then(Task::current_context)
    }

    /// The fatal error that halted the loaded task, if any.
    pub fn fault(&self) -> Option<&ExecutionError> {
        self.fault.as_ref()
    }

    /// The instruction the next step will execute.
    pub fn next_instruction(&self) -> Option<Instruction> {
        self.context()
            .and_then(Context::peek)
            .and_then(|word| decode(word).ok())
    }

    /// Execute one instruction. Returns whether the task is still active.
    pub fn step_clock(&mut self) -> Result<bool, ExecutionError> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        let task = self.task.as_mut().ok_or(ExecutionError::NoTask)?;
        if task.state() != TaskState::Active {
            return Ok(false);
        }
        if task.tokens() == 0 {
            task.exhaust();
            return Ok(false);
        }

        let mut machine = Machine {
            task,
            repository: self.repository.as_ref(),
            capabilities: self.capabilities.as_ref(),
            config: &self.config,
        };
        match execute(&mut machine) {
            Ok(()) => {
                machine.task.consume_token();
                Ok(machine.task.state() == TaskState::Active)
            }
            Err(fault) => {
                if self.config.verbosity.logs_failures() {
                    let task = machine.task;
                    error!(
                        task = %task.id(),
                        depth = task.call_depth(),
                        address = task.current_context().map(Context::address),
                        error = %fault,
                        "Task halted"
                    );
                }
                self.fault = Some(fault.clone());
                Err(fault)
            }
        }
    }

    /// Step until the task stops being active.
    pub fn run(&mut self) -> Result<TaskState, ExecutionError> {
        while self.step_clock()? {}
        self.state()
    }

    /// Step at most `limit` instructions.
    pub fn run_for(&mut self, limit: u64) -> Result<TaskState, ExecutionError> {
        for _ in 0..limit {
            if !self.step_clock()? {
                break;
            }
        }
        self.state()
    }

    /// Wake a waiting task if the message it waits for has arrived.
    /// Returns whether the task is active afterwards.
    pub fn resume(&mut self) -> Result<bool, ExecutionError> {
        let task = self.task.as_mut().ok_or(ExecutionError::NoTask)?;
        let Some(WaitReason::Message { bag }) = task.wait_reason().cloned() else {
            return Ok(task.state() == TaskState::Active);
        };
        match self.repository.retrieve_message(&bag)? {
            Some(message) => {
                task.resume(message)?;
                debug!(task = %task.id(), bag = %bag, "Task resumed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn state(&self) -> Result<TaskState, ExecutionError> {
        self.task
            .as_ref()
            .map(Task::state)
            .ok_or(ExecutionError::NoTask)
    }
}

/// Fetch, decode and dispatch one instruction.
fn execute(machine: &mut Machine<'_>) -> Result<(), ExecutionError> {
    let frame = machine.frame_mut()?;
    let address = frame.address();
    if !frame.fetch() {
        return Err(ExecutionError::RanOffBytecode {
            address,
            len: frame.bytecode().len(),
        });
    }
    let word = frame.instruction();
    let instruction = decode(word).map_err(|source| ExecutionError::Malformed {
        address,
        word,
        source,
    })?;

    if machine.config.verbosity.traces() {
        trace!(
            task = %machine.task.id(),
            depth = machine.task.call_depth(),
            address,
            instruction = %instruction,
            components = machine.task.components().len(),
            "Executing instruction"
        );
    }

    let handler = handler_for(instruction.opcode())
        .ok_or(ExecutionError::MissingHandler(instruction.opcode().keyword()))?;
    match handler(&instruction, machine) {
        Ok(()) => Ok(()),
        Err(Interrupt::Raise(exception)) => {
            if machine.config.verbosity.traces() {
                trace!(
                    task = %machine.task.id(),
                    address,
                    exception = %exception,
                    "Exception raised"
                );
            }
            machine.raise(exception)
        }
        Err(Interrupt::Fault(error)) => Err(error),
    }
}
