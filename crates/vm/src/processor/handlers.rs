//! Opcode handlers.
//!
//! Each handler executes one instruction family against a [`Machine`], the
//! borrowed view of the running task and its collaborators. A handler ends
//! by advancing the current frame, jumping, pushing or popping a frame, or
//! changing the task's state. Expected failures are returned as
//! [`Interrupt::Raise`] and unwound by the processor; only bytecode
//! corruption and adapter failures are [`Interrupt::Fault`].

use tessera_foundation::{BagId, ExceptionKind, Name, Value};
use tessera_intrinsics::{Capabilities, IntrinsicError};

use crate::config::VmConfig;
use crate::context::Context;
use crate::error::{ActivationError, ExecutionError};
use crate::instruction::{Condition, Instruction, PullTarget, PushSource, Storage};
use crate::repository::{Repository, RepositoryError};
use crate::task::{Task, WaitReason};

/// Functional interface for an opcode handler.
pub type Handler = fn(&Instruction, &mut Machine<'_>) -> Result<(), Interrupt>;

/// How a handler leaves the normal instruction flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// Raise a value through the task's handler stacks.
    Raise(Value),
    /// Halt the task; never visible to the task itself.
    Fault(ExecutionError),
}

impl From<ExecutionError> for Interrupt {
    fn from(error: ExecutionError) -> Self {
        Interrupt::Fault(error)
    }
}

impl From<RepositoryError> for Interrupt {
    fn from(error: RepositoryError) -> Self {
        Interrupt::Fault(ExecutionError::Repository(error))
    }
}

fn raise(kind: ExceptionKind, text: impl Into<String>) -> Interrupt {
    Interrupt::Raise(Value::exception(kind, text))
}

fn mismatch(instruction: &Instruction) -> Interrupt {
    Interrupt::Fault(ExecutionError::MissingHandler(instruction.opcode().keyword()))
}

/// The task being stepped and everything a handler may touch.
pub struct Machine<'a> {
    pub task: &'a mut Task,
    pub repository: &'a dyn Repository,
    pub capabilities: &'a Capabilities,
    pub config: &'a VmConfig,
}

impl Machine<'_> {
    pub fn frame(&self) -> Result<&Context, ExecutionError> {
        self.task
            .current_context()
            .ok_or(ExecutionError::EmptyCallStack)
    }

    pub fn frame_mut(&mut self) -> Result<&mut Context, ExecutionError> {
        self.task
            .current_context_mut()
            .ok_or(ExecutionError::EmptyCallStack)
    }

    pub fn advance(&mut self) -> Result<(), ExecutionError> {
        self.frame_mut()?.advance();
        Ok(())
    }

    /// Check an address named by the instruction at the current address.
    fn check_address(&self, target: u16) -> Result<(), ExecutionError> {
        let frame = self.frame()?;
        let len = frame.bytecode().len();
        if self.config.verbosity.validates() && (target == 0 || target as usize > len) {
            return Err(ExecutionError::InvalidAddress {
                address: frame.address(),
                target: target as usize,
                len,
            });
        }
        Ok(())
    }

    pub fn jump_to(&mut self, target: u16) -> Result<(), ExecutionError> {
        self.check_address(target)?;
        self.frame_mut()?.jump_to(target as usize);
        Ok(())
    }

    /// Pop a component owned by the current frame.
    pub fn pop(&mut self) -> Result<Value, ExecutionError> {
        let frame = self.frame()?;
        let (base, address) = (frame.component_base(), frame.address());
        if self.task.components().len() <= base {
            return Err(ExecutionError::ComponentUnderflow { address });
        }
        self.task
            .pop_component()
            .ok_or(ExecutionError::ComponentUnderflow { address })
    }

    pub fn push(&mut self, value: Value) -> Result<(), Interrupt> {
        if self.task.components().len() >= self.config.max_components {
            return Err(raise(
                ExceptionKind::StackOverflow,
                format!(
                    "component stack is limited to {} values",
                    self.config.max_components
                ),
            ));
        }
        self.task.push_component(value);
        Ok(())
    }

    /// The name held in a variable of the current frame.
    fn name_in(&self, variable: u16) -> Result<Name, Interrupt> {
        match self.frame()?.variable(variable as usize)? {
            Value::Name(name) => Ok(name.clone()),
            other => Err(raise(
                ExceptionKind::InvalidArgument,
                format!("variable {} holds {}, not a name", variable, other),
            )),
        }
    }

    /// Unwind to the innermost handler.
    ///
    /// The current frame's handlers are tried first; a frame without one is
    /// popped along with its components and the search repeats in its
    /// caller. With no handler anywhere the task is abandoned.
    pub fn raise(&mut self, exception: Value) -> Result<(), ExecutionError> {
        loop {
            let frame = match self.task.current_context_mut() {
                Some(frame) => frame,
                None => return self.task.abandon(exception),
            };
            let base = frame.component_base();
            if frame.has_handlers() {
                frame.jump_to_handler()?;
                self.task.truncate_components(base);
                self.task.push_component(exception);
                return Ok(());
            }
            self.task.pop_context();
            self.task.truncate_components(base);
        }
    }
}

fn missing(kind: &str, name: &Name) -> Interrupt {
    raise(
        ExceptionKind::MissingDocument,
        format!("no {} named {}", kind, name),
    )
}

/// `SKIP INSTRUCTION` and `JUMP TO`.
pub fn handle_jump(instruction: &Instruction, m: &mut Machine<'_>) -> Result<(), Interrupt> {
    let (address, condition) = match *instruction {
        Instruction::Skip => return Ok(m.advance()?),
        Instruction::Jump { address, condition } => (address, condition),
        _ => return Err(mismatch(instruction)),
    };
    let taken = match condition {
        Condition::Always => true,
        Condition::OnNone => m.pop()?.is_none(),
        Condition::OnTrue | Condition::OnFalse => {
            let value = m.pop()?;
            let flag = value.as_bool().ok_or_else(|| {
                raise(
                    ExceptionKind::InvalidArgument,
                    format!("jump condition {} is not a boolean", value),
                )
            })?;
            flag == (condition == Condition::OnTrue)
        }
    };
    if taken {
        m.jump_to(address)?;
    } else {
        m.advance()?;
    }
    Ok(())
}

pub fn handle_push(instruction: &Instruction, m: &mut Machine<'_>) -> Result<(), Interrupt> {
    let Instruction::Push { source, operand } = *instruction else {
        return Err(mismatch(instruction));
    };
    let index = operand as usize;
    match source {
        PushSource::Handler => {
            m.check_address(operand)?;
            m.frame_mut()?.push_handler(operand);
        }
        PushSource::Literal => {
            let value = m.frame()?.literal(index)?.clone();
            m.push(value)?;
        }
        PushSource::Constant => {
            let value = m.frame()?.constant(index)?.clone();
            m.push(value)?;
        }
        PushSource::Argument => {
            let value = m.frame()?.argument(index)?.clone();
            m.push(value)?;
        }
    }
    m.advance()?;
    Ok(())
}

pub fn handle_pull(instruction: &Instruction, m: &mut Machine<'_>) -> Result<(), Interrupt> {
    let Instruction::Pull(target) = *instruction else {
        return Err(mismatch(instruction));
    };
    match target {
        PullTarget::Handler => {
            m.frame_mut()?.pop_handler()?;
            m.advance()?;
        }
        PullTarget::Component => {
            m.pop()?;
            m.advance()?;
        }
        PullTarget::Result => {
            let result = m.pop()?;
            let frame = m
                .task
                .pop_context()
                .ok_or(ExecutionError::EmptyCallStack)?;
            m.task.truncate_components(frame.component_base());
            match m.task.current_context_mut() {
                Some(caller) => {
                    caller.advance();
                    m.task.push_component(result);
                }
                None => m.task.complete(result)?,
            }
        }
        PullTarget::Exception => {
            let exception = m.pop()?;
            return Err(Interrupt::Raise(exception));
        }
    }
    Ok(())
}

pub fn handle_load(instruction: &Instruction, m: &mut Machine<'_>) -> Result<(), Interrupt> {
    let Instruction::Load { storage, variable } = *instruction else {
        return Err(mismatch(instruction));
    };
    let value = match storage {
        Storage::Variable => m.frame()?.variable(variable as usize)?.clone(),
        Storage::Message => {
            let bag = BagId::new(m.name_in(variable)?);
            match m.repository.retrieve_message(&bag)? {
                Some(message) => message,
                None => {
                    // Stays on this instruction; resuming delivers the message.
                    m.task.wait(WaitReason::Message { bag })?;
                    return Ok(());
                }
            }
        }
        Storage::Draft => {
            let name = m.name_in(variable)?;
            m.repository
                .read_draft(&name)?
                .ok_or_else(|| missing("draft", &name))?
        }
        Storage::Document => {
            let name = m.name_in(variable)?;
            m.repository
                .read_document(&name)?
                .ok_or_else(|| missing("document", &name))?
        }
    };
    m.push(value)?;
    m.advance()?;
    Ok(())
}

pub fn handle_save(instruction: &Instruction, m: &mut Machine<'_>) -> Result<(), Interrupt> {
    let Instruction::Save { storage, variable } = *instruction else {
        return Err(mismatch(instruction));
    };
    match storage {
        Storage::Variable => {
            let value = m.pop()?;
            m.frame_mut()?.set_variable(variable as usize, value)?;
        }
        Storage::Message => {
            let bag = BagId::new(m.name_in(variable)?);
            let message = m.pop()?;
            m.repository.post_message(&bag, message)?;
        }
        Storage::Draft => {
            let name = m.name_in(variable)?;
            let draft = m.pop()?;
            m.repository.write_draft(&name, draft)?;
        }
        Storage::Document => {
            let name = m.name_in(variable)?;
            let document = m.pop()?;
            m.repository.write_document(&name, document)?;
        }
    }
    m.advance()?;
    Ok(())
}

pub fn handle_drop(instruction: &Instruction, m: &mut Machine<'_>) -> Result<(), Interrupt> {
    let Instruction::Drop { storage, variable } = *instruction else {
        return Err(mismatch(instruction));
    };
    match storage {
        Storage::Variable => m.frame_mut()?.drop_variable(variable as usize)?,
        Storage::Message => {
            return Err(raise(
                ExceptionKind::InvalidArgument,
                "messages are only removed by LOAD MESSAGE",
            ))
        }
        Storage::Draft => {
            let name = m.name_in(variable)?;
            if !m.repository.delete_draft(&name)? {
                return Err(missing("draft", &name));
            }
        }
        Storage::Document => {
            let name = m.name_in(variable)?;
            if !m.repository.delete_document(&name)? {
                return Err(missing("document", &name));
            }
        }
    }
    m.advance()?;
    Ok(())
}

/// `CALL $intrinsic WITH n ARGUMENTS`: pops `n` operands, receiver first.
pub fn handle_call(instruction: &Instruction, m: &mut Machine<'_>) -> Result<(), Interrupt> {
    let Instruction::Call {
        intrinsic,
        arguments,
    } = *instruction
    else {
        return Err(mismatch(instruction));
    };
    let mut operands = Vec::with_capacity(arguments as usize);
    for _ in 0..arguments {
        operands.push(m.pop()?);
    }
    operands.reverse();

    let result = m
        .capabilities
        .invoke(intrinsic, &operands)
        .map_err(|error| match error {
            IntrinsicError::UnknownIndex(_) | IntrinsicError::Unknown { .. } => {
                raise(ExceptionKind::UnknownCapability, error.to_string())
            }
            IntrinsicError::InvalidArgument { .. } => {
                raise(ExceptionKind::InvalidArgument, error.to_string())
            }
        })?;
    m.push(result)?;
    m.advance()?;
    Ok(())
}

/// `SEND $message TO ...`: activates the message on the target in a new
/// frame. The caller stays on the `SEND` until the callee returns.
pub fn handle_send(instruction: &Instruction, m: &mut Machine<'_>) -> Result<(), Interrupt> {
    let Instruction::Send { message, target } = *instruction else {
        return Err(mismatch(instruction));
    };
    let message = m.frame()?.message_at(message as usize)?.clone();

    let arguments = if target.with_arguments() {
        match m.pop()? {
            Value::List(arguments) => arguments,
            other => {
                return Err(raise(
                    ExceptionKind::InvalidArgument,
                    format!("arguments to {} must be a list, got {}", message, other),
                ))
            }
        }
    } else {
        Vec::new()
    };

    let receiver = m.pop()?;
    let receiver = if target.is_document() {
        let name = match receiver {
            Value::Name(name) => name,
            other => {
                return Err(raise(
                    ExceptionKind::InvalidArgument,
                    format!("document target {} is not a name", other),
                ))
            }
        };
        m.repository
            .read_document(&name)?
            .ok_or_else(|| missing("document", &name))?
    } else {
        receiver
    };

    let unresolved =
        |error: ActivationError| raise(ExceptionKind::UnresolvedTarget, error.to_string());
    let type_name = receiver.type_name();
    let compiled = m
        .repository
        .read_type(&type_name)?
        .ok_or_else(|| unresolved(ActivationError::UnknownType(type_name)))?;

    if m.task.call_depth() >= m.config.max_contexts {
        return Err(raise(
            ExceptionKind::StackOverflow,
            format!("call stack is limited to {} frames", m.config.max_contexts),
        ));
    }
    let base = m.task.components().len();
    let context =
        Context::activate(&compiled, receiver, message, arguments, base).map_err(unresolved)?;
    m.task.push_context(context);
    Ok(())
}
