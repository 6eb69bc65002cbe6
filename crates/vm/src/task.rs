//! Tasks: one unit of execution on behalf of an account.
//!
//! A task owns a call stack of [`Context`]s and a single component stack
//! shared by all of them. Every frame records the component depth at which it
//! was entered, so a frame can only pop what it pushed.
//!
//! Lifecycle:
//!
//! ```text
//!            ┌──────── wait ────────┐
//!            ▼                      │
//!        Waiting ──── resume ───→ Active ──→ Completed
//!            │                      │
//!            └──────→ Abandoned ←───┘
//! ```
//!
//! `Completed` and `Abandoned` are terminal: the call and component stacks
//! are empty and exactly one of result or exception is set.

use serde::{Deserialize, Serialize};
use tessera_foundation::{AccountId, BagId, ExceptionKind, TaskId, Value};

use crate::context::Context;
use crate::error::ExecutionError;
use crate::snapshot::{SnapshotError, TaskSnapshot, SNAPSHOT_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Active,
    Waiting,
    Completed,
    Abandoned,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Abandoned)
    }

    fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Active, Waiting)
                | (Active, Completed)
                | (Active, Abandoned)
                | (Waiting, Active)
                | (Waiting, Abandoned)
        )
    }
}

/// Why a waiting task is parked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaitReason {
    /// A `LOAD MESSAGE` found the bag empty.
    Message { bag: BagId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    id: TaskId,
    account: AccountId,
    tokens: u64,
    budget: u64,
    contexts: Vec<Context>,
    components: Vec<Value>,
    state: TaskState,
    wait: Option<WaitReason>,
    reply_to: Option<BagId>,
    result: Option<Value>,
    exception: Option<Value>,
}

impl Task {
    /// A new active task running `context` with a budget of `tokens`.
    pub fn new(id: TaskId, account: AccountId, tokens: u64, context: Context) -> Self {
        Self {
            id,
            account,
            tokens,
            budget: tokens,
            contexts: vec![context],
            components: Vec::new(),
            state: TaskState::Active,
            wait: None,
            reply_to: None,
            result: None,
            exception: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn wait_reason(&self) -> Option<&WaitReason> {
        self.wait.as_ref()
    }

    /// Bag that receives the result or exception once the task terminates.
    pub fn reply_to(&self) -> Option<&BagId> {
        self.reply_to.as_ref()
    }

    pub fn set_reply_to(&mut self, bag: Option<BagId>) {
        self.reply_to = bag;
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn exception(&self) -> Option<&Value> {
        self.exception.as_ref()
    }

    /// The result of a completed task or the exception of an abandoned one.
    pub fn outcome(&self) -> Option<&Value> {
        self.result.as_ref().or(self.exception.as_ref())
    }

    // === Metering ===

    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn tokens_used(&self) -> u64 {
        self.budget - self.tokens
    }

    /// Charge one token for the step just executed. Spending the last one
    /// abandons the task with `$resourceExhausted`, overriding whatever that
    /// step did, including a completion.
    pub fn consume_token(&mut self) {
        self.tokens = self.tokens.saturating_sub(1);
        if self.tokens == 0 && self.state != TaskState::Abandoned {
            self.finish(TaskState::Abandoned, self.exhaustion());
        }
    }

    /// Abandon a live task for running out of tokens.
    pub fn exhaust(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.finish(TaskState::Abandoned, self.exhaustion());
    }

    fn exhaustion(&self) -> Value {
        Value::exception(
            ExceptionKind::ResourceExhausted,
            format!("task {} used all {} tokens", self.id, self.budget),
        )
    }

    // === Call stack ===

    pub fn push_context(&mut self, context: Context) {
        self.contexts.push(context);
    }

    pub fn pop_context(&mut self) -> Option<Context> {
        self.contexts.pop()
    }

    pub fn current_context(&self) -> Option<&Context> {
        self.contexts.last()
    }

    pub fn current_context_mut(&mut self) -> Option<&mut Context> {
        self.contexts.last_mut()
    }

    pub fn has_contexts(&self) -> bool {
        !self.contexts.is_empty()
    }

    /// Number of frames on the call stack.
    pub fn call_depth(&self) -> usize {
        self.contexts.len()
    }

    pub fn contexts(&self) -> &[Context] {
        &self.contexts
    }

    // === Component stack ===

    pub fn has_components(&self) -> bool {
        !self.components.is_empty()
    }

    pub fn push_component(&mut self, value: Value) {
        self.components.push(value);
    }

    pub fn pop_component(&mut self) -> Option<Value> {
        self.components.pop()
    }

    pub fn truncate_components(&mut self, depth: usize) {
        self.components.truncate(depth);
    }

    pub fn components(&self) -> &[Value] {
        &self.components
    }

    // === Lifecycle ===

    pub fn transition_to(&mut self, next: TaskState) -> Result<(), ExecutionError> {
        if !self.state.can_transition_to(next) {
            return Err(ExecutionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn complete(&mut self, result: Value) -> Result<(), ExecutionError> {
        self.transition_to(TaskState::Completed)?;
        self.finish(TaskState::Completed, result);
        Ok(())
    }

    pub fn abandon(&mut self, exception: Value) -> Result<(), ExecutionError> {
        self.transition_to(TaskState::Abandoned)?;
        self.finish(TaskState::Abandoned, exception);
        Ok(())
    }

    // Unchecked; exhaustion may end any state but abandoned.
    fn finish(&mut self, state: TaskState, payload: Value) {
        self.state = state;
        self.contexts.clear();
        self.components.clear();
        self.wait = None;
        match state {
            TaskState::Completed => self.result = Some(payload),
            _ => {
                self.result = None;
                self.exception = Some(payload);
            }
        }
    }

    /// Park the task until `reason` is satisfied. The current frame stays on
    /// the instruction that blocked.
    pub fn wait(&mut self, reason: WaitReason) -> Result<(), ExecutionError> {
        self.transition_to(TaskState::Waiting)?;
        self.wait = Some(reason);
        Ok(())
    }

    /// Deliver the value a waiting task was blocked on and step past the
    /// blocking instruction.
    pub fn resume(&mut self, reply: Value) -> Result<(), ExecutionError> {
        self.transition_to(TaskState::Active)?;
        self.wait = None;
        self.components.push(reply);
        self.contexts
            .last_mut()
            .ok_or(ExecutionError::EmptyCallStack)?
            .advance();
        Ok(())
    }

    // === Persistence ===

    pub fn freeze(&self) -> TaskSnapshot {
        TaskSnapshot {
            version: SNAPSHOT_VERSION,
            id: self.id,
            account: self.account.clone(),
            tokens: self.tokens,
            budget: self.budget,
            state: self.state,
            wait: self.wait.clone(),
            reply_to: self.reply_to.clone(),
            components: self.components.clone(),
            contexts: self.contexts.iter().map(Context::freeze).collect(),
            result: self.result.clone(),
            exception: self.exception.clone(),
        }
    }

    /// Rebuild a task. Snapshots that break the lifecycle invariants are
    /// rejected; `validate` additionally checks every frame's bytecode.
    pub fn thaw(snapshot: TaskSnapshot, validate: bool) -> Result<Self, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        if snapshot.tokens > snapshot.budget {
            return Err(SnapshotError::Corrupt(format!(
                "{} tokens left of a {} token budget",
                snapshot.tokens, snapshot.budget
            )));
        }
        let consistent = match snapshot.state {
            TaskState::Active => {
                !snapshot.contexts.is_empty() && snapshot.wait.is_none() && snapshot.outcome_is_empty()
            }
            TaskState::Waiting => {
                !snapshot.contexts.is_empty() && snapshot.wait.is_some() && snapshot.outcome_is_empty()
            }
            TaskState::Completed => {
                snapshot.is_unwound() && snapshot.result.is_some() && snapshot.exception.is_none()
            }
            TaskState::Abandoned => {
                snapshot.is_unwound() && snapshot.result.is_none() && snapshot.exception.is_some()
            }
        };
        if !consistent {
            return Err(SnapshotError::Corrupt(format!(
                "stacks and outcome do not match state {:?}",
                snapshot.state
            )));
        }

        let mut base = 0;
        for frame in &snapshot.contexts {
            let frame_base = frame.component_base as usize;
            if frame_base < base || frame_base > snapshot.components.len() {
                return Err(SnapshotError::Corrupt(format!(
                    "component base {} out of order",
                    frame_base
                )));
            }
            base = frame_base;
        }

        let contexts = snapshot
            .contexts
            .into_iter()
            .map(|frame| Context::thaw(frame, validate))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: snapshot.id,
            account: snapshot.account,
            tokens: snapshot.tokens,
            budget: snapshot.budget,
            contexts,
            components: snapshot.components,
            state: snapshot.state,
            wait: snapshot.wait,
            reply_to: snapshot.reply_to,
            result: snapshot.result,
            exception: snapshot.exception,
        })
    }
}

impl TaskSnapshot {
    fn outcome_is_empty(&self) -> bool {
        self.result.is_none() && self.exception.is_none()
    }

    fn is_unwound(&self) -> bool {
        self.contexts.is_empty() && self.components.is_empty() && self.wait.is_none()
    }
}

#[cfg(test)]
mod tests;
