//! Integration test harness for Tessera.
//!
//! This crate provides utilities for end-to-end testing of the full task
//! pipeline: Assemble → Register type → Start task → Step → Verify.
//!
//! The fixture is a single compiled type, `/acme/types/Test`, whose
//! `$test1` method exercises handlers, capability calls and nested sends.
//! Every route first sends `$test3`, which raises its argument; the
//! handler in `$test1` then picks the route by matching the exception:
//!
//! - `"good"` completes with the result of `$test2` sent to the instance
//!   document
//! - `"bad"` sends `$test2` to the target, then completes with the result
//!   of `$test4` sent to the instance document
//! - anything else (including no argument) matches neither literal and is
//!   raised again with no handler left

use std::sync::Arc;

use tessera_foundation::{AccountId, Name, Symbol, TaskId, Value};
use tessera_vm::{
    CompiledType, Context, MemoryRepository, Processor, Repository, Task, TaskState, TypeBuilder,
    Verbosity, VmConfig,
};
use tracing_subscriber::{fmt, EnvFilter};

pub const TEST_TYPE: &str = "/acme/types/Test";
pub const TEST_DOCUMENT: &str = "/acme/documents/test";
pub const TEST_ACCOUNT: &str = "/acme/accounts/tester";

const TEST1: &str = "
    PUSH HANDLER Handler
    PUSH ARGUMENT $target
    CALL $list
    PUSH ARGUMENT $argument
    CALL $addItem WITH 2 ARGUMENTS
    SEND $test3 TO COMPONENT WITH ARGUMENTS
    PULL HANDLER
    PULL RESULT
Handler:
    SAVE VARIABLE $exception
    LOAD VARIABLE $exception
    PUSH LITERAL `\"good\"`
    CALL $doesMatch WITH 2 ARGUMENTS
    JUMP TO Bad ON FALSE
    PUSH CONSTANT $document
    SEND $test2 TO DOCUMENT
    SAVE VARIABLE $result
    LOAD VARIABLE $result
    PULL RESULT
Bad:
    LOAD VARIABLE $exception
    PUSH LITERAL `\"bad\"`
    CALL $doesMatch WITH 2 ARGUMENTS
    JUMP TO Failed ON FALSE
    PUSH ARGUMENT $target
    SEND $test2 TO COMPONENT
    SAVE VARIABLE $result
    JUMP TO Succeeded
Failed:
    LOAD VARIABLE $exception
    PULL EXCEPTION
Succeeded:
    SKIP INSTRUCTION
    PUSH CONSTANT $document
    CALL $list
    PUSH ARGUMENT $argument
    CALL $addItem WITH 2 ARGUMENTS
    SEND $test4 TO DOCUMENT WITH ARGUMENTS
    SAVE VARIABLE $result
    LOAD VARIABLE $result
    PULL RESULT
";

const TEST2: &str = "
    CALL $catalog
    PUSH LITERAL `$items`
    CALL $list
    PUSH LITERAL `\"alpha\"`
    CALL $addItem WITH 2 ARGUMENTS
    CALL $setValue WITH 3 ARGUMENTS
    PULL RESULT
";

const TEST3: &str = "
    PUSH ARGUMENT $text
    PULL EXCEPTION
";

const TEST4: &str = "
    PUSH ARGUMENT $value
    PULL RESULT
";

/// Initialize logging for a test run. Safe to call more than once.
///
/// Use `RUST_LOG` to override the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,tessera_vm=debug"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// The compiled fixture type.
///
/// # Panics
///
/// Panics if a fixture method fails to assemble.
pub fn test_type() -> CompiledType {
    TypeBuilder::new(TEST_TYPE)
        .constant("$document", Value::Name(Name::from(TEST_DOCUMENT)))
        .method("$test1", &["$argument"], TEST1)
        .and_then(|b| b.method("$test2", &[], TEST2))
        .and_then(|b| b.method("$test3", &["$text"], TEST3))
        .and_then(|b| b.method("$test4", &["$value"], TEST4))
        .expect("fixture methods assemble")
        .build()
}

/// An instance of the fixture type.
pub fn test_instance() -> Value {
    Value::catalog([("$type", Value::Name(Name::from(TEST_TYPE)))])
}

/// A repository holding the fixture type and the instance document.
pub fn test_repository() -> Arc<MemoryRepository> {
    let repository = Arc::new(MemoryRepository::new());
    repository
        .add_type(test_type())
        .expect("register fixture type");
    repository
        .write_document(&Name::from(TEST_DOCUMENT), test_instance())
        .expect("write fixture document");
    repository
}

/// Test harness driving one processor over the fixture repository.
pub struct TestHarness {
    repository: Arc<MemoryRepository>,
    processor: Processor,
}

impl TestHarness {
    /// A harness with input validation enabled.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default().with_verbosity(Verbosity::VALIDATE))
    }

    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn with_config(config: VmConfig) -> Self {
        let repository = test_repository();
        let processor = Processor::new(config, repository.clone()).expect("valid config");
        Self {
            repository,
            processor,
        }
    }

    pub fn repository(&self) -> &Arc<MemoryRepository> {
        &self.repository
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut Processor {
        &mut self.processor
    }

    /// Start a task sending `message` to the fixture instance.
    ///
    /// # Panics
    ///
    /// Panics if the message cannot be activated.
    pub fn start(&mut self, message: &str, arguments: Vec<Value>, tokens: u64) -> TaskId {
        self.processor
            .new_task(
                AccountId::new(TEST_ACCOUNT),
                tokens,
                test_instance(),
                Symbol::new(message),
                arguments,
            )
            .expect("task starts")
            .id()
    }

    /// Mnemonic of the instruction the next step will execute.
    pub fn next_mnemonic(&self) -> Option<String> {
        self.processor.next_instruction().map(|i| i.mnemonic())
    }

    /// Execute one instruction.
    ///
    /// # Panics
    ///
    /// Panics on a fatal execution error.
    pub fn step(&mut self) -> bool {
        self.processor.step_clock().expect("step succeeds")
    }

    /// Step until the task stops being active, collecting the mnemonic of
    /// every executed instruction.
    pub fn trace(&mut self) -> Vec<String> {
        let mut trace = Vec::new();
        while self.state() == TaskState::Active {
            if let Some(mnemonic) = self.next_mnemonic() {
                trace.push(mnemonic);
            }
            if !self.step() {
                break;
            }
        }
        trace
    }

    /// Run to a non-active state.
    ///
    /// # Panics
    ///
    /// Panics on a fatal execution error.
    pub fn run(&mut self) -> TaskState {
        self.processor.run().expect("run succeeds")
    }

    /// # Panics
    ///
    /// Panics if no task is loaded.
    pub fn task(&self) -> &Task {
        self.processor.task().expect("task loaded")
    }

    pub fn context(&self) -> Option<&Context> {
        self.processor.context()
    }

    pub fn state(&self) -> TaskState {
        self.task().state()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
