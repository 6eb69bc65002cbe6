//! Task lifecycle across the processor boundary: terminal idempotence,
//! metering, snapshot continuity and fatal faults.

use tessera_foundation::{AccountId, ExceptionKind, Name, Symbol, Value};
use tessera_tests::{test_instance, TestHarness, TEST_ACCOUNT};
use tessera_vm::snapshot::{decode_task, encode_task};
use tessera_vm::{ExecutionError, TaskState, TypeBuilder};

/// Instructions executed by the good route.
const GOOD_ROUTE_STEPS: u64 = 25;

#[test]
fn test_step_clock_is_idempotent_once_terminal() {
    let mut harness = TestHarness::new();
    harness.start("$test1", vec![Value::from("good")], 1000);

    let mut steps = 1;
    while harness.step() {
        steps += 1;
    }
    assert_eq!(steps, GOOD_ROUTE_STEPS);
    for _ in 0..3 {
        assert!(!harness.step());
    }
    assert_eq!(harness.state(), TaskState::Completed);
    assert_eq!(harness.task().tokens_used(), GOOD_ROUTE_STEPS);
}

/// The last token overrides whatever the step that spent it did.
#[test]
fn test_last_token_overrides_completion() {
    let mut harness = TestHarness::new();
    harness.start("$test1", vec![Value::from("good")], GOOD_ROUTE_STEPS);
    assert_eq!(harness.run(), TaskState::Abandoned);
    assert_eq!(harness.task().result(), None);
    assert_eq!(
        harness.task().exception().and_then(Value::exception_kind),
        Some(&ExceptionKind::ResourceExhausted.symbol())
    );

    harness.start("$test1", vec![Value::from("good")], GOOD_ROUTE_STEPS + 1);
    assert_eq!(harness.run(), TaskState::Completed);
    assert_eq!(harness.task().tokens(), 1);
}

#[test]
fn test_running_dry_abandons_at_the_step_boundary() {
    let mut harness = TestHarness::new();
    harness.start("$test1", vec![Value::from("good")], 10);

    for _ in 0..9 {
        assert!(harness.step());
    }
    // The tenth instruction spends the last token.
    assert!(!harness.step());

    let task = harness.task();
    assert_eq!(task.state(), TaskState::Abandoned);
    assert_eq!(task.tokens_used(), 10);
    assert_eq!(
        task.exception().and_then(Value::exception_kind),
        Some(&ExceptionKind::ResourceExhausted.symbol())
    );
    assert!(!task.has_contexts());
}

#[test]
fn test_external_abandon_stops_the_task() {
    let mut harness = TestHarness::new();
    harness.start("$test1", vec![Value::from("good")], 1000);
    assert!(harness.step());

    let cancelled = Value::exception(ExceptionKind::InvalidArgument, "cancelled");
    let task = harness.processor_mut().task_mut().unwrap();
    task.abandon(cancelled.clone()).unwrap();
    assert!(matches!(
        task.complete(Value::None),
        Err(ExecutionError::InvalidTransition { .. })
    ));

    assert!(!harness.step());
    assert_eq!(harness.task().exception(), Some(&cancelled));
}

/// Freeze mid-route, push the snapshot through the wire codec and continue
/// on a fresh processor: the remaining trace matches an uninterrupted run.
#[test]
fn test_snapshot_continues_the_same_trace() {
    // Pauses land in $test1, inside $test3, inside $test2 and inside $test4.
    for (argument, pause) in [("good", 3), ("good", 7), ("good", 17), ("bad", 11), ("bad", 35)] {
        let mut live = TestHarness::new();
        live.start("$test1", vec![Value::from(argument)], 1000);
        for _ in 0..pause {
            assert!(live.step());
        }

        let bytes = encode_task(&live.task().freeze()).unwrap();
        let mut resumed = TestHarness::new();
        resumed
            .processor_mut()
            .load_task(decode_task(&bytes).unwrap())
            .unwrap();
        assert_eq!(resumed.task().id(), live.task().id());
        assert_eq!(resumed.task().call_depth(), live.task().call_depth());

        let expected = live.trace();
        assert_eq!(resumed.trace(), expected, "{} paused after {}", argument, pause);
        assert_eq!(resumed.state(), live.state());
        assert_eq!(resumed.task().result(), live.task().result());
    }
}

#[test]
fn test_fatal_fault_halts_the_task() {
    let mut harness = TestHarness::new();
    harness
        .repository()
        .add_type(
            TypeBuilder::new("/acme/types/Broken")
                .method("$run", &[], "SKIP INSTRUCTION")
                .unwrap()
                .build(),
        )
        .unwrap();
    harness
        .processor_mut()
        .new_task(
            AccountId::new(TEST_ACCOUNT),
            100,
            Value::catalog([("$type", Value::Name(Name::from("/acme/types/Broken")))]),
            Symbol::new("$run"),
            vec![],
        )
        .unwrap();

    let processor = harness.processor_mut();
    assert!(processor.step_clock().unwrap());
    let fault = processor.step_clock().unwrap_err();
    assert!(matches!(fault, ExecutionError::RanOffBytecode { address: 2, len: 1 }));
    assert_eq!(processor.step_clock().unwrap_err(), fault);
    assert_eq!(processor.fault(), Some(&fault));
    // The task is left where it stopped, never abandoned by a fault.
    assert_eq!(processor.task().unwrap().state(), TaskState::Active);
}

#[test]
fn test_unknown_message_is_rejected_at_start() {
    let mut harness = TestHarness::new();
    let error = harness
        .processor_mut()
        .new_task(
            AccountId::new(TEST_ACCOUNT),
            100,
            test_instance(),
            Symbol::new("$test9"),
            vec![],
        )
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(error, ExecutionError::Activation(_)));
}
