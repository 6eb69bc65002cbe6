//! End-to-end routes through the fixture type's `$test1` method.
//!
//! Each route is walked one instruction at a time: the mnemonic about to
//! execute, then whether the component stack is occupied and how deep the
//! call stack is once it has executed.

use tessera_foundation::{Symbol, Value};
use tessera_tests::TestHarness;
use tessera_vm::TaskState;

/// Mnemonic, components left, call depth after the step.
type Step = (&'static str, bool, usize);

/// Every route: send `$test3`, which raises, and test the exception
/// against `"good"`.
const CAUGHT: &[Step] = &[
    ("PUSH HANDLER", false, 1),
    ("PUSH ARGUMENT", true, 1),
    ("CALL $list", true, 1),
    ("PUSH ARGUMENT", true, 1),
    ("CALL $addItem", true, 1),
    ("SEND 1", false, 2),
    // $test3
    ("PUSH ARGUMENT", true, 2),
    ("PULL EXCEPTION", true, 1),
    // handler
    ("SAVE VARIABLE", false, 1),
    ("LOAD VARIABLE", true, 1),
    ("PUSH LITERAL", true, 1),
    ("CALL $doesMatch", true, 1),
    ("JUMP TO", false, 1),
];

/// Routes that are not good: test the exception against `"bad"`.
const SECOND_CHECK: &[Step] = &[
    ("LOAD VARIABLE", true, 1),
    ("PUSH LITERAL", true, 1),
    ("CALL $doesMatch", true, 1),
    ("JUMP TO", false, 1),
];

/// `$test2` building `{$items: ["alpha"]}` one frame down.
const TEST2_BODY: &[Step] = &[
    ("CALL $catalog", true, 2),
    ("PUSH LITERAL", true, 2),
    ("CALL $list", true, 2),
    ("PUSH LITERAL", true, 2),
    ("CALL $addItem", true, 2),
    ("CALL $setValue", true, 2),
    ("PULL RESULT", true, 1),
];

/// Step through `steps`, checking the task after each one. Only the last
/// step may leave the task inactive.
fn walk(harness: &mut TestHarness, steps: &[Step]) {
    for (index, &(mnemonic, components, depth)) in steps.iter().enumerate() {
        let at = index + 1;
        assert_eq!(
            harness.next_mnemonic().as_deref(),
            Some(mnemonic),
            "mnemonic at step {}",
            at
        );
        assert_eq!(harness.step(), at < steps.len(), "activity after step {}", at);
        let task = harness.task();
        assert_eq!(task.has_components(), components, "components after step {}", at);
        assert_eq!(task.call_depth(), depth, "call depth after step {}", at);
    }
    assert!(!harness.step());
}

#[test]
fn test_good_route_completes() {
    let mut harness = TestHarness::new();
    harness.start("$test1", vec![Value::from("good")], 1000);

    assert_eq!(harness.next_mnemonic().as_deref(), Some("PUSH HANDLER"));
    assert!(harness.step());
    assert!(harness.context().unwrap().has_handlers());

    let send: &[Step] = &[("PUSH CONSTANT", true, 1), ("SEND 2", false, 2)];
    let finish: &[Step] = &[
        ("SAVE VARIABLE", false, 1),
        ("LOAD VARIABLE", true, 1),
        ("PULL RESULT", false, 0),
    ];
    walk(&mut harness, &[&CAUGHT[1..], send, TEST2_BODY, finish].concat());

    let task = harness.task();
    assert_eq!(task.state(), TaskState::Completed);
    assert!(!task.has_contexts());
    let items = task.result().and_then(|r| r.get(&Symbol::new("$items")));
    assert_eq!(items, Some(&Value::List(vec![Value::from("alpha")])));
}

/// "bad" sends `$test2` to the target, then recovers by sending `$test4`
/// to the instance document.
#[test]
fn test_bad_route_recovers() {
    let mut harness = TestHarness::new();
    harness.start("$test1", vec![Value::from("bad")], 1000);

    let send: &[Step] = &[("PUSH ARGUMENT", true, 1), ("SEND 2", false, 2)];
    let recover: &[Step] = &[
        ("SAVE VARIABLE", false, 1),
        ("JUMP TO", false, 1),
        ("SKIP INSTRUCTION", false, 1),
        ("PUSH CONSTANT", true, 1),
        ("CALL $list", true, 1),
        ("PUSH ARGUMENT", true, 1),
        ("CALL $addItem", true, 1),
        ("SEND 3", false, 2),
        // $test4
        ("PUSH ARGUMENT", true, 2),
        ("PULL RESULT", true, 1),
        ("SAVE VARIABLE", false, 1),
        ("LOAD VARIABLE", true, 1),
        ("PULL RESULT", false, 0),
    ];
    walk(&mut harness, &[CAUGHT, SECOND_CHECK, send, TEST2_BODY, recover].concat());

    let task = harness.task();
    assert_eq!(task.state(), TaskState::Completed);
    assert_eq!(task.result(), Some(&Value::from("bad")));
}

/// With no argument nothing matches and the exception escapes the last
/// handler.
#[test]
fn test_ugly_route_abandons() {
    let mut harness = TestHarness::new();
    harness.start("$test1", vec![], 1000);

    let failed: &[Step] = &[("LOAD VARIABLE", true, 1), ("PULL EXCEPTION", false, 0)];
    walk(&mut harness, &[CAUGHT, SECOND_CHECK, failed].concat());

    let task = harness.task();
    assert_eq!(task.state(), TaskState::Abandoned);
    assert_eq!(task.exception(), Some(&Value::None));
    assert!(!task.has_contexts());
    assert!(!task.has_components());
}

/// Any other text takes the same failed branch, carrying the text.
#[test]
fn test_unmatched_exception_is_raised_again() {
    let mut harness = TestHarness::new();
    harness.start("$test1", vec![Value::from("worse")], 1000);

    let trace = harness.trace();
    assert_eq!(trace.len(), CAUGHT.len() + SECOND_CHECK.len() + 2);
    assert_eq!(trace.iter().filter(|m| *m == "PULL EXCEPTION").count(), 2);
    assert_eq!(harness.state(), TaskState::Abandoned);
    assert_eq!(harness.task().exception(), Some(&Value::from("worse")));
}

/// Routes run on the same harness one after another do not interfere.
#[test]
fn test_routes_are_independent() {
    let mut harness = TestHarness::new();
    for (argument, expected) in [
        (Some("good"), TaskState::Completed),
        (None, TaskState::Abandoned),
        (Some("bad"), TaskState::Completed),
    ] {
        let arguments = argument.map(Value::from).into_iter().collect();
        harness.start("$test1", arguments, 1000);
        assert_eq!(harness.run(), expected);
    }
}
