use super::*;
use crate::types::TypeBuilder;
use tessera_foundation::Symbol;

fn context(component_base: usize) -> Context {
    let compiled = TypeBuilder::new("/acme/types/Waiter")
        .method(
            "$run",
            &[],
            "
            LOAD MESSAGE $bag
            PULL RESULT
            ",
        )
        .unwrap()
        .build();
    Context::activate(&compiled, Value::None, Symbol::new("run"), vec![], component_base).unwrap()
}

fn task(tokens: u64) -> Task {
    Task::new(
        TaskId(7),
        AccountId::new("/acme/accounts/alice"),
        tokens,
        context(0),
    )
}

fn inbox() -> WaitReason {
    WaitReason::Message {
        bag: BagId::new("/acme/bags/inbox"),
    }
}

#[test]
fn new_task_is_active_with_one_frame() {
    let task = task(5);
    assert_eq!(task.state(), TaskState::Active);
    assert_eq!(task.call_depth(), 1);
    assert!(task.has_contexts());
    assert!(!task.has_components());
    assert_eq!(task.tokens_used(), 0);
    assert!(task.outcome().is_none());
}

#[test]
fn completion_clears_stacks() {
    let mut task = task(5);
    task.push_component(Value::from(1i64));
    task.push_context(context(1));
    task.complete(Value::from("done")).unwrap();

    assert_eq!(task.state(), TaskState::Completed);
    assert!(!task.has_contexts());
    assert!(!task.has_components());
    assert_eq!(task.result(), Some(&Value::from("done")));
    assert!(task.exception().is_none());
}

#[test]
fn terminal_states_reject_transitions() {
    let mut task = task(5);
    task.abandon(Value::from("boom")).unwrap();
    assert!(matches!(
        task.complete(Value::None),
        Err(ExecutionError::InvalidTransition {
            from: TaskState::Abandoned,
            to: TaskState::Completed
        })
    ));
    assert!(task.transition_to(TaskState::Active).is_err());
    assert_eq!(task.exception(), Some(&Value::from("boom")));
}

#[test]
fn tokens_run_out_into_abandonment() {
    let mut task = task(2);
    task.consume_token();
    assert_eq!(task.state(), TaskState::Active);
    task.consume_token();
    assert_eq!(task.state(), TaskState::Abandoned);
    assert_eq!(task.tokens_used(), 2);
    let exception = task.exception().unwrap();
    assert_eq!(
        exception.exception_kind(),
        Some(&ExceptionKind::ResourceExhausted.symbol())
    );
}

#[test]
fn last_token_overrides_completion() {
    let mut task = task(1);
    task.complete(Value::from(true)).unwrap();
    task.consume_token();
    assert_eq!(task.state(), TaskState::Abandoned);
    assert_eq!(task.result(), None);
    assert_eq!(
        task.exception().and_then(Value::exception_kind),
        Some(&ExceptionKind::ResourceExhausted.symbol())
    );
    assert_eq!(task.tokens(), 0);
}

#[test]
fn completing_with_tokens_left_keeps_the_result() {
    let mut task = task(2);
    task.complete(Value::from(true)).unwrap();
    task.consume_token();
    assert_eq!(task.state(), TaskState::Completed);
    assert_eq!(task.result(), Some(&Value::from(true)));
}

#[test]
fn waiting_on_the_last_token_abandons() {
    let mut task = task(1);
    task.wait(inbox()).unwrap();
    task.consume_token();
    assert_eq!(task.state(), TaskState::Abandoned);
    assert!(task.wait_reason().is_none());
}

#[test]
fn resume_delivers_reply_and_advances() {
    let mut task = task(5);
    task.wait(inbox()).unwrap();
    assert_eq!(task.wait_reason(), Some(&inbox()));
    assert!(task.wait(inbox()).is_err());

    task.resume(Value::from("hello")).unwrap();
    assert_eq!(task.state(), TaskState::Active);
    assert_eq!(task.components(), &[Value::from("hello")]);
    assert_eq!(task.current_context().unwrap().address(), 2);
    assert!(task.resume(Value::None).is_err());
}

#[test]
fn freeze_and_thaw_preserve_everything() {
    let mut task = task(9);
    task.set_reply_to(Some(BagId::new("/acme/bags/replies")));
    task.push_component(Value::from(3i64));
    task.push_context(context(1));
    task.consume_token();
    task.wait(inbox()).unwrap();

    let frozen = task.freeze();
    let thawed = Task::thaw(frozen.clone(), true).unwrap();
    assert_eq!(thawed, task);
    assert_eq!(thawed.freeze(), frozen);
}

#[test]
fn thaw_rejects_inconsistent_snapshots() {
    let mut frozen = task(5).freeze();
    frozen.state = TaskState::Completed;
    assert!(matches!(
        Task::thaw(frozen, false),
        Err(SnapshotError::Corrupt(_))
    ));

    let mut frozen = task(5).freeze();
    frozen.tokens = 6;
    assert!(Task::thaw(frozen, false).is_err());

    let mut frozen = task(5).freeze();
    frozen.contexts[0].component_base = 3;
    assert!(Task::thaw(frozen, false).is_err());

    let mut frozen = task(5).freeze();
    frozen.version = 0;
    assert!(matches!(
        Task::thaw(frozen, false),
        Err(SnapshotError::VersionMismatch { .. })
    ));
}
