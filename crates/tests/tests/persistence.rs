//! Task snapshots persisted to disk and picked up again.

use std::sync::Arc;

use tessera_foundation::Value;
use tessera_tests::TestHarness;
use tessera_vm::snapshot::{load_task, save_task};
use tessera_vm::{MemoryQueue, Outcome, SnapshotError, TaskQueue, TaskState, VmConfig, Worker};

#[test]
fn test_saved_task_resumes_on_a_worker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks").join("bad.task");

    let mut harness = TestHarness::new();
    let id = harness.start("$test1", vec![Value::from("bad")], 1000);
    // Stop inside the nested $test3 frame.
    for _ in 0..7 {
        assert!(harness.step());
    }
    assert_eq!(harness.task().call_depth(), 2);
    save_task(&path, &harness.task().freeze()).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("partial").exists());

    let snapshot = load_task(&path).unwrap();
    assert_eq!(snapshot, harness.task().freeze());

    let queue = Arc::new(MemoryQueue::new());
    queue.enqueue(snapshot).unwrap();
    let mut worker = Worker::new(VmConfig::default(), harness.repository().clone(), queue.clone())
        .unwrap();
    assert_eq!(worker.process_next().unwrap(), Outcome::Completed(id));

    let acked = queue.acked().unwrap();
    assert_eq!(acked[0].state, TaskState::Completed);
    assert_eq!(acked[0].result, Some(Value::from("bad")));
}

#[test]
fn test_finished_task_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("good.task");

    let mut harness = TestHarness::new();
    harness.start("$test1", vec![Value::from("good")], 1000);
    harness.run();
    save_task(&path, &harness.task().freeze()).unwrap();

    let mut reloaded = TestHarness::new();
    reloaded
        .processor_mut()
        .load_task(load_task(&path).unwrap())
        .unwrap();
    assert_eq!(reloaded.state(), TaskState::Completed);
    assert_eq!(reloaded.task().result(), harness.task().result());
    assert!(!reloaded.step());
}

#[test]
fn test_garbage_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.task");
    std::fs::write(&path, b"not a task").unwrap();
    assert!(matches!(
        load_task(&path),
        Err(SnapshotError::Decompression(_))
    ));
}
