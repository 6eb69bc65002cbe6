//! Fixture routes scheduled through the task queue and worker pool.

use std::sync::Arc;

use tessera_foundation::{AccountId, BagId, ExceptionKind, Symbol, Value};
use tessera_tests::{init_logging, test_instance, test_repository, TEST_ACCOUNT};
use tessera_vm::{
    MemoryQueue, MemoryRepository, Outcome, Processor, Repository, TaskQueue, TaskSnapshot,
    VmConfig, Worker, WorkerPool,
};

fn route(
    repository: &Arc<MemoryRepository>,
    argument: Option<&str>,
    reply_to: &BagId,
) -> TaskSnapshot {
    let mut processor = Processor::new(VmConfig::default(), repository.clone()).unwrap();
    let task = processor
        .new_task(
            AccountId::new(TEST_ACCOUNT),
            1000,
            test_instance(),
            Symbol::new("$test1"),
            argument.map(Value::from).into_iter().collect(),
        )
        .unwrap();
    task.set_reply_to(Some(reply_to.clone()));
    task.freeze()
}

fn config(quantum: u64) -> VmConfig {
    VmConfig {
        quantum,
        ..VmConfig::default()
    }
}

#[test]
fn test_worker_slices_a_route_into_quanta() {
    init_logging();
    let repository = test_repository();
    let queue = Arc::new(MemoryQueue::new());
    let replies = BagId::new("/acme/bags/replies");
    let task = route(&repository, Some("bad"), &replies);
    let id = task.id;
    queue.enqueue(task).unwrap();

    let mut worker = Worker::new(config(5), repository.clone(), queue.clone()).unwrap();
    let outcomes = worker.run_until_idle().unwrap();

    // 39 instructions in quanta of 5.
    assert_eq!(outcomes.len(), 8);
    assert!(outcomes[..7].iter().all(|o| *o == Outcome::Requeued(id)));
    assert_eq!(outcomes[7], Outcome::Completed(id));
    assert_eq!(
        repository.retrieve_message(&replies).unwrap(),
        Some(Value::from("bad"))
    );
    let acked = queue.acked().unwrap();
    assert_eq!(acked[0].budget - acked[0].tokens, 39);
}

#[test]
fn test_pool_delivers_every_outcome() {
    init_logging();
    let repository = test_repository();
    let queue = Arc::new(MemoryQueue::new());
    let replies = BagId::new("/acme/bags/replies");
    let routes = [Some("good"), Some("bad"), None, Some("bad"), Some("worse")];
    for argument in routes.iter().cycle().take(15) {
        queue.enqueue(route(&repository, *argument, &replies)).unwrap();
    }

    let pool = WorkerPool::new(config(4), repository.clone(), queue.clone(), 4).unwrap();
    let outcomes = pool.run_until_idle().unwrap();

    let completed = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Completed(_)))
        .count();
    let abandoned = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Abandoned(_)))
        .count();
    assert_eq!(completed, 9);
    assert_eq!(abandoned, 6);
    assert!(queue.failed().unwrap().is_empty());
    assert_eq!(queue.pending().unwrap(), 0);
    assert_eq!(queue.in_flight().unwrap(), 0);
    assert_eq!(repository.bag_len(&replies).unwrap(), 15);
}

#[test]
fn test_missing_type_fails_the_task() {
    let repository = test_repository();
    let queue = Arc::new(MemoryQueue::new());
    let replies = BagId::new("/acme/bags/replies");
    let task = route(&repository, Some("good"), &replies);
    queue.enqueue(task).unwrap();

    // A worker whose repository no longer has the fixture type: the first
    // send raises $unresolvedTarget, which $test1's handler matches against
    // neither literal and raises again. Abandoned, not failed.
    let empty: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let mut worker = Worker::new(VmConfig::default(), empty.clone(), queue.clone()).unwrap();
    let outcome = worker.process_next().unwrap();
    assert!(matches!(outcome, Outcome::Abandoned(_)));
    let reply = empty.retrieve_message(&replies).unwrap().unwrap();
    assert_eq!(
        reply.exception_kind(),
        Some(&ExceptionKind::UnresolvedTarget.symbol())
    );
}
