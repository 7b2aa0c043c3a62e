//! Integration tests for the task board state machine.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tangle::board::{SharedBoard, TaskBoard};
use tangle::domain::{NewTask, TaskLabel, TaskState};
use tangle::error::Error;
use tangle::graph::strongly_connected_components;

mod common;
use common::{board_with, id, ids, node_name};

// ============================================================================
// Claiming
// ============================================================================

#[test]
fn test_claim_then_second_claim_fails() {
    let mut board = board_with(&[("T1", &[])]);
    assert_eq!(board.get(&id("T1")).unwrap().state, TaskState::Ready);

    let claimed = board.claim(&id("T1"), "agentX").unwrap();
    assert_eq!(claimed.state, TaskState::InProgress);
    assert_eq!(claimed.claimant.as_deref(), Some("agentX"));

    let err = board.claim(&id("T1"), "agentY").unwrap_err();
    assert!(matches!(err, Error::AlreadyClaimed { claimant, .. } if claimant == "agentX"));
}

#[test]
fn test_completion_promotes_dependent() {
    let mut board = board_with(&[("T1", &[]), ("T2", &["T1"])]);
    assert_eq!(board.get(&id("T2")).unwrap().state, TaskState::Pending);
    assert!(board.claim(&id("T2"), "a").is_err());

    board.claim(&id("T1"), "a").unwrap();
    let completion = board.complete(&id("T1"), None, true, Some("a")).unwrap();

    assert_eq!(completion.newly_ready, ids(&["T2"]));
    assert!(completion.still_blocked.is_empty());
    assert_eq!(board.get(&id("T2")).unwrap().state, TaskState::Ready);
}

#[test]
fn test_diamond_waits_for_both_branches() {
    let mut board = board_with(&[
        ("root", &[]),
        ("left", &["root"]),
        ("right", &["root"]),
        ("join", &["left", "right"]),
    ]);

    board.claim(&id("root"), "a").unwrap();
    let completion = board.complete(&id("root"), None, true, None).unwrap();
    assert_eq!(completion.newly_ready, ids(&["left", "right"]));

    board.claim(&id("left"), "a").unwrap();
    let completion = board.complete(&id("left"), None, true, None).unwrap();
    assert!(completion.newly_ready.is_empty());
    assert_eq!(completion.still_blocked, ids(&["join"]));

    board.claim(&id("right"), "b").unwrap();
    let completion = board.complete(&id("right"), None, true, None).unwrap();
    assert_eq!(completion.newly_ready, ids(&["join"]));
}

#[test]
fn test_failure_blocks_transitive_dependents() {
    let mut board = board_with(&[("T1", &[]), ("T2", &["T1"]), ("T3", &["T2"])]);

    board.claim(&id("T1"), "a").unwrap();
    let completion = board.complete(&id("T1"), None, false, None).unwrap();

    assert_eq!(completion.task.state, TaskState::Failed);
    assert!(completion.newly_ready.is_empty());
    assert_eq!(board.label(&id("T3")).unwrap(), TaskLabel::Blocked);

    let blocked = board.blocked();
    assert_eq!(blocked.len(), 2);
    assert!(blocked.iter().all(|b| b.failed_dependencies == ids(&["T1"])));

    let err = board.claim(&id("T2"), "a").unwrap_err();
    assert!(matches!(err, Error::NotReady { label: TaskLabel::Blocked, .. }));
}

#[test]
fn test_release_returns_task_to_ready_pool() {
    let mut board = board_with(&[("T1", &[])]);
    board.claim(&id("T1"), "a").unwrap();

    assert!(matches!(
        board.release(&id("T1"), "b"),
        Err(Error::AlreadyClaimed { .. })
    ));

    let released = board.release(&id("T1"), "a").unwrap();
    assert_eq!(released.state, TaskState::Ready);
    assert!(released.claimant.is_none());
    assert_eq!(board.ready(None).len(), 1);
}

#[test]
fn test_ready_orders_by_priority() {
    let mut board = TaskBoard::new();
    board.create(NewTask::new("low").with_priority(-1)).unwrap();
    board.create(NewTask::new("high").with_priority(5)).unwrap();
    board.create(NewTask::new("mid")).unwrap();

    let order: Vec<String> = board.ready(None).into_iter().map(|t| t.id.into_inner()).collect();
    assert_eq!(order, vec!["high", "mid", "low"]);
    assert_eq!(board.ready(Some(1)).len(), 1);
}

// ============================================================================
// Dependency edits
// ============================================================================

#[test]
fn test_transitive_cycle_is_rejected_without_change() {
    let mut board = board_with(&[("T1", &[]), ("T3", &["T1"]), ("T2", &["T3"])]);
    let before = board.snapshot();

    let err = board.add_dependency(&id("T1"), &id("T2")).unwrap_err();

    assert!(matches!(err, Error::CycleWouldForm { .. }));
    assert!(err.to_string().contains("T1 -> T2 -> T3 -> T1"));
    assert_eq!(board.snapshot(), before);
    assert!(!board.graph().has_edge(&id("T1"), &id("T2")));
}

#[test]
fn test_duplicate_dependency_is_rejected() {
    let mut board = board_with(&[("T1", &[]), ("T2", &["T1"])]);

    let err = board.add_dependency(&id("T2"), &id("T1")).unwrap_err();

    assert!(matches!(err, Error::DuplicateEdge { .. }));
}

#[test]
fn test_removing_last_unmet_dependency_makes_task_ready() {
    let mut board = board_with(&[("T1", &[]), ("T2", &["T1"])]);

    let task = board.remove_dependency(&id("T2"), &id("T1")).unwrap();

    assert_eq!(task.state, TaskState::Ready);
    assert!(task.dependencies.is_empty());
}

#[test]
fn test_delete_guarded_by_dependents() {
    let mut board = board_with(&[("T1", &[]), ("T2", &["T1"])]);

    assert!(matches!(
        board.delete(&id("T1")),
        Err(Error::HasDependents { .. })
    ));

    board.delete(&id("T2")).unwrap();
    let deleted = board.delete(&id("T1")).unwrap();
    assert_eq!(deleted.id, id("T1"));
    assert!(board.is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let board = Arc::new(SharedBoard::in_memory());
    board.create(NewTask::new("T1")).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let board = Arc::clone(&board);
            tokio::spawn(async move { board.claim(&id("T1"), &format!("agent-{i}")).await })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(task) => winners.push(task.claimant),
            Err(err) => assert!(matches!(err, Error::AlreadyClaimed { .. })),
        }
    }

    assert_eq!(winners.len(), 1);
    let task = board.read().await.get(&id("T1")).cloned().unwrap();
    assert_eq!(task.claimant, winners[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_agents_drain_the_board() {
    let board = Arc::new(SharedBoard::in_memory());
    board.create(NewTask::new("base")).await.unwrap();
    for i in 0..8 {
        board
            .create(NewTask::new(node_name(i)).with_dependencies(["base"]))
            .await
            .unwrap();
    }

    let workers: Vec<_> = (0..4)
        .map(|w| {
            let board = Arc::clone(&board);
            tokio::spawn(async move {
                let agent = format!("worker-{w}");
                let mut done = Vec::new();
                loop {
                    let candidates = board.read().await.ready(None);
                    if candidates.is_empty() {
                        let stats = board.read().await.stats();
                        if stats.completed == stats.total {
                            break;
                        }
                        tokio::task::yield_now().await;
                        continue;
                    }
                    for task in candidates {
                        if board.claim(&task.id, &agent).await.is_ok() {
                            board
                                .complete(&task.id, None, true, Some(agent.as_str()))
                                .await
                                .unwrap();
                            done.push(task.id);
                        }
                    }
                }
                done
            })
        })
        .collect();

    let mut all = Vec::new();
    for worker in workers {
        all.extend(worker.await.unwrap());
    }

    let unique: BTreeSet<_> = all.iter().cloned().collect();
    assert_eq!(all.len(), 9, "each task is completed exactly once");
    assert_eq!(unique.len(), 9);
}

// ============================================================================
// Properties
// ============================================================================

const TASKS: usize = 8;

proptest! {
    #[test]
    fn prop_board_graph_never_contains_a_cycle(
        edits in prop::collection::vec((0..TASKS, 0..TASKS), 0..40),
    ) {
        let mut board = TaskBoard::new();
        for i in 0..TASKS {
            board.create(NewTask::new(node_name(i))).unwrap();
        }

        for (from, to) in edits {
            let before = board.snapshot();
            match board.add_dependency(&id(&node_name(from)), &id(&node_name(to))) {
                Ok(_) => {}
                Err(Error::CycleWouldForm { .. } | Error::DuplicateEdge { .. }) => {
                    prop_assert_eq!(board.snapshot(), before);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }

        for component in strongly_connected_components(board.graph()) {
            prop_assert_eq!(component.len(), 1);
            prop_assert!(!board.graph().has_edge(&component[0], &component[0]));
        }
    }

    #[test]
    fn prop_readiness_tracks_completed_dependencies(
        deps in prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..3), 1..TASKS),
    ) {
        // Task i may only depend on tasks created before it.
        let mut board = TaskBoard::new();
        for (i, picks) in deps.iter().enumerate() {
            let mut task_deps: Vec<String> = if i == 0 {
                Vec::new()
            } else {
                picks.iter().map(|p| node_name(p.index(i))).collect()
            };
            task_deps.sort();
            task_deps.dedup();
            board
                .create(NewTask::new(node_name(i)).with_dependencies(task_deps))
                .unwrap();
        }

        let mut completed: BTreeSet<String> = BTreeSet::new();
        let mut previously_ready: BTreeSet<String> = BTreeSet::new();
        loop {
            for task in board.snapshot().tasks {
                let deps_done = task
                    .dependencies
                    .iter()
                    .all(|d| completed.contains(d.as_str()));
                match task.state {
                    TaskState::Ready => prop_assert!(deps_done),
                    TaskState::Pending => prop_assert!(!deps_done),
                    TaskState::Completed => prop_assert!(completed.contains(task.id.as_str())),
                    TaskState::InProgress | TaskState::Failed => {
                        prop_assert!(false, "no task is left claimed or failed");
                    }
                }
            }

            let ready: BTreeSet<String> =
                board.ready(None).into_iter().map(|t| t.id.into_inner()).collect();
            // Nothing leaves the ready set except by being claimed
            prop_assert!(previously_ready.is_subset(&ready));

            let Some(next) = ready.iter().next().cloned() else {
                break;
            };
            board.claim(&id(&next), "agent").unwrap();
            board.complete(&id(&next), None, true, None).unwrap();
            completed.insert(next.clone());

            previously_ready = ready;
            previously_ready.remove(&next);
        }

        prop_assert_eq!(completed.len(), deps.len());
    }
}
