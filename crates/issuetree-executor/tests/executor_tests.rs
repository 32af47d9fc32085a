//! End-to-end tests for the executor against an in-memory tracker

use issuetree_core::{BatchInput, Item, RunStatus, StructuralError};
use issuetree_executor::{
    BatchRunner, ConfigurationError, Orchestrator, OrchestratorOptions, Outcome, RunError, RunFlags,
    RunnerOptions,
};
use issuetree_ledger::Ledger;
use issuetree_tracker::{InMemoryTracker, ResilientTracker, RetryPolicy, TrackerError};
use std::sync::Arc;
use std::time::Duration;

const REPO: &str = "acme/widgets";

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        create_attempts: 2,
        link_attempts: 3,
        base_delay: Duration::from_millis(1),
        attempt_timeout: Duration::from_secs(2),
    }
}

/// Epic with two stories; the first story has two tasks.
fn five_items() -> BatchInput {
    BatchInput {
        repository: REPO.into(),
        defaults: None,
        issues: vec![
            Item::new("epic", "Epic").with_body("The whole thing"),
            Item::new("s1", "Story one").with_parent("epic"),
            Item::new("s2", "Story two").with_parent("epic"),
            Item::new("t1", "Task one").with_parent("s1"),
            Item::new("t2", "Task two").with_parent("s1"),
        ],
    }
}

fn runner_with(tracker: Arc<InMemoryTracker>, ledger: Ledger, options: RunnerOptions) -> BatchRunner {
    BatchRunner::new(ledger, ResilientTracker::new(tracker, fast_policy()), options)
}

fn setup() -> (Arc<InMemoryTracker>, BatchRunner) {
    let tracker = Arc::new(InMemoryTracker::new(REPO));
    let runner = runner_with(tracker.clone(), Ledger::in_memory().unwrap(), RunnerOptions::default());
    (tracker, runner)
}

// ===========================================================================
// Happy path
// ===========================================================================

#[tokio::test]
async fn creates_and_links_every_item() {
    let (tracker, runner) = setup();
    let report = runner
        .run_input(&five_items(), "issues.json", "h1", &RunFlags::default())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(report.counters.created, 5);
    assert_eq!(report.counters.linked, 4);
    assert_eq!(report.counters.skipped, 0);

    let run = runner.ledger().get_run(&report.run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    let stats = runner.ledger().get_run_stats(&report.run_id).unwrap();
    assert_eq!((stats.total, stats.linked, stats.unlinked), (5, 4, 1));
    assert_eq!(tracker.links().len(), 4);
}

#[tokio::test]
async fn parents_created_before_children() {
    let (tracker, runner) = setup();
    let mut input = five_items();
    input.issues.reverse();
    runner.run_input(&input, "issues.json", "h1", &RunFlags::default()).await.unwrap();

    let titles = tracker.created_titles();
    let pos = |t: &str| titles.iter().position(|x| x == t).unwrap();
    assert!(pos("Epic") < pos("Story one"));
    assert!(pos("Epic") < pos("Story two"));
    assert!(pos("Story one") < pos("Task one"));
    assert!(pos("Story one") < pos("Task two"));
}

// ===========================================================================
// Idempotence and resume
// ===========================================================================

#[tokio::test]
async fn rerun_of_same_run_creates_nothing() {
    let tracker = Arc::new(InMemoryTracker::new(REPO));
    let resilient = ResilientTracker::new(tracker.clone(), fast_policy());
    let ledger = Ledger::in_memory().unwrap();
    let input = five_items();
    let graph = input.build_graph().unwrap();
    let order = graph.topological_sort().unwrap();
    ledger.create_run("r1", "issues.json", "h1", REPO).unwrap();

    let first = Orchestrator::new(&ledger, &resilient, REPO, OrchestratorOptions::default())
        .execute("r1", &graph, &order)
        .await
        .unwrap();
    assert_eq!(first.counters.created, 5);

    let options = OrchestratorOptions {
        resuming: true,
        ..Default::default()
    };
    let second = Orchestrator::new(&ledger, &resilient, REPO, options)
        .execute("r1", &graph, &order)
        .await
        .unwrap();
    assert_eq!((second.counters.created, second.counters.skipped), (0, 5));
    assert_eq!(tracker.create_calls(), 5);
}

#[tokio::test]
async fn identical_content_under_new_run_is_skipped() {
    let (tracker, runner) = setup();
    runner.run_input(&five_items(), "issues.json", "h1", &RunFlags::default()).await.unwrap();

    // Same items, different document hash (e.g. reformatted file).
    let report = runner
        .run_input(&five_items(), "issues.json", "h2", &RunFlags::default())
        .await
        .unwrap();
    assert_eq!(report.counters.created, 0);
    assert_eq!(report.counters.skipped, 5);
    assert_eq!(tracker.create_calls(), 5);
}

#[tokio::test]
async fn resume_after_interruption_creates_only_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    let tracker = Arc::new(InMemoryTracker::new(REPO));
    let input = five_items();
    let graph = input.build_graph().unwrap();
    let order = graph.topological_sort().unwrap();

    // First process: gets through three items, then dies.
    {
        let ledger = Ledger::open(&db).unwrap();
        let resilient = ResilientTracker::new(tracker.clone(), fast_policy());
        ledger.create_run("r1", "issues.json", "h1", REPO).unwrap();
        let partial = Orchestrator::new(&ledger, &resilient, REPO, OrchestratorOptions::default())
            .execute("r1", &graph, &order[..3])
            .await
            .unwrap();
        assert_eq!(partial.counters.created, 3);
    }

    // Second process: same input hash finds the in-progress run.
    let runner = runner_with(tracker.clone(), Ledger::open(&db).unwrap(), RunnerOptions::default());
    let report = runner
        .run_input(&input, "issues.json", "h1", &RunFlags { force: true, ..Default::default() })
        .await
        .unwrap();

    assert_eq!(report.run_id, "r1");
    assert_eq!(report.counters.created, 2);
    assert_eq!(report.counters.skipped, 3);

    let expected: Vec<String> = order[3..]
        .iter()
        .map(|id| graph.get(id).unwrap().title.clone())
        .collect();
    assert_eq!(&tracker.created_titles()[3..], expected.as_slice());
    assert_eq!(tracker.create_calls(), 5);
    assert_eq!(runner.ledger().get_run("r1").unwrap().unwrap().status, RunStatus::Completed);
    assert_eq!(runner.ledger().get_run_stats("r1").unwrap().total, 5);
}

#[tokio::test]
async fn explicit_resume_of_failed_run() {
    let (tracker, runner) = setup();
    runner.ledger().create_run("old", "issues.json", "h1", REPO).unwrap();
    runner.ledger().mark_run_complete("old", RunStatus::Failed).unwrap();

    let flags = RunFlags {
        resume: Some("old".into()),
        ..Default::default()
    };
    let report = runner.run_input(&five_items(), "issues.json", "h1", &flags).await.unwrap();
    assert_eq!(report.run_id, "old");
    assert_eq!(report.counters.created, 5);
    assert_eq!(tracker.created().len(), 5);
    assert_eq!(runner.ledger().get_run("old").unwrap().unwrap().status, RunStatus::Completed);
}

// ===========================================================================
// Per-item failures
// ===========================================================================

#[tokio::test]
async fn failed_parent_leaves_children_unlinked() {
    let (tracker, runner) = setup();
    tracker.fail_create("Story one", 10, TrackerError::api(422, "validation failed"));

    let report = runner
        .run_input(&five_items(), "issues.json", "h1", &RunFlags::default())
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.outcome, Outcome::Partial);
    assert_eq!(report.failed_ids, vec!["s1".to_string()]);
    assert_eq!(report.counters.created, 4);
    assert_eq!(report.counters.failed, 1);
    // Only story two links to the epic; the tasks have no recorded parent.
    assert_eq!(report.counters.linked, 1);
    let run = runner.ledger().get_run(&report.run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn link_failure_is_not_fatal() {
    let (tracker, runner) = setup();
    // Epic is #1, the first story #2.
    tracker.fail_link(InMemoryTracker::node_id(2), 10, TrackerError::GraphQl("boom".into()));

    let report = runner
        .run_input(&five_items(), "issues.json", "h1", &RunFlags::default())
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.counters.created, 5);
    assert_eq!(report.counters.linked, 3);
    assert_eq!(runner.ledger().get_run_stats(&report.run_id).unwrap().unlinked, 2);
}

#[tokio::test]
async fn transient_create_failure_is_retried() {
    let (tracker, runner) = setup();
    tracker.fail_create("Epic", 1, TrackerError::Timeout);

    let report = runner
        .run_input(&five_items(), "issues.json", "h1", &RunFlags::default())
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.counters.created, 5);
    assert_eq!(tracker.create_calls(), 6);
}

// ===========================================================================
// Dry run, force, configuration
// ===========================================================================

#[tokio::test]
async fn dry_run_touches_nothing() {
    let (tracker, runner) = setup();
    let flags = RunFlags {
        dry_run: true,
        ..Default::default()
    };
    let report = runner.run_input(&five_items(), "issues.json", "h1", &flags).await.unwrap();

    assert_eq!(report.outcome, Outcome::DryRun);
    assert_eq!(report.counters.created, 5);
    assert_eq!(tracker.create_calls(), 0);
    assert!(runner.ledger().list_runs().unwrap().is_empty());
}

#[tokio::test]
async fn completed_input_is_refused_without_force() {
    let (tracker, runner) = setup();
    let first = runner
        .run_input(&five_items(), "issues.json", "h1", &RunFlags::default())
        .await
        .unwrap();

    let err = runner
        .run_input(&five_items(), "issues.json", "h1", &RunFlags::default())
        .await
        .unwrap_err();
    match err {
        RunError::Configuration(ConfigurationError::InputAlreadyProcessed { run_id }) => {
            assert_eq!(run_id, first.run_id);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(tracker.create_calls(), 5);
}

#[tokio::test]
async fn force_recreates_completed_input() {
    let (tracker, runner) = setup();
    let first = runner
        .run_input(&five_items(), "issues.json", "h1", &RunFlags::default())
        .await
        .unwrap();

    let flags = RunFlags {
        force: true,
        ..Default::default()
    };
    let second = runner.run_input(&five_items(), "issues.json", "h1", &flags).await.unwrap();
    assert_ne!(second.run_id, first.run_id);
    assert_eq!(second.counters.created, 5);
    assert_eq!(tracker.created().len(), 10);
}

#[tokio::test]
async fn resume_of_unknown_or_completed_run_is_refused() {
    let (_tracker, runner) = setup();
    let flags = RunFlags {
        resume: Some("ghost".into()),
        ..Default::default()
    };
    let err = runner.run_input(&five_items(), "issues.json", "h1", &flags).await.unwrap_err();
    assert!(matches!(err, RunError::Configuration(ConfigurationError::RunNotFound(_))));

    let done = runner
        .run_input(&five_items(), "issues.json", "h1", &RunFlags::default())
        .await
        .unwrap();
    let flags = RunFlags {
        resume: Some(done.run_id),
        ..Default::default()
    };
    let err = runner.run_input(&five_items(), "issues.json", "h1", &flags).await.unwrap_err();
    assert!(matches!(err, RunError::Configuration(ConfigurationError::AlreadyCompleted(_))));
}

#[tokio::test]
async fn structural_errors_stop_before_any_call() {
    let (tracker, runner) = setup();
    let input = BatchInput {
        repository: REPO.into(),
        defaults: None,
        issues: vec![
            Item::new("a", "A").with_parent("b"),
            Item::new("b", "B").with_parent("a"),
        ],
    };
    let err = runner
        .run_input(&input, "issues.json", "h1", &RunFlags::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Structural(StructuralError::Cycle { .. })));
    assert_eq!(tracker.create_calls(), 0);
    assert!(runner.ledger().list_runs().unwrap().is_empty());
}

#[tokio::test]
async fn run_file_reads_and_hashes_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("issues.json");
    std::fs::write(&path, serde_json::to_string(&five_items()).unwrap()).unwrap();

    let (_tracker, runner) = setup();
    let report = runner.run_file(&path, &RunFlags::default()).await.unwrap();
    let run = runner.ledger().get_run(&report.run_id).unwrap().unwrap();
    assert_eq!(run.input_file_hash, issuetree_core::hash_file(&path).unwrap());
    assert_eq!(run.input_file, path.display().to_string());

    let missing = runner.run_file(&dir.path().join("nope.json"), &RunFlags::default()).await;
    assert!(matches!(missing, Err(RunError::Input(_))));
}

// ===========================================================================
// Ledger failures
// ===========================================================================

/// File-backed runner plus a second connection to the same database, used to
/// install triggers that make specific ledger writes fail.
fn file_backed() -> (tempfile::TempDir, Arc<InMemoryTracker>, BatchRunner, rusqlite::Connection) {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    let tracker = Arc::new(InMemoryTracker::new(REPO));
    let runner = runner_with(tracker.clone(), Ledger::open(&db).unwrap(), RunnerOptions::default());
    let side = rusqlite::Connection::open(&db).unwrap();
    (dir, tracker, runner, side)
}

#[tokio::test]
async fn ledger_write_failure_aborts_and_marks_run_failed() {
    let (_dir, tracker, runner, side) = file_backed();
    side.execute_batch(
        "CREATE TRIGGER reject_third_record BEFORE INSERT ON created_items
         WHEN (SELECT COUNT(*) FROM created_items) >= 2
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    )
    .unwrap();

    let err = runner
        .run_input(&five_items(), "issues.json", "h1", &RunFlags::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Ledger(_)), "got {err}");

    // The third issue exists in the tracker; nothing after it was attempted.
    assert_eq!(tracker.create_calls(), 3);
    let run = runner.ledger().list_runs().unwrap().remove(0);
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.completed_at.is_some());
    assert_eq!(runner.ledger().get_run_stats(&run.run_id).unwrap().total, 2);

    // Once the ledger accepts writes again the run can be resumed.
    side.execute_batch("DROP TRIGGER reject_third_record;").unwrap();
    let flags = RunFlags {
        resume: Some(run.run_id.clone()),
        ..Default::default()
    };
    let report = runner.run_input(&five_items(), "issues.json", "h1", &flags).await.unwrap();
    assert_eq!(report.counters.skipped, 2);
    assert_eq!(report.counters.created, 3);
    assert_eq!(
        runner.ledger().get_run(&run.run_id).unwrap().unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn failed_completion_mark_falls_back_to_failed() {
    let (_dir, tracker, runner, side) = file_backed();
    side.execute_batch(
        "CREATE TRIGGER reject_completion BEFORE UPDATE ON runs
         WHEN NEW.status = 'completed'
         BEGIN SELECT RAISE(ABORT, 'read-only'); END;",
    )
    .unwrap();

    let err = runner
        .run_input(&five_items(), "issues.json", "h1", &RunFlags::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Ledger(_)), "got {err}");

    assert_eq!(tracker.created().len(), 5);
    let run = runner.ledger().list_runs().unwrap().remove(0);
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(runner.ledger().get_run_stats(&run.run_id).unwrap().total, 5);
}

// ===========================================================================
// Resource check
// ===========================================================================

#[tokio::test]
async fn missing_resources_are_reported_and_labels_created() {
    let tracker = Arc::new(InMemoryTracker::new(REPO).with_milestone("v1").with_label("bug"));
    let runner = runner_with(
        tracker.clone(),
        Ledger::in_memory().unwrap(),
        RunnerOptions {
            create_missing_labels: true,
        },
    );
    let mut a = Item::new("a", "A");
    a.milestone = Some("v1".into());
    a.labels = vec!["bug".into(), "feature".into()];
    let mut b = Item::new("b", "B");
    b.milestone = Some("v2".into());

    let check = runner.check_resources(&[a, b]).await;
    assert_eq!(check.missing_milestones, vec!["v2".to_string()]);
    assert_eq!(check.missing_labels, vec!["feature".to_string()]);
    assert_eq!(check.created_labels, vec!["feature".to_string()]);
}

#[tokio::test]
async fn missing_labels_only_reported_by_default() {
    let (_tracker, runner) = setup();
    let mut a = Item::new("a", "A");
    a.labels = vec!["bug".into()];
    let check = runner.check_resources(&[a]).await;
    assert_eq!(check.missing_labels, vec!["bug".to_string()]);
    assert!(check.created_labels.is_empty());
}
