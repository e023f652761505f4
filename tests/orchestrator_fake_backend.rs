use std::collections::HashSet;
use std::error::Error;

use nix::sys::signal::Signal;
use trainer::engine::{Orchestrator, OrchestratorState, Termination};
use trainer::errors::TrainerError;
use trainer::pipeline::Topology;
use trainer_test_utils::builders::PipelineConfigBuilder;
use trainer_test_utils::fake_backend::{BackendCall, FakeBackend};
use trainer_test_utils::{SharedBuffer, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn four_stages() -> Topology {
    PipelineConfigBuilder::four_stages().topology("data.csv")
}

#[tokio::test]
async fn every_pipe_end_is_closed_exactly_once() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new();
    let log = backend.log();
    let mut orchestrator = Orchestrator::new(backend, four_stages()).with_diagnostics(SharedBuffer::new());

    with_timeout(orchestrator.run()).await?;

    let created = log.created_fds();
    assert_eq!(created.len(), 6);

    let mut closed = log.closed_fds();
    assert_eq!(closed.len(), 6, "closed: {closed:?}");
    closed.sort();
    let mut expected = created.clone();
    expected.sort();
    assert_eq!(closed, expected);

    let unique: HashSet<i32> = log.closed_fds().into_iter().collect();
    assert_eq!(unique.len(), 6);

    Ok(())
}

#[tokio::test]
async fn pipes_are_marked_before_the_first_spawn_and_closed_before_reaping() -> TestResult {
    let backend = FakeBackend::new();
    let log = backend.log();
    let mut orchestrator = Orchestrator::new(backend, four_stages()).with_diagnostics(SharedBuffer::new());

    with_timeout(orchestrator.run()).await?;

    let mut marked = log.marked_fds();
    marked.sort();
    let mut created = log.created_fds();
    created.sort();
    assert_eq!(marked, created);

    let last_mark = log
        .all()
        .iter()
        .rposition(|c| matches!(c, BackendCall::MarkCloexec(_)))
        .unwrap();
    let first_spawn = log
        .position(|c| matches!(c, BackendCall::Spawn { .. }))
        .unwrap();
    let last_spawn = log
        .all()
        .iter()
        .rposition(|c| matches!(c, BackendCall::Spawn { .. }))
        .unwrap();
    let first_close = log.position(|c| matches!(c, BackendCall::Close(_))).unwrap();
    let reaping = log
        .position(|c| matches!(c, BackendCall::StartReaping(_)))
        .unwrap();

    assert!(last_mark < first_spawn);
    assert!(last_spawn < first_close);
    assert!(first_close < reaping);

    Ok(())
}

#[tokio::test]
async fn stages_are_wired_along_the_chain() -> TestResult {
    let backend = FakeBackend::new();
    let log = backend.log();
    let mut orchestrator = Orchestrator::new(backend, four_stages()).with_diagnostics(SharedBuffer::new());

    with_timeout(orchestrator.run()).await?;

    // Pipes are allocated in order: fds 10/11, 12/13, 14/15 as (read, write).
    let spawns = log.spawns();
    assert_eq!(
        spawns,
        vec![
            ("producer".to_string(), None, Some(11)),
            ("transformer1".to_string(), Some(10), Some(13)),
            ("transformer2".to_string(), Some(12), Some(15)),
            ("consumer".to_string(), Some(14), None),
        ]
    );

    assert_eq!(
        log.argv_of("producer").unwrap(),
        vec!["bin/producer".to_string(), "data.csv".to_string()]
    );
    assert_eq!(log.argv_of("consumer").unwrap(), vec!["bin/consumer".to_string()]);

    Ok(())
}

#[tokio::test]
async fn pipe_creation_failure_spawns_nothing() -> TestResult {
    for failing in 0..3 {
        let backend = FakeBackend::new().fail_pipe_at(failing);
        let log = backend.log();
        let mut orchestrator = Orchestrator::new(backend, four_stages());

        let err = with_timeout(orchestrator.run()).await.unwrap_err();
        match err {
            TrainerError::PipeCreation { index, .. } => assert_eq!(index, failing),
            other => panic!("expected PipeCreation, got {other:?}"),
        }

        assert_eq!(orchestrator.state(), OrchestratorState::Failed);
        assert!(log.spawns().is_empty());
        assert!(!log.reaping_started());

        // Pipes allocated before the failure are still released.
        let mut closed = log.closed_fds();
        closed.sort();
        assert_eq!(closed, log.created_fds());
        assert_eq!(log.pipes_created(), failing);
    }

    Ok(())
}

#[tokio::test]
async fn spawn_failure_stops_later_spawns() -> TestResult {
    let backend = FakeBackend::new().fail_spawn_at(1);
    let log = backend.log();
    let mut orchestrator = Orchestrator::new(backend, four_stages());

    let err = with_timeout(orchestrator.run()).await.unwrap_err();
    assert!(matches!(err, TrainerError::Spawn { ref stage, .. } if stage == "transformer1"));
    assert_eq!(orchestrator.state(), OrchestratorState::Failed);

    let attempted: Vec<String> = log.spawns().into_iter().map(|(s, _, _)| s).collect();
    assert_eq!(attempted, vec!["producer", "transformer1"]);
    assert!(!log.reaping_started());
    assert_eq!(log.closed_fds().len(), 6);

    Ok(())
}

#[tokio::test]
async fn hygiene_failures_are_not_fatal() -> TestResult {
    let backend = FakeBackend::new().fail_cloexec();
    let log = backend.log();
    let mut orchestrator = Orchestrator::new(backend, four_stages()).with_diagnostics(SharedBuffer::new());

    let report = with_timeout(orchestrator.run()).await?;

    assert_eq!(log.marked_fds().len(), 6);
    assert_eq!(log.spawns().len(), 4);
    assert_eq!(report.exits.len(), 4);

    Ok(())
}

#[tokio::test]
async fn one_line_per_child_distinguishing_exit_from_signal() -> TestResult {
    let backend = FakeBackend::new()
        .terminate("transformer2", Termination::Exited(7))
        .terminate("consumer", Termination::Signaled(Signal::SIGKILL));
    let diagnostics = SharedBuffer::new();
    let mut orchestrator =
        Orchestrator::new(backend, four_stages()).with_diagnostics(diagnostics.clone());

    let report = with_timeout(orchestrator.run()).await?;
    assert_eq!(orchestrator.state(), OrchestratorState::Done);

    let lines = diagnostics.lines();
    assert_eq!(lines.len(), 4, "lines: {lines:?}");
    assert!(lines.contains(&"trainer: child 4000 (producer) exited with status 0".to_string()));
    assert!(lines.contains(&"trainer: child 4001 (transformer1) exited with status 0".to_string()));
    assert!(lines.contains(&"trainer: child 4002 (transformer2) exited with status 7".to_string()));
    assert!(lines.contains(
        &"trainer: child 4003 (consumer) terminated by signal 9 (SIGKILL)".to_string()
    ));

    assert_eq!(report.failed_stages().len(), 2);
    assert_eq!(report.exit_code(false), 0);
    assert_eq!(report.exit_code(true), 1);

    Ok(())
}

#[tokio::test]
async fn reap_failure_is_reported_and_the_drain_finishes() -> TestResult {
    let backend = FakeBackend::new().unreapable("transformer1");
    let diagnostics = SharedBuffer::new();
    let mut orchestrator =
        Orchestrator::new(backend, four_stages()).with_diagnostics(diagnostics.clone());

    let report = with_timeout(orchestrator.run()).await?;

    assert_eq!(report.exits.len(), 4);
    assert_eq!(report.exit_for("transformer1").unwrap().termination, None);

    let lines = diagnostics.lines();
    assert_eq!(lines.len(), 4, "lines: {lines:?}");
    assert!(
        lines
            .iter()
            .any(|l| l.starts_with("trainer: child 4001 (transformer1) status unknown: ECHILD"))
    );

    Ok(())
}

#[tokio::test]
async fn single_stage_pipeline_needs_no_pipes() -> TestResult {
    use trainer_test_utils::builders::StageConfigBuilder;

    let topology = PipelineConfigBuilder::new()
        .with_stage(StageConfigBuilder::new("only", "cat").build())
        .topology("in.csv");

    let backend = FakeBackend::new();
    let log = backend.log();
    let mut orchestrator = Orchestrator::new(backend, topology).with_diagnostics(SharedBuffer::new());

    let report = with_timeout(orchestrator.run()).await?;

    assert_eq!(log.pipes_created(), 0);
    assert!(log.closed_fds().is_empty());
    assert_eq!(log.spawns(), vec![("only".to_string(), None, None)]);
    assert!(report.all_succeeded());

    Ok(())
}
