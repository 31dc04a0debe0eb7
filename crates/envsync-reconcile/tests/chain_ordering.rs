use std::sync::Arc;
use std::time::Duration;

use envsync_core::{DeclaredConfiguration, EnvVars, Operation, TargetId};
use envsync_reconcile::{
    ChainRunner, ChainScheduler, DesiredTarget, ExecutionChain, ReconcileConfig, ReconcileExecutor,
    ReconcileLedger, UnitState, plan_pass,
};
use envsync_remote::{RecordingRemote, TraceKind, TraceOutcome};
use envsync_remote_memory::{InMemoryRemote, RemoteOptions};
use serde_json::json;
use tokio::time::Instant;

fn target(id: &str) -> TargetId {
    TargetId::new(id).unwrap()
}

fn vars(pairs: &[(&str, &str)]) -> EnvVars {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn declared(memory: u32) -> DeclaredConfiguration {
    DeclaredConfiguration::from_value(json!({"FunctionName": "F", "MemorySize": memory}))
}

fn xy_chain(id: &str) -> ExecutionChain {
    ChainScheduler::new(target(id), declared(128))
        .build_chain([("X", "1"), ("Y", "2")], Operation::Apply)
        .unwrap()
}

struct Harness {
    memory: Arc<InMemoryRemote>,
    remote: Arc<RecordingRemote<Arc<InMemoryRemote>>>,
    runner: ChainRunner,
}

impl Harness {
    fn new(targets: &[&str], options: RemoteOptions, config: ReconcileConfig) -> Self {
        let mut memory = InMemoryRemote::with_options(options);
        for id in targets {
            memory = memory.with_target(target(id), EnvVars::new());
        }
        let memory = Arc::new(memory);
        let remote = Arc::new(RecordingRemote::new(memory.clone()));
        let executor = Arc::new(ReconcileExecutor::new(remote.clone(), config.retry.clone()));
        let runner = ChainRunner::new(executor, Arc::new(ReconcileLedger::new()), &config);
        Self {
            memory,
            remote,
            runner,
        }
    }

    fn default_for(targets: &[&str]) -> Self {
        Self::new(targets, RemoteOptions::default(), ReconcileConfig::default())
    }
}

fn slow_remote() -> RemoteOptions {
    RemoteOptions {
        update_latency: Duration::from_secs(5),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn second_unit_starts_only_after_first_completes() {
    let h = Harness::new(&["F"], slow_remote(), ReconcileConfig::default());

    let report = h.runner.run_chain(&xy_chain("F")).await;

    assert!(report.is_success());
    assert_eq!(h.memory.snapshot(&target("F")).unwrap(), vars(&[("X", "1"), ("Y", "2")]));

    let events = h.remote.trace().events();
    // X: fetch, write(ok). Only then does Y fetch.
    assert_eq!(events[3].kind, TraceKind::WriteFinished);
    assert_eq!(events[3].outcome, Some(TraceOutcome::Ok));
    assert_eq!(events[4].kind, TraceKind::FetchStarted);
    assert!(events[2].writes_key("X"));
    assert!(!events[2].writes_key("Y"));

    // Y's first write lands inside X's update window and is retried once.
    assert_eq!(report.units[1].attempts, 2);
    let last_write = h.remote.trace().of_kind(TraceKind::WriteStarted).pop().unwrap();
    assert_eq!(last_write.vars.unwrap(), vars(&[("X", "1"), ("Y", "2")]));
}

#[tokio::test(start_paused = true)]
async fn targets_run_concurrently() {
    let h = Harness::new(&["F", "G"], slow_remote(), ReconcileConfig::default());

    let start = Instant::now();
    let pass = h.runner.run_pass(vec![xy_chain("F"), xy_chain("G")]).await;

    assert!(pass.is_success());
    assert_eq!(pass.count(UnitState::Succeeded), 4);
    // Each chain needs one 10s backoff; run one after another they would take 20s.
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert_eq!(h.memory.snapshot(&target("G")).unwrap(), vars(&[("X", "1"), ("Y", "2")]));
}

#[tokio::test]
async fn unchanged_declaration_is_skipped_until_token_changes() {
    let h = Harness::default_for(&["F"]);
    let scheduler = ChainScheduler::new(target("F"), declared(128));
    let chain = scheduler.build_chain([("X", "1")], Operation::Apply).unwrap();

    h.runner.run_chain(&chain).await;
    // The owner redeploys the target and wipes its variables.
    h.memory.wipe(&target("F"));

    let report = h.runner.run_chain(&chain).await;
    assert_eq!(report.units[0].state, UnitState::Skipped);
    assert!(h.memory.snapshot(&target("F")).unwrap().is_empty());

    // The redeploy changed the declared configuration, so the token moves
    // and the unit runs again.
    let redeclared = ChainScheduler::new(target("F"), declared(256))
        .build_chain([("X", "1")], Operation::Apply)
        .unwrap();
    assert_ne!(redeclared.staleness_token(), chain.staleness_token());

    let report = h.runner.run_chain(&redeclared).await;
    assert_eq!(report.units[0].state, UnitState::Succeeded);
    assert_eq!(h.memory.snapshot(&target("F")).unwrap(), vars(&[("X", "1")]));
}

#[tokio::test]
async fn forced_rerun_is_idempotent() {
    let config = ReconcileConfig {
        force: true,
        ..ReconcileConfig::default()
    };
    let h = Harness::new(&["F"], RemoteOptions::default(), config);
    let chain = xy_chain("F");

    h.runner.run_chain(&chain).await;
    let first = h.memory.snapshot(&target("F")).unwrap();
    let report = h.runner.run_chain(&chain).await;

    assert_eq!(report.count(UnitState::Succeeded), 2);
    assert_eq!(h.memory.snapshot(&target("F")).unwrap(), first);
    assert_eq!(h.memory.writes_committed(), 4);
}

#[tokio::test]
async fn renamed_key_is_applied_then_old_key_removed() {
    let h = Harness::default_for(&["F"]);
    h.memory.overwrite(&target("F"), vars(&[("KEEP", "k")]));

    let first = vec![DesiredTarget::new(target("F"), declared(128)).with_variable("OLD", "v")];
    let chains = plan_pass(&first, h.runner.ledger()).unwrap();
    assert!(h.runner.run_pass(chains).await.is_success());

    let second = vec![DesiredTarget::new(target("F"), declared(128)).with_variable("NEW", "v")];
    let chains = plan_pass(&second, h.runner.ledger()).unwrap();
    assert_eq!(chains.len(), 2);
    let pass = h.runner.run_pass(chains).await;

    assert!(pass.is_success());
    let report = pass.chain(&target("F")).unwrap();
    let done: Vec<(&str, Operation)> = report.units.iter().map(|u| (u.key.as_str(), u.operation)).collect();
    assert_eq!(done, vec![("NEW", Operation::Apply), ("OLD", Operation::Remove)]);
    assert_eq!(h.memory.snapshot(&target("F")).unwrap(), vars(&[("KEEP", "k"), ("NEW", "v")]));
    assert_eq!(h.runner.ledger().keys_for(&target("F")), vec!["NEW"]);
}

#[tokio::test]
async fn failures_on_one_target_do_not_affect_another() {
    let h = Harness::default_for(&["F"]);

    let pass = h.runner.run_pass(vec![xy_chain("F"), xy_chain("MISSING")]).await;

    assert!(!pass.is_success());
    assert!(pass.chain(&target("F")).unwrap().is_success());
    let missing = pass.chain(&target("MISSING")).unwrap();
    assert_eq!(missing.count(UnitState::Failed), 2);
    assert_eq!(pass.failures().len(), 2);
    assert!(pass.failures().iter().all(|e| e.target() == Some("MISSING")));
}
