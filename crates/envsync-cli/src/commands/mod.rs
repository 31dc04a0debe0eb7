pub mod plan;
pub mod reconcile;
pub mod remove;
pub mod show;
pub mod token;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use envsync_core::{EnvVars, TargetId};
use envsync_reconcile::{ChainRunner, ExecutionChain, ExecutorRegistry, PassReport, ReconcileError, ReconcileLedger};
use envsync_remote_memory::InMemoryRemote;
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::AppConfig;

/// Loaded state a command operates on.
pub struct Workspace {
    pub config: AppConfig,
    pub remote: Arc<InMemoryRemote>,
    pub ledger: Arc<ReconcileLedger>,
    registry: ExecutorRegistry,
}

impl Workspace {
    /// Loads the state file and ledger. Configured targets missing from the
    /// state file are provisioned empty.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let remote = InMemoryRemote::load_snapshot(&config.state_file, config.remote.options())
            .await
            .with_context(|| format!("Failed to load state file {}", config.state_file.display()))?;

        for target in &config.targets {
            let id = target.target_id().map_err(anyhow::Error::msg)?;
            if remote.record(&id).is_none() {
                debug!(target = %id, "Provisioning target in local state");
                remote.create_target(id, EnvVars::new());
            }
        }

        let ledger_file = config.ledger_file();
        let ledger = ReconcileLedger::load(&ledger_file)
            .await
            .with_context(|| format!("Failed to load ledger {}", ledger_file.display()))?;

        let remote = Arc::new(remote);
        let registry = ExecutorRegistry::new(remote.clone(), config.reconcile.retry.clone());

        Ok(Self {
            config,
            remote,
            ledger: Arc::new(ledger),
            registry,
        })
    }

    fn scope_of(&self, target: &TargetId) -> String {
        self.config
            .target(target.as_str())
            .and_then(|t| t.scope.clone())
            .unwrap_or_else(|| self.config.reconcile.default_scope.clone())
    }

    /// Runs `chains`, one executor per scope, every target concurrently.
    pub async fn run(&self, chains: Vec<ExecutionChain>) -> PassReport {
        let mut by_scope: BTreeMap<String, Vec<ExecutionChain>> = BTreeMap::new();
        for chain in chains {
            by_scope.entry(self.scope_of(chain.target_id())).or_default().push(chain);
        }

        let mut tasks = JoinSet::new();
        for (scope, chains) in by_scope {
            let runner = ChainRunner::new(
                self.registry.get_or_create(&scope),
                self.ledger.clone(),
                &self.config.reconcile,
            );
            tasks.spawn(async move { runner.run_pass(chains).await });
        }

        let mut pass = PassReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    pass.chains.extend(report.chains);
                    pass.errors.extend(report.errors);
                }
                Err(e) => pass.errors.push(ReconcileError::Chain {
                    target: "*".to_string(),
                    message: e.to_string(),
                }),
            }
        }
        pass.chains.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        pass
    }

    /// Writes the state file and ledger back to disk.
    pub async fn persist(&self) -> Result<()> {
        self.remote
            .save_snapshot(&self.config.state_file)
            .await
            .with_context(|| format!("Failed to save state file {}", self.config.state_file.display()))?;
        let ledger_file = self.config.ledger_file();
        self.ledger
            .save(&ledger_file)
            .await
            .with_context(|| format!("Failed to save ledger {}", ledger_file.display()))?;
        Ok(())
    }
}

/// Turns a pass with failures into an error so the process exits non-zero.
pub fn ensure_success(report: &PassReport) -> Result<()> {
    let failed = report.failures().len();
    if failed > 0 {
        anyhow::bail!("{failed} unit(s) failed");
    }
    Ok(())
}
