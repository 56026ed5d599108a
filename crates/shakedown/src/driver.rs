//! The fault-injection test driver.
//!
//! For each scenario the driver populates the account with random content,
//! waits until all replicas are distributed, injects one or more disk
//! failures, blocks on convergence, and finally restores the fleet to its
//! baseline — whether or not the scenario body succeeded.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use metrics::counter;
use shakedown_core::config::Config;
use shakedown_fleet::{Fleet, FleetNode, Role};
use shakedown_restore::{build_restorer, StateRestorer};
use shakedown_verify::{ConvergenceOpts, ReplicaVerifier, StorageApi, VerifyError};
use tracing::{error, info, warn};

/// Containers created per scenario.
const CONTAINER_COUNT: usize = 5;
/// Objects uploaded per container.
const OBJECTS_PER_CONTAINER: usize = 5;

/// Every scenario the driver knows, in execution order.
pub const SCENARIOS: &[&str] = &[
    "one-disk-down",
    "two-disks-down",
    "one-disk-down-restore",
    "disk-replacement",
    "two-disks-down-third-later",
];

/// How one scenario ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The cluster converged as required.
    Passed,
    /// The cluster failed the test (e.g. convergence timed out).
    Failed(String),
    /// The harness itself hit an error; the result says nothing about the
    /// cluster.
    Error(String),
    /// The fleet does not meet the scenario's requirements.
    Skipped(String),
}

/// The result of one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario name.
    pub name: String,
    /// How it ended.
    pub outcome: Outcome,
}

/// Results of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Per-scenario results, in execution order.
    pub results: Vec<ScenarioResult>,
}

impl RunSummary {
    /// Whether every non-skipped scenario passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r.outcome, Outcome::Passed | Outcome::Skipped(_)))
    }

    /// Number of scenarios that failed or hit a harness error.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_) | Outcome::Error(_)))
            .count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            let (verdict, detail) = match &result.outcome {
                Outcome::Passed => ("PASS", String::new()),
                Outcome::Failed(reason) => ("FAIL", format!(" ({reason})")),
                Outcome::Error(reason) => ("ERROR", format!(" ({reason})")),
                Outcome::Skipped(reason) => ("SKIP", format!(" ({reason})")),
            };
            writeln!(f, "{verdict:>5}  {}{detail}", result.name)?;
        }
        Ok(())
    }
}

/// Drives scenarios against a fleet.
pub struct Driver {
    fleet: Arc<Fleet>,
    restorer: Box<dyn StateRestorer>,
    verifier: ReplicaVerifier,
    config: Config,
}

impl Driver {
    /// Builds the whole harness from configuration: connects the fleet,
    /// applies the one-time disk normalization, and selects the restoration
    /// strategy.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let mut fleet = Fleet::connect(&config.nodes).context("building fleet")?;
        fleet
            .normalize_single_disks()
            .await
            .context("normalizing single-disk data nodes")?;
        let fleet = Arc::new(fleet);

        let storage = StorageApi::new(&config.storage);
        let verifier =
            ReplicaVerifier::new(&fleet, storage, config.service.clone(), &config.storage)
                .context("building verifier")?;
        let restorer = build_restorer(&config.management, &config.service, Arc::clone(&fleet))
            .context("selecting restoration backend")?;

        Ok(Self { fleet, restorer, verifier, config })
    }

    /// Builds a driver from pre-assembled parts. Used by tests to inject
    /// scripted fleets and mock endpoints.
    #[must_use]
    pub fn with_parts(
        fleet: Arc<Fleet>,
        restorer: Box<dyn StateRestorer>,
        verifier: ReplicaVerifier,
        config: Config,
    ) -> Self {
        Self { fleet, restorer, verifier, config }
    }

    /// The restoration strategy in use.
    #[must_use]
    pub fn restorer(&self) -> &dyn StateRestorer {
        self.restorer.as_ref()
    }

    /// Runs all scenarios (or the one matching `filter`), capturing the
    /// baseline first and restoring it after every scenario.
    pub async fn run(&self, filter: Option<&str>) -> anyhow::Result<RunSummary> {
        let names: Vec<&str> = SCENARIOS
            .iter()
            .copied()
            .filter(|name| filter.map_or(true, |f| f == *name))
            .collect();
        if names.is_empty() {
            anyhow::bail!(
                "no scenario matches '{}'; known scenarios: {}",
                filter.unwrap_or_default(),
                SCENARIOS.join(", ")
            );
        }

        self.restorer.save("").await.context("capturing fleet baseline")?;

        let mut summary = RunSummary::default();
        for name in names {
            let outcome = self.run_one(name).await;
            match &outcome {
                Outcome::Passed => counter!("shakedown_scenarios_passed").increment(1),
                Outcome::Failed(_) | Outcome::Error(_) => {
                    counter!("shakedown_scenarios_failed").increment(1);
                }
                Outcome::Skipped(_) => counter!("shakedown_scenarios_skipped").increment(1),
            }
            summary.results.push(ScenarioResult { name: name.to_string(), outcome });
        }
        Ok(summary)
    }

    async fn run_one(&self, name: &str) -> Outcome {
        if let Some(reason) = self.skip_reason(name) {
            info!(scenario = name, reason = %reason, "skipping scenario");
            return Outcome::Skipped(reason);
        }

        info!(scenario = name, "running scenario");
        let body = self.scenario_body(name).await;

        // The baseline comes back no matter how the body went; a scenario
        // that wrecked the cluster must not taint the next one.
        let load = self.restorer.load("").await;

        match (body, load) {
            (Ok(()), Ok(())) => Outcome::Passed,
            (Ok(()), Err(err)) => {
                error!(scenario = name, error = %err, "baseline restore failed");
                Outcome::Error(format!("baseline restore failed: {err}"))
            }
            (Err(err), load) => {
                if let Err(load_err) = load {
                    error!(
                        scenario = name,
                        error = %load_err,
                        "baseline restore failed after scenario failure"
                    );
                }
                match err.downcast_ref::<VerifyError>() {
                    Some(VerifyError::ConsistencyTimeout { .. }) => {
                        warn!(scenario = name, error = %err, "scenario failed");
                        Outcome::Failed(err.to_string())
                    }
                    _ => {
                        error!(scenario = name, error = %err, "harness error");
                        Outcome::Error(err.to_string())
                    }
                }
            }
        }
    }

    /// Why a scenario cannot run on this fleet, if it cannot.
    fn skip_reason(&self, name: &str) -> Option<String> {
        let data = self.fleet.with_role(Role::StorageData);
        let total_disks: usize = data.iter().map(|n| n.node.disks.len()).sum();
        let replica_count = self.config.storage.replica_count;

        match name {
            "two-disks-down" | "two-disks-down-third-later" => {
                if data.len() < 2 || total_disks < 6 {
                    return Some(format!(
                        "needs 2 data nodes with 6 disks, have {} with {}",
                        data.len(),
                        total_disks
                    ));
                }
            }
            _ => {
                if data.is_empty() || total_disks < replica_count + 1 {
                    return Some(format!(
                        "needs a data node and {} disks, have {} with {}",
                        replica_count + 1,
                        data.len(),
                        total_disks
                    ));
                }
            }
        }
        None
    }

    async fn scenario_body(&self, name: &str) -> anyhow::Result<()> {
        let data = self.fleet.with_role(Role::StorageData);
        let replica_count = self.config.storage.replica_count;
        let deadline = self.config.storage.convergence_timeout();
        let handoff_deadline = self.config.storage.handoff_timeout();

        self.verifier
            .storage()
            .populate("", CONTAINER_COUNT, OBJECTS_PER_CONTAINER)
            .await?;
        // Make sure all replicas are distributed before killing anything.
        self.verifier
            .wait_for_convergence(&ConvergenceOpts::regeneration(replica_count, deadline))
            .await?;

        match name {
            "one-disk-down" => {
                data[0].kill_disk(None).await?;
                self.converge(replica_count, deadline).await
            }
            "two-disks-down" => {
                data[0].kill_disk(None).await?;
                data[1].kill_disk(None).await?;
                self.converge(replica_count, deadline).await
            }
            "one-disk-down-restore" => {
                let disk = data[0].kill_disk(None).await?;
                self.converge(replica_count, deadline).await?;
                data[0].restore_disk(&disk, &self.config.service).await?;
                self.confirm_repair(replica_count, deadline, handoff_deadline).await
            }
            "disk-replacement" => {
                let disk = data[0].kill_disk(None).await?;
                self.converge(replica_count, deadline).await?;
                // The disk "died"; swap in an empty replacement.
                data[0].format_disk(&disk).await?;
                data[0].restore_disk(&disk, &self.config.service).await?;
                self.confirm_repair(replica_count, deadline, handoff_deadline).await
            }
            "two-disks-down-third-later" => {
                data[0].kill_disk(None).await?;
                data[1].kill_disk(None).await?;
                self.converge(replica_count, deadline).await?;
                data[0].kill_disk(None).await?;
                self.converge(replica_count, deadline).await
            }
            other => anyhow::bail!("unknown scenario '{other}'"),
        }
    }

    async fn converge(
        &self,
        replica_count: usize,
        deadline: std::time::Duration,
    ) -> anyhow::Result<()> {
        self.verifier
            .wait_for_convergence(&ConvergenceOpts::regeneration(replica_count, deadline))
            .await?;
        Ok(())
    }

    /// After a disk comes back: replicas must return to the primary nodes,
    /// and the temporary handoff copies must be cleaned up. Cleanup gets
    /// its own, independently configured deadline.
    async fn confirm_repair(
        &self,
        replica_count: usize,
        deadline: std::time::Duration,
        handoff_deadline: std::time::Duration,
    ) -> anyhow::Result<()> {
        self.verifier
            .wait_for_convergence(&ConvergenceOpts::primaries_only(replica_count, deadline))
            .await?;
        self.verifier
            .wait_for_convergence(&ConvergenceOpts::exact(replica_count, handoff_deadline))
            .await?;
        Ok(())
    }

    /// One-shot consistency check, for `shakedown check`.
    pub async fn check(&self, exact: bool) -> anyhow::Result<bool> {
        let replica_count = self.config.storage.replica_count;
        Ok(self.verifier.all_replicas_healthy(replica_count, None, exact).await?)
    }

    /// Nodes carrying the data role, for tests and diagnostics.
    #[must_use]
    pub fn data_nodes(&self) -> Vec<&FleetNode> {
        self.fleet.with_role(Role::StorageData)
    }
}
