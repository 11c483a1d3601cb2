use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

/// Default number of runs kept in memory
pub const DEFAULT_MAX_RUNS: usize = 50;

/// Progress of a provisioning run. Stages are passed strictly in order.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Received,
    Validated,
    Resolved,
    Cloned,
    Materialized,
    Templated,
    Committed,
    PipelinesRegistered,
    Done,
}

/// How a run ended
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    InProgress,
    Provisioned,
    Skipped,
    Failed,
}

/// Record of one webhook invocation
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningRun {
    pub id: String,
    pub repository_name: Option<String>,
    pub template_repository: Option<String>,
    pub stage: RunStage,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub commit_id: Option<String>,
    pub pipelines: Vec<String>,
    pub message: Option<String>,
}

impl ProvisioningRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            repository_name: None,
            template_repository: None,
            stage: RunStage::Received,
            outcome: RunOutcome::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            commit_id: None,
            pipelines: Vec::new(),
            message: None,
        }
    }

    pub fn advance(&mut self, stage: RunStage) {
        debug_assert!(stage >= self.stage, "run stages only move forward");
        self.stage = stage;
    }

    /// Mark the run as provisioned
    pub fn mark_done(&mut self) {
        self.stage = RunStage::Done;
        self.outcome = RunOutcome::Provisioned;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the run as a no-op with the reason it was skipped
    pub fn mark_skipped(&mut self, reason: String) {
        self.outcome = RunOutcome::Skipped;
        self.completed_at = Some(Utc::now());
        self.message = Some(reason);
    }

    /// Mark the run as failed with error
    pub fn mark_failed(&mut self, error: String) {
        self.outcome = RunOutcome::Failed;
        self.completed_at = Some(Utc::now());
        self.message = Some(error);
    }
}

impl Default for ProvisioningRun {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded history of recent runs, newest first
#[derive(Debug)]
pub struct RunStore {
    runs: VecDeque<ProvisioningRun>,
    max_runs: usize,
}

impl RunStore {
    pub fn new(max_runs: usize) -> Self {
        Self {
            runs: VecDeque::with_capacity(max_runs),
            max_runs: max_runs.max(1),
        }
    }

    pub fn add_run(&mut self, run: ProvisioningRun) {
        self.runs.push_front(run);
        self.runs.truncate(self.max_runs);
    }

    /// Replace the stored run with the same id. A run that was already
    /// evicted is added again as the newest.
    pub fn update_run(&mut self, run: ProvisioningRun) {
        match self.runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = run,
            None => self.add_run(run),
        }
    }

    pub fn get_run(&self, id: &str) -> Option<&ProvisioningRun> {
        self.runs.iter().find(|r| r.id == id)
    }

    pub fn get_recent_runs(&self, limit: usize) -> Vec<ProvisioningRun> {
        self.runs.iter().take(limit).cloned().collect()
    }

    pub fn count_by_outcome(&self, outcome: RunOutcome) -> usize {
        self.runs.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
