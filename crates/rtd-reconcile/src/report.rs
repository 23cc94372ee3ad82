//! What a tick did, step by step.
//!
//! Reports are plain data: the daemon keeps the last one for `/v1/status`
//! and streams each over SSE, the CLI prints it as JSON.

use chrono::{DateTime, Utc};
use rtd_schemas::DomainPhase;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CreatingPhase,
    DeletingPhase,
    ActiveState,
    InactiveState,
    DeletedState,
    TimeoutLocks,
}

impl Step {
    /// Execution order within one tick.
    pub const ORDER: [Step; 6] = [
        Step::CreatingPhase,
        Step::DeletingPhase,
        Step::ActiveState,
        Step::InactiveState,
        Step::DeletedState,
        Step::TimeoutLocks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::CreatingPhase => "creating_phase",
            Step::DeletingPhase => "deleting_phase",
            Step::ActiveState => "active_state",
            Step::InactiveState => "inactive_state",
            Step::DeletedState => "deleted_state",
            Step::TimeoutLocks => "timeout_locks",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Nothing was claimable.
    Idle,
    /// A claimed record moved to its next phase and its lease was released.
    Advanced {
        domain_id: Uuid,
        app_id: String,
        domain: String,
        to: DomainPhase,
    },
    /// The gateway call succeeded but another writer moved the phase first.
    RaceLost { domain_id: Uuid },
    /// No region for the app; the lease is held until it expires.
    RegionMissing { domain_id: Uuid, app_id: String },
    /// Gateway call failed; the lease is held until it expires.
    GatewayFailed { domain_id: Uuid, error: String },
    /// Bulk desired-state sync.
    Synced { modified: u64, deleted: u64 },
    /// Expired leases reset to the sentinel.
    Swept { released: u64 },
    /// The step errored (store unavailable, lookup failure).
    Failed { error: String },
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StepOutcome::Failed { .. }
                | StepOutcome::GatewayFailed { .. }
                | StepOutcome::RegionMissing { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: Step,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// True when the reconciler was disabled; `steps` is then empty.
    pub skipped: bool,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
}

impl TickReport {
    pub fn skipped(started_at: DateTime<Utc>) -> Self {
        Self {
            skipped: true,
            started_at,
            steps: Vec::new(),
        }
    }

    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .map(|s| &s.outcome)
    }

    /// Number of phase advances (at most two per tick).
    pub fn advanced(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Advanced { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.outcome.is_failure())
    }

    /// First error message of the tick, if any step failed.
    pub fn first_error(&self) -> Option<String> {
        self.failures().next().map(|s| match &s.outcome {
            StepOutcome::Failed { error } | StepOutcome::GatewayFailed { error, .. } => {
                format!("{}: {}", s.step.as_str(), error)
            }
            StepOutcome::RegionMissing { app_id, .. } => {
                format!("{}: no region for app '{}'", s.step.as_str(), app_id)
            }
            _ => s.step.as_str().to_string(),
        })
    }
}
