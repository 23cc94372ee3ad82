//! Domain Store contract.
//!
//! The reconciler never holds an in-process lock; every cross-replica
//! guarantee comes from the four operations below being atomic per record.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rtd_schemas::{DomainPhase, DomainState, NewRuntimeDomain, RuntimeDomain};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// DomainFilter
// ---------------------------------------------------------------------------

/// Conjunction of optional predicates over a [`RuntimeDomain`].
/// An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainFilter {
    pub id: Option<Uuid>,
    pub app_id: Option<String>,
    pub state: Option<DomainState>,
    pub phase: Option<DomainPhase>,
    /// Strict: `locked_at < t`.
    pub locked_before: Option<DateTime<Utc>>,
}

impl DomainFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn state(mut self, state: DomainState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn phase(mut self, phase: DomainPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn locked_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.locked_before = Some(cutoff);
        self
    }

    pub fn matches(&self, d: &RuntimeDomain) -> bool {
        self.id.map_or(true, |id| d.id == id)
            && self.app_id.as_deref().map_or(true, |a| d.app_id == a)
            && self.state.map_or(true, |s| d.state == s)
            && self.phase.map_or(true, |p| d.phase == p)
            && self.locked_before.map_or(true, |t| d.locked_at < t)
    }
}

// ---------------------------------------------------------------------------
// DomainPatch
// ---------------------------------------------------------------------------

/// The reconciler-owned fields an update may set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainPatch {
    pub phase: Option<DomainPhase>,
    pub locked_at: Option<DateTime<Utc>>,
}

impl DomainPatch {
    pub fn phase(mut self, phase: DomainPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn locked_at(mut self, at: DateTime<Utc>) -> Self {
        self.locked_at = Some(at);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.phase.is_none() && self.locked_at.is_none()
    }

    /// True when applying the patch would change `d`.
    pub fn changes(&self, d: &RuntimeDomain) -> bool {
        self.phase.is_some_and(|p| p != d.phase) || self.locked_at.is_some_and(|t| t != d.locked_at)
    }

    /// Apply in place; returns whether anything changed.
    pub fn apply(&self, d: &mut RuntimeDomain) -> bool {
        if !self.changes(d) {
            return false;
        }
        if let Some(p) = self.phase {
            d.phase = p;
        }
        if let Some(t) = self.locked_at {
            d.locked_at = t;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// DomainStore
// ---------------------------------------------------------------------------

/// Persistent collection of runtime domains.
///
/// Counts returned by `update_*` are MODIFIED counts: a record that matches
/// the filter but already holds every patched value is not counted. This is
/// what makes a repeated bulk sync observable as a no-op.
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Atomically pick one record matching `filter`, set its `locked_at`, and
    /// return the record as it was before the update. Records with the
    /// oldest lease are preferred.
    async fn claim_one(
        &self,
        filter: &DomainFilter,
        locked_at: DateTime<Utc>,
    ) -> Result<Option<RuntimeDomain>>;

    /// Update at most one matching record.
    async fn update_one(&self, filter: &DomainFilter, patch: &DomainPatch) -> Result<u64>;

    async fn update_many(&self, filter: &DomainFilter, patch: &DomainPatch) -> Result<u64>;

    async fn delete_many(&self, filter: &DomainFilter) -> Result<u64>;

    /// Create a record (external actors; never called by reconciliation).
    async fn insert(&self, new: &NewRuntimeDomain) -> Result<RuntimeDomain>;

    /// Matching records ordered by creation time.
    async fn list(&self, filter: &DomainFilter) -> Result<Vec<RuntimeDomain>>;
}
