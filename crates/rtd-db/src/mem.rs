//! In-memory [`DomainStore`].
//!
//! Each operation runs under one mutex, which gives the same per-record
//! atomicity the Postgres store gets from row locks. Used by tests and by the
//! daemon when no database is configured.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rtd_schemas::{lock_sentinel, NewRuntimeDomain, RuntimeDomain};
use uuid::Uuid;

use crate::store::{DomainFilter, DomainPatch, DomainStore};

#[derive(Default)]
pub struct MemDomainStore {
    rows: Mutex<BTreeMap<Uuid, RuntimeDomain>>,
}

impl MemDomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> Result<MutexGuard<'_, BTreeMap<Uuid, RuntimeDomain>>> {
        self.rows
            .lock()
            .map_err(|_| anyhow!("in-memory domain store mutex poisoned"))
    }

    /// Insert a fully-formed record, bypassing id/timestamp assignment.
    /// Lets tests stage states (e.g. a stale lease) that the reconciler
    /// would only produce after a crash.
    pub fn put(&self, record: RuntimeDomain) -> Result<()> {
        self.rows()?.insert(record.id, record);
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<RuntimeDomain>> {
        Ok(self.rows()?.get(&id).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.rows()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn sorted_by_creation<'a>(
    rows: impl Iterator<Item = &'a RuntimeDomain>,
) -> Vec<&'a RuntimeDomain> {
    let mut v: Vec<&RuntimeDomain> = rows.collect();
    v.sort_by(|a, b| (a.created_at_utc, a.id).cmp(&(b.created_at_utc, b.id)));
    v
}

#[async_trait]
impl DomainStore for MemDomainStore {
    async fn claim_one(
        &self,
        filter: &DomainFilter,
        locked_at: DateTime<Utc>,
    ) -> Result<Option<RuntimeDomain>> {
        let mut rows = self.rows()?;
        let target = rows
            .values()
            .filter(|d| filter.matches(d))
            .min_by_key(|d| (d.locked_at, d.id))
            .map(|d| d.id);

        let Some(id) = target else {
            return Ok(None);
        };
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        let prior = row.clone();
        row.locked_at = locked_at;
        Ok(Some(prior))
    }

    async fn update_one(&self, filter: &DomainFilter, patch: &DomainPatch) -> Result<u64> {
        let mut rows = self.rows()?;
        let target = sorted_by_creation(rows.values().filter(|d| filter.matches(d)))
            .first()
            .map(|d| d.id);

        let Some(row) = target.and_then(|id| rows.get_mut(&id)) else {
            return Ok(0);
        };
        if patch.apply(row) {
            row.updated_at_utc = Utc::now();
            return Ok(1);
        }
        Ok(0)
    }

    async fn update_many(&self, filter: &DomainFilter, patch: &DomainPatch) -> Result<u64> {
        let mut rows = self.rows()?;
        let now = Utc::now();
        let mut modified = 0;
        for row in rows.values_mut().filter(|d| filter.matches(d)) {
            if patch.apply(row) {
                row.updated_at_utc = now;
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn delete_many(&self, filter: &DomainFilter) -> Result<u64> {
        let mut rows = self.rows()?;
        let before = rows.len();
        rows.retain(|_, d| !filter.matches(d));
        Ok((before - rows.len()) as u64)
    }

    async fn insert(&self, new: &NewRuntimeDomain) -> Result<RuntimeDomain> {
        let mut rows = self.rows()?;
        if rows.values().any(|d| d.domain == new.domain) {
            bail!("domain '{}' already bound", new.domain);
        }
        let now = Utc::now();
        let record = RuntimeDomain {
            id: Uuid::new_v4(),
            app_id: new.app_id.clone(),
            domain: new.domain.clone(),
            state: new.state,
            phase: new.phase,
            locked_at: lock_sentinel(),
            created_at_utc: now,
            updated_at_utc: now,
        };
        rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list(&self, filter: &DomainFilter) -> Result<Vec<RuntimeDomain>> {
        let rows = self.rows()?;
        Ok(sorted_by_creation(rows.values().filter(|d| filter.matches(d)))
            .into_iter()
            .cloned()
            .collect())
    }
}
