//! Store wrapper that simulates unavailability per operation.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rtd_db::{DomainFilter, DomainPatch, DomainStore};
use rtd_schemas::{NewRuntimeDomain, RuntimeDomain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreOp {
    Claim,
    UpdateOne,
    UpdateMany,
    DeleteMany,
    Insert,
    List,
}

impl StoreOp {
    pub const ALL: [StoreOp; 6] = [
        StoreOp::Claim,
        StoreOp::UpdateOne,
        StoreOp::UpdateMany,
        StoreOp::DeleteMany,
        StoreOp::Insert,
        StoreOp::List,
    ];
}

pub struct OutageStore {
    inner: Arc<dyn DomainStore>,
    failing: Mutex<BTreeSet<StoreOp>>,
}

impl OutageStore {
    pub fn new(inner: Arc<dyn DomainStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn fail(&self, ops: &[StoreOp]) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(ops.iter().copied());
    }

    pub fn fail_all(&self) {
        self.fail(&StoreOp::ALL);
    }

    pub fn restore(&self) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn check(&self, op: StoreOp) -> Result<()> {
        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&op)
        {
            bail!("store unavailable ({op:?})");
        }
        Ok(())
    }
}

#[async_trait]
impl DomainStore for OutageStore {
    async fn claim_one(
        &self,
        filter: &DomainFilter,
        locked_at: DateTime<Utc>,
    ) -> Result<Option<RuntimeDomain>> {
        self.check(StoreOp::Claim)?;
        self.inner.claim_one(filter, locked_at).await
    }

    async fn update_one(&self, filter: &DomainFilter, patch: &DomainPatch) -> Result<u64> {
        self.check(StoreOp::UpdateOne)?;
        self.inner.update_one(filter, patch).await
    }

    async fn update_many(&self, filter: &DomainFilter, patch: &DomainPatch) -> Result<u64> {
        self.check(StoreOp::UpdateMany)?;
        self.inner.update_many(filter, patch).await
    }

    async fn delete_many(&self, filter: &DomainFilter) -> Result<u64> {
        self.check(StoreOp::DeleteMany)?;
        self.inner.delete_many(filter).await
    }

    async fn insert(&self, new: &NewRuntimeDomain) -> Result<RuntimeDomain> {
        self.check(StoreOp::Insert)?;
        self.inner.insert(new).await
    }

    async fn list(&self, filter: &DomainFilter) -> Result<Vec<RuntimeDomain>> {
        self.check(StoreOp::List)?;
        self.inner.list(filter).await
    }
}
