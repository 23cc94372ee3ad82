//! One reconciler wired to in-memory fakes.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Duration;
use rtd_db::{DomainStore, MemDomainStore};
use rtd_reconcile::{Reconciler, ReconcilerSettings, TickReport};
use rtd_schemas::{DomainPhase, DomainState, NewRuntimeDomain, RuntimeDomain};
use uuid::Uuid;

use crate::clock::ManualClock;
use crate::fakes::{test_region, FakeGateway, FakeRegions};

pub struct Harness {
    pub store: Arc<MemDomainStore>,
    pub gateway: Arc<FakeGateway>,
    pub regions: Arc<FakeRegions>,
    pub clock: Arc<ManualClock>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    /// Every app resolves to region "test"; gateway calls succeed.
    pub fn new() -> Self {
        Self::with_regions(FakeRegions::serving_all(test_region("test")))
    }

    pub fn with_regions(regions: FakeRegions) -> Self {
        let store = Arc::new(MemDomainStore::new());
        let gateway = Arc::new(FakeGateway::new());
        let regions = Arc::new(regions);
        let clock = Arc::new(ManualClock::fixed());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            gateway.clone(),
            regions.clone(),
            clock.clone(),
            ReconcilerSettings::default(),
        ));
        Self {
            store,
            gateway,
            regions,
            clock,
            reconciler,
        }
    }

    /// A second reconciler instance sharing this harness's store, regions
    /// and clock but calling `gateway`.
    pub fn replica(&self, gateway: Arc<FakeGateway>) -> Arc<Reconciler> {
        self.replica_over(self.store.clone(), gateway)
    }

    /// A reconciler over an arbitrary store (e.g. an `OutageStore`).
    pub fn replica_over(
        &self,
        store: Arc<dyn DomainStore>,
        gateway: Arc<FakeGateway>,
    ) -> Arc<Reconciler> {
        Arc::new(Reconciler::new(
            store,
            gateway,
            self.regions.clone(),
            self.clock.clone(),
            ReconcilerSettings::default(),
        ))
    }

    pub fn lock_timeout(&self) -> Duration {
        self.reconciler.lock_timeout()
    }

    /// Move the clock past the lock timeout.
    pub fn expire_leases(&self) {
        self.clock.advance(self.lock_timeout() + Duration::seconds(1));
    }

    pub async fn seed(
        &self,
        app_id: &str,
        state: DomainState,
        phase: DomainPhase,
    ) -> Result<RuntimeDomain> {
        self.store
            .insert(&NewRuntimeDomain::new(
                app_id,
                format!("{app_id}.apps.test"),
                state,
                phase,
            ))
            .await
    }

    pub fn get(&self, id: Uuid) -> Result<Option<RuntimeDomain>> {
        self.store.get(id)
    }

    pub fn must_get(&self, id: Uuid) -> Result<RuntimeDomain> {
        self.get(id)?
            .ok_or_else(|| anyhow!("runtime domain {id} not in store"))
    }

    /// External actor changing desired state.
    pub fn set_state(&self, id: Uuid, state: DomainState) -> Result<()> {
        let mut rec = self.must_get(id)?;
        rec.state = state;
        self.store.put(rec)
    }

    pub async fn tick(&self) -> TickReport {
        self.reconciler.tick().await
    }

    pub async fn ticks(&self, n: usize) -> Vec<TickReport> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.tick().await);
        }
        out
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
