//! The reconciler: six steps over the shared domain store.
//!
//! Two steps are leased phase transitions that call the gateway
//! (`Creating -> Created`, `Deleting -> Deleted`). Three are lease-free bulk
//! syncs from desired state to phase. The last resets expired leases.
//!
//! A claim sets `locked_at = now`. Every write that releases a lease is gated
//! on the phase the claimer saw, so a stale worker can never overwrite a
//! phase another replica already advanced. A failed gateway call or a
//! missing region leaves the lease in place; the lock timeout is the retry
//! backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use rtd_config::ReconcilerConfig;
use rtd_db::{DomainFilter, DomainPatch, DomainStore};
use rtd_gateway::{GatewayClient, RegionDirectory, RegionError};
use rtd_schemas::{lock_sentinel, DomainPhase, DomainState, RuntimeDomain};

use crate::clock::Clock;
use crate::report::{Step, StepOutcome, StepReport, TickReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    pub disabled: bool,
    pub lock_timeout: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            disabled: false,
            lock_timeout: Duration::seconds(30),
        }
    }
}

impl ReconcilerSettings {
    pub fn from_config(cfg: &ReconcilerConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            disabled: cfg.disabled,
            lock_timeout: Duration::from_std(cfg.lock_timeout())
                .context("reconciler.lock_timeout_secs out of range")?,
        })
    }
}

/// Leased transition performed by the two phase handlers.
#[derive(Debug, Clone, Copy)]
enum RouteEdge {
    Create,
    Delete,
}

impl RouteEdge {
    fn from(self) -> DomainPhase {
        match self {
            RouteEdge::Create => DomainPhase::Creating,
            RouteEdge::Delete => DomainPhase::Deleting,
        }
    }

    fn to(self) -> DomainPhase {
        match self {
            RouteEdge::Create => DomainPhase::Created,
            RouteEdge::Delete => DomainPhase::Deleted,
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn DomainStore>,
    gateway: Arc<dyn GatewayClient>,
    regions: Arc<dyn RegionDirectory>,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
    disabled: AtomicBool,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn DomainStore>,
        gateway: Arc<dyn GatewayClient>,
        regions: Arc<dyn RegionDirectory>,
        clock: Arc<dyn Clock>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            regions,
            clock,
            lock_timeout: settings.lock_timeout,
            disabled: AtomicBool::new(settings.disabled),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// Pause or resume reconciliation. Takes effect at the next tick.
    pub fn set_disabled(&self, disabled: bool) {
        let was = self.disabled.swap(disabled, Ordering::SeqCst);
        if was != disabled {
            tracing::info!(disabled, "reconciler disabled flag changed");
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn store(&self) -> &Arc<dyn DomainStore> {
        &self.store
    }

    /// Leases taken before this instant are expired, as of now.
    pub fn lease_cutoff(&self) -> Result<DateTime<Utc>> {
        self.lock_cutoff(self.clock.now())
    }

    fn lock_cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        now.checked_sub_signed(self.lock_timeout).ok_or_else(|| {
            anyhow!(
                "lock timeout of {}s puts the lease cutoff out of range",
                self.lock_timeout.num_seconds()
            )
        })
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run every step once, in [`Step::ORDER`]. A failing step is logged and
    /// reported; it never prevents the later steps from running.
    pub async fn tick(&self) -> TickReport {
        let started_at = self.clock.now();
        if self.is_disabled() {
            tracing::debug!("reconciler disabled; tick skipped");
            return TickReport::skipped(started_at);
        }

        let mut steps = Vec::with_capacity(Step::ORDER.len());
        for step in Step::ORDER {
            let outcome = match self.run_step(step).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(step = step.as_str(), error = %format!("{err:#}"), "reconcile step failed");
                    StepOutcome::Failed {
                        error: format!("{err:#}"),
                    }
                }
            };
            steps.push(StepReport { step, outcome });
        }

        TickReport {
            skipped: false,
            started_at,
            steps,
        }
    }

    pub async fn run_step(&self, step: Step) -> Result<StepOutcome> {
        match step {
            Step::CreatingPhase => self.handle_creating_phase().await,
            Step::DeletingPhase => self.handle_deleting_phase().await,
            Step::ActiveState => self.handle_active_state().await,
            Step::InactiveState => self.handle_inactive_state().await,
            Step::DeletedState => self.handle_deleted_state().await,
            Step::TimeoutLocks => self.clear_timeout_locks().await,
        }
    }

    // -----------------------------------------------------------------------
    // Leased phase transitions
    // -----------------------------------------------------------------------

    /// Claim one `Creating` record, create its gateway route, mark it `Created`.
    pub async fn handle_creating_phase(&self) -> Result<StepOutcome> {
        self.advance_route(RouteEdge::Create).await
    }

    /// Claim one `Deleting` record, delete its gateway route, mark it `Deleted`.
    pub async fn handle_deleting_phase(&self) -> Result<StepOutcome> {
        self.advance_route(RouteEdge::Delete).await
    }

    async fn advance_route(&self, edge: RouteEdge) -> Result<StepOutcome> {
        let now = self.clock.now();
        let claim = DomainFilter::all()
            .phase(edge.from())
            .locked_before(self.lock_cutoff(now)?);

        let Some(doc) = self
            .store
            .claim_one(&claim, now)
            .await
            .with_context(|| format!("claim {} record failed", edge.from().as_str()))?
        else {
            return Ok(StepOutcome::Idle);
        };

        let region = match self.regions.find_region(&doc.app_id).await {
            Ok(region) => region,
            Err(RegionError::NotFound { app_id }) => {
                tracing::error!(
                    domain_id = %doc.id,
                    app_id = %app_id,
                    domain = %doc.domain,
                    "no region for app; lease held until timeout"
                );
                return Ok(StepOutcome::RegionMissing {
                    domain_id: doc.id,
                    app_id,
                });
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("region lookup for app '{}' failed", doc.app_id)
                })
            }
        };

        let call = match edge {
            RouteEdge::Create => {
                self.gateway
                    .create_app_route(&region, &doc.app_id, &doc.domain)
                    .await
            }
            RouteEdge::Delete => self.gateway.delete_app_route(&region, &doc.app_id).await,
        };
        let route = match call {
            Ok(route) => route,
            Err(err) => {
                tracing::warn!(
                    domain_id = %doc.id,
                    app_id = %doc.app_id,
                    region = %region.name,
                    error = %err,
                    "gateway call failed; retry after lease expiry"
                );
                return Ok(StepOutcome::GatewayFailed {
                    domain_id: doc.id,
                    error: err.to_string(),
                });
            }
        };

        self.release_into(&doc, edge, &route.route_id).await
    }

    /// Phase-gated write of `edge.to()` plus lease release.
    async fn release_into(
        &self,
        doc: &RuntimeDomain,
        edge: RouteEdge,
        route_id: &str,
    ) -> Result<StepOutcome> {
        let gate = DomainFilter::all().id(doc.id).phase(edge.from());
        let patch = DomainPatch::default()
            .phase(edge.to())
            .locked_at(lock_sentinel());

        let modified = self
            .store
            .update_one(&gate, &patch)
            .await
            .with_context(|| format!("update domain {} to {} failed", doc.id, edge.to().as_str()))?;

        if modified == 0 {
            tracing::debug!(
                domain_id = %doc.id,
                app_id = %doc.app_id,
                "phase moved by another writer; nothing to do"
            );
            return Ok(StepOutcome::RaceLost { domain_id: doc.id });
        }

        tracing::info!(
            domain_id = %doc.id,
            app_id = %doc.app_id,
            domain = %doc.domain,
            route_id,
            from = edge.from().as_str(),
            to = edge.to().as_str(),
            "runtime domain phase advanced"
        );
        Ok(StepOutcome::Advanced {
            domain_id: doc.id,
            app_id: doc.app_id.clone(),
            domain: doc.domain.clone(),
            to: edge.to(),
        })
    }

    // -----------------------------------------------------------------------
    // Bulk desired-state sync
    // -----------------------------------------------------------------------

    async fn sync_phase(
        &self,
        state: DomainState,
        from: DomainPhase,
        to: DomainPhase,
    ) -> Result<u64> {
        let filter = DomainFilter::all().state(state).phase(from);
        let patch = DomainPatch::default().phase(to).locked_at(lock_sentinel());
        let modified = self
            .store
            .update_many(&filter, &patch)
            .await
            .with_context(|| {
                format!(
                    "sync {} {} -> {} failed",
                    state.as_str(),
                    from.as_str(),
                    to.as_str()
                )
            })?;
        if modified > 0 {
            tracing::info!(
                state = state.as_str(),
                from = from.as_str(),
                to = to.as_str(),
                modified,
                "desired state synced"
            );
        }
        Ok(modified)
    }

    /// `Active` + `Deleted` phase -> `Creating`.
    pub async fn handle_active_state(&self) -> Result<StepOutcome> {
        let modified = self
            .sync_phase(DomainState::Active, DomainPhase::Deleted, DomainPhase::Creating)
            .await?;
        Ok(StepOutcome::Synced {
            modified,
            deleted: 0,
        })
    }

    /// `Inactive` + `Created` phase -> `Deleting`. The record is kept.
    pub async fn handle_inactive_state(&self) -> Result<StepOutcome> {
        let modified = self
            .sync_phase(DomainState::Inactive, DomainPhase::Created, DomainPhase::Deleting)
            .await?;
        Ok(StepOutcome::Synced {
            modified,
            deleted: 0,
        })
    }

    /// `Deleted` + `Created` phase -> `Deleting`, then remove every record
    /// that is `Deleted` in both state and phase. The only path that
    /// destroys records.
    pub async fn handle_deleted_state(&self) -> Result<StepOutcome> {
        let modified = self
            .sync_phase(DomainState::Deleted, DomainPhase::Created, DomainPhase::Deleting)
            .await?;

        let retired = DomainFilter::all()
            .state(DomainState::Deleted)
            .phase(DomainPhase::Deleted);
        let deleted = self
            .store
            .delete_many(&retired)
            .await
            .context("delete retired domains failed")?;
        if deleted > 0 {
            tracing::info!(deleted, "retired runtime domains removed");
        }

        Ok(StepOutcome::Synced { modified, deleted })
    }

    // -----------------------------------------------------------------------
    // Sweeper
    // -----------------------------------------------------------------------

    /// Reset every lease older than the lock timeout, whatever the phase.
    pub async fn clear_timeout_locks(&self) -> Result<StepOutcome> {
        let cutoff = self.lock_cutoff(self.clock.now())?;
        let released = self
            .store
            .update_many(
                &DomainFilter::all().locked_before(cutoff),
                &DomainPatch::default().locked_at(lock_sentinel()),
            )
            .await
            .context("clear timed-out locks failed")?;
        if released > 0 {
            tracing::info!(released, "expired leases released");
        }
        Ok(StepOutcome::Swept { released })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_edges_follow_the_phase_machine() {
        for edge in [RouteEdge::Create, RouteEdge::Delete] {
            assert!(edge.from().can_transition_to(edge.to()));
        }
    }

    #[test]
    fn settings_from_config_uses_lock_timeout() {
        let cfg = ReconcilerConfig {
            disabled: true,
            lock_timeout_secs: 45,
            tick_interval_ms: 500,
        };
        let s = ReconcilerSettings::from_config(&cfg).unwrap();
        assert!(s.disabled);
        assert_eq!(s.lock_timeout, Duration::seconds(45));
    }

    #[test]
    fn settings_from_config_rejects_oversized_lock_timeout() {
        let cfg = ReconcilerConfig {
            lock_timeout_secs: 10_000_000_000_000,
            ..ReconcilerConfig::default()
        };
        let err = ReconcilerSettings::from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("lock_timeout_secs"));
    }

    #[test]
    fn default_lock_timeout_is_thirty_seconds() {
        assert_eq!(ReconcilerSettings::default().lock_timeout, Duration::seconds(30));
    }
}
