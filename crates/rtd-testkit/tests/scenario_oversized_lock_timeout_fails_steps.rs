//! Scenario: a lock timeout too large for lease arithmetic.
//!
//! # Invariants under test
//! 1. Config loading rejects the timeout before a reconciler is built.
//! 2. A reconciler built by hand with such a timeout does not panic: steps
//!    that compute a lease cutoff fail, the bulk syncs still run.

use std::sync::Arc;

use rtd_config::ReconcilerConfig;
use rtd_reconcile::{Reconciler, ReconcilerSettings, Step, StepOutcome};
use rtd_schemas::{DomainPhase, DomainState};
use rtd_testkit::Harness;

const OVERSIZED_SECS: i64 = 10_000_000_000_000;

#[test]
fn config_rejects_oversized_lock_timeout() {
    let cfg = ReconcilerConfig {
        lock_timeout_secs: OVERSIZED_SECS as u64,
        ..ReconcilerConfig::default()
    };
    assert!(cfg.validate().is_err());
    assert!(ReconcilerSettings::from_config(&cfg).is_err());
}

#[tokio::test]
async fn tick_reports_failure_instead_of_panicking() -> anyhow::Result<()> {
    let h = Harness::new();
    let r = Arc::new(Reconciler::new(
        h.store.clone(),
        h.gateway.clone(),
        h.regions.clone(),
        h.clock.clone(),
        ReconcilerSettings {
            disabled: false,
            lock_timeout: chrono::Duration::seconds(OVERSIZED_SECS),
        },
    ));
    let rec = h.seed("a1", DomainState::Active, DomainPhase::Deleted).await?;

    let report = r.tick().await;
    assert_eq!(report.steps.len(), 6);
    for step in [Step::CreatingPhase, Step::DeletingPhase, Step::TimeoutLocks] {
        assert!(
            matches!(report.outcome(step), Some(StepOutcome::Failed { .. })),
            "{step:?} should fail"
        );
    }
    assert_eq!(
        report.outcome(Step::ActiveState),
        Some(&StepOutcome::Synced { modified: 1, deleted: 0 })
    );
    assert!(report
        .first_error()
        .is_some_and(|e| e.contains("lease cutoff out of range")));
    assert_eq!(h.must_get(rec.id)?.phase, DomainPhase::Creating);
    assert!(h.gateway.calls().is_empty());
    Ok(())
}
