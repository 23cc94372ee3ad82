//! Scenario: a failed route create is retried after the lock timeout.
//!
//! # Invariants under test
//! 1. On gateway failure the phase stays `Creating` and the lease stays at
//!    claim time.
//! 2. Within the timeout no replica retries the call.
//! 3. Once the timeout elapses the sweeper resets the lease, and the next
//!    tick provisions the record without operator action.

use chrono::Duration;
use rtd_gateway::GatewayError;
use rtd_reconcile::{Clock, Step, StepOutcome};
use rtd_schemas::{lock_sentinel, DomainPhase, DomainState};
use rtd_testkit::{CallKind, Harness};

#[tokio::test]
async fn failed_create_holds_lease_then_recovers() -> anyhow::Result<()> {
    let h = Harness::new();
    let rec = h.seed("a1", DomainState::Active, DomainPhase::Creating).await?;
    h.gateway
        .fail_next(GatewayError::Transport("connection refused".to_string()));

    let claimed_at = h.clock.now();
    let t1 = h.tick().await;
    assert!(matches!(
        t1.outcome(Step::CreatingPhase),
        Some(StepOutcome::GatewayFailed { error, .. }) if error.contains("connection refused")
    ));
    assert_eq!(t1.outcome(Step::TimeoutLocks), Some(&StepOutcome::Swept { released: 0 }));

    let r = h.must_get(rec.id)?;
    assert_eq!(r.phase, DomainPhase::Creating);
    assert_eq!(r.locked_at, claimed_at);

    h.clock.advance(Duration::seconds(10));
    let t2 = h.tick().await;
    assert_eq!(t2.outcome(Step::CreatingPhase), Some(&StepOutcome::Idle));
    assert_eq!(h.gateway.count(CallKind::Create, "a1"), 1);
    assert_eq!(h.must_get(rec.id)?.locked_at, claimed_at);

    h.expire_leases();
    let swept = h.reconciler.clear_timeout_locks().await?;
    assert_eq!(swept, StepOutcome::Swept { released: 1 });
    let r = h.must_get(rec.id)?;
    assert_eq!(r.locked_at, lock_sentinel());
    assert_eq!(r.phase, DomainPhase::Creating);

    let t3 = h.tick().await;
    assert!(matches!(
        t3.outcome(Step::CreatingPhase),
        Some(StepOutcome::Advanced { to: DomainPhase::Created, .. })
    ));
    assert_eq!(h.gateway.count(CallKind::Create, "a1"), 2);
    Ok(())
}

#[tokio::test]
async fn failed_delete_keeps_deleting_until_gateway_recovers() -> anyhow::Result<()> {
    let h = Harness::new();
    let rec = h.seed("a1", DomainState::Inactive, DomainPhase::Deleting).await?;
    h.gateway.set_down(Some(GatewayError::Api {
        status: 503,
        message: "etcd unavailable".to_string(),
    }));

    for _ in 0..3 {
        h.tick().await;
        h.expire_leases();
    }
    assert_eq!(h.must_get(rec.id)?.phase, DomainPhase::Deleting);
    assert_eq!(h.gateway.count(CallKind::Delete, "a1"), 3);

    h.gateway.set_down(None);
    h.tick().await;
    assert_eq!(h.must_get(rec.id)?.phase, DomainPhase::Deleted);
    Ok(())
}
