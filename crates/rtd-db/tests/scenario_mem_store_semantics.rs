//! Scenario: in-memory store honours the DomainStore contract.
//!
//! # Invariants under test
//! 1. `claim_one` returns the record as it was BEFORE the lease was set.
//! 2. A leased record is invisible to a second claim using the same cutoff.
//! 3. `update_*` report modified (not matched) counts.
//! 4. `delete_many` only removes matching records.

use chrono::{Duration, Utc};
use rtd_db::{DomainFilter, DomainPatch, DomainStore, MemDomainStore};
use rtd_schemas::{lock_sentinel, DomainPhase, DomainState, NewRuntimeDomain};

async fn seed(store: &MemDomainStore, app: &str, state: DomainState, phase: DomainPhase) {
    store
        .insert(&NewRuntimeDomain::new(
            app,
            format!("{app}.example.dev"),
            state,
            phase,
        ))
        .await
        .expect("insert");
}

#[tokio::test]
async fn claim_returns_prior_document_and_blocks_second_claimer() -> anyhow::Result<()> {
    let store = MemDomainStore::new();
    seed(&store, "app1", DomainState::Active, DomainPhase::Creating).await;

    let now = Utc::now();
    let cutoff = now - Duration::seconds(30);
    let filter = DomainFilter::all()
        .phase(DomainPhase::Creating)
        .locked_before(cutoff);

    let a = store.claim_one(&filter, now).await?.expect("first claim");
    assert_eq!(a.locked_at, lock_sentinel(), "claim must return prior lease");

    let stored = store.get(a.id)?.expect("row");
    assert_eq!(stored.locked_at, now, "stored lease is the claim time");

    let b = store.claim_one(&filter, now).await?;
    assert!(b.is_none(), "leased record must not be claimable again");
    Ok(())
}

#[tokio::test]
async fn claim_prefers_oldest_lease() -> anyhow::Result<()> {
    let store = MemDomainStore::new();
    seed(&store, "app1", DomainState::Active, DomainPhase::Creating).await;
    seed(&store, "app2", DomainState::Active, DomainPhase::Creating).await;

    let now = Utc::now();
    // Give app1 a lease that is expired but newer than the sentinel.
    let app1 = store
        .list(&DomainFilter::all().app_id("app1"))
        .await?
        .remove(0);
    let mut staged = app1.clone();
    staged.locked_at = now - Duration::seconds(120);
    store.put(staged)?;

    let filter = DomainFilter::all()
        .phase(DomainPhase::Creating)
        .locked_before(now - Duration::seconds(30));
    let first = store.claim_one(&filter, now).await?.expect("claim");
    assert_eq!(first.app_id, "app2", "sentinel lease is the oldest");
    Ok(())
}

#[tokio::test]
async fn update_many_counts_modified_not_matched() -> anyhow::Result<()> {
    let store = MemDomainStore::new();
    seed(&store, "app1", DomainState::Active, DomainPhase::Deleted).await;
    seed(&store, "app2", DomainState::Active, DomainPhase::Deleted).await;

    let filter = DomainFilter::all().state(DomainState::Active);
    let patch = DomainPatch::default()
        .phase(DomainPhase::Creating)
        .locked_at(lock_sentinel());

    assert_eq!(store.update_many(&filter, &patch).await?, 2);
    assert_eq!(
        store.update_many(&filter, &patch).await?,
        0,
        "same patch again is a no-op"
    );
    Ok(())
}

#[tokio::test]
async fn update_one_touches_at_most_one_record() -> anyhow::Result<()> {
    let store = MemDomainStore::new();
    seed(&store, "app1", DomainState::Inactive, DomainPhase::Created).await;
    seed(&store, "app2", DomainState::Inactive, DomainPhase::Created).await;

    let n = store
        .update_one(
            &DomainFilter::all().phase(DomainPhase::Created),
            &DomainPatch::default().phase(DomainPhase::Deleting),
        )
        .await?;
    assert_eq!(n, 1);

    let still_created = store
        .list(&DomainFilter::all().phase(DomainPhase::Created))
        .await?;
    assert_eq!(still_created.len(), 1);
    Ok(())
}

#[tokio::test]
async fn delete_many_removes_only_matches() -> anyhow::Result<()> {
    let store = MemDomainStore::new();
    seed(&store, "gone", DomainState::Deleted, DomainPhase::Deleted).await;
    seed(&store, "kept", DomainState::Inactive, DomainPhase::Deleted).await;

    let n = store
        .delete_many(
            &DomainFilter::all()
                .state(DomainState::Deleted)
                .phase(DomainPhase::Deleted),
        )
        .await?;
    assert_eq!(n, 1);

    let rest = store.list(&DomainFilter::all()).await?;
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].app_id, "kept");
    Ok(())
}

#[tokio::test]
async fn duplicate_domain_is_rejected() {
    let store = MemDomainStore::new();
    seed(&store, "app1", DomainState::Active, DomainPhase::Deleted).await;
    let err = store
        .insert(&NewRuntimeDomain::new(
            "app2",
            "app1.example.dev",
            DomainState::Active,
            DomainPhase::Deleted,
        ))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already bound"));
}
