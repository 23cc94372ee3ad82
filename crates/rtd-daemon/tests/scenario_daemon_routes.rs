//! In-process scenario tests for rtd-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot`; no network I/O required.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use rtd_daemon::{routes, state};
use rtd_schemas::{DomainPhase, DomainState};
use rtd_testkit::{Harness, OutageStore, StoreOp};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_state(h: &Harness) -> Arc<state::AppState> {
    Arc::new(state::AppState::new(h.reconciler.clone(), "memory"))
}

/// Drive the router with a single request and return (status, body_bytes).
async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn req(method: &str, uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

// ---------------------------------------------------------------------------
// GET /v1/health, GET /v1/status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let h = Harness::new();
    let router = routes::build_router(make_state(&h));

    let (status, body) = call(router, req("GET", "/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "rtd-daemon");
}

#[tokio::test]
async fn fresh_status_has_no_ticks() {
    let h = Harness::new();
    let router = routes::build_router(make_state(&h));

    let (status, body) = call(router, req("GET", "/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["store"], "memory");
    assert_eq!(json["reconciler_disabled"], false);
    assert_eq!(json["ticks_run"], 0);
    assert!(json["last_report"].is_null());
}

// ---------------------------------------------------------------------------
// POST /v1/reconciler/disable, /v1/reconciler/enable
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disable_pauses_ticks_and_enable_resumes() {
    let h = Harness::new();
    let rec = h
        .seed("a1", DomainState::Active, DomainPhase::Deleted)
        .await
        .unwrap();
    let st = make_state(&h);

    let (status, body) = call(routes::build_router(st.clone()), req("POST", "/v1/reconciler/disable")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["disabled"], true);
    assert_eq!(json["changed"], true);

    let (_, body) = call(routes::build_router(st.clone()), req("POST", "/v1/reconciler/disable")).await;
    assert_eq!(parse_json(body)["changed"], false);

    let report = st.tick_once().await;
    assert!(report.skipped);
    assert_eq!(h.must_get(rec.id).unwrap().phase, DomainPhase::Deleted);

    let (_, body) = call(routes::build_router(st.clone()), req("GET", "/v1/status")).await;
    let json = parse_json(body);
    assert_eq!(json["reconciler_disabled"], true);
    assert_eq!(json["ticks_skipped"], 1);

    let (_, body) = call(routes::build_router(st.clone()), req("POST", "/v1/reconciler/enable")).await;
    assert_eq!(parse_json(body)["disabled"], false);

    let report = st.tick_once().await;
    assert!(!report.skipped);
    assert_eq!(h.must_get(rec.id).unwrap().phase, DomainPhase::Creating);
}

// ---------------------------------------------------------------------------
// GET /v1/domains/summary
// ---------------------------------------------------------------------------

#[tokio::test]
async fn summary_counts_by_phase_state_and_lease() {
    let h = Harness::new();
    h.seed("a1", DomainState::Active, DomainPhase::Created).await.unwrap();
    h.seed("a2", DomainState::Inactive, DomainPhase::Created).await.unwrap();
    let leased = h
        .seed("a3", DomainState::Active, DomainPhase::Creating)
        .await
        .unwrap();
    let mut staged = leased.clone();
    staged.locked_at = rtd_reconcile::Clock::now(h.clock.as_ref());
    h.store.put(staged).unwrap();

    let router = routes::build_router(make_state(&h));
    let (status, body) = call(router, req("GET", "/v1/domains/summary")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["total"], 3);
    assert_eq!(json["by_phase"]["CREATED"], 2);
    assert_eq!(json["by_phase"]["CREATING"], 1);
    assert_eq!(json["by_phase"]["DELETING"], 0);
    assert_eq!(json["by_phase"]["DELETED"], 0);
    assert_eq!(json["by_state"]["ACTIVE"], 2);
    assert_eq!(json["by_state"]["INACTIVE"], 1);
    assert_eq!(json["leased"], 1);
}

#[tokio::test]
async fn summary_reports_503_when_store_is_down() {
    let h = Harness::new();
    let outage = Arc::new(OutageStore::new(h.store.clone()));
    outage.fail(&[StoreOp::List]);
    let reconciler = h.replica_over(outage, h.gateway.clone());
    let st = Arc::new(state::AppState::new(reconciler, "memory"));

    let (status, body) = call(routes::build_router(st), req("GET", "/v1/domains/summary")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(parse_json(body)["error"]
        .as_str()
        .unwrap()
        .contains("store unavailable"));
}
