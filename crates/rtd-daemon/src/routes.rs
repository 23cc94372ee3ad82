//! Axum router and all HTTP handlers for rtd-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use rtd_db::{DomainFilter, DomainStore};
use rtd_schemas::DomainPhase;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::{
    api_types::{DomainSummaryResponse, ErrorResponse, HealthResponse, ReconcilerToggleResponse},
    state::{AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/reconciler/disable", post(reconciler_disable))
        .route("/v1/reconciler/enable", post(reconciler_enable))
        .route("/v1/domains/summary", get(domains_summary))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.clone(),
            version: st.build.version.clone(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = st.snapshot().await;
    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// POST /v1/reconciler/disable  /v1/reconciler/enable
// ---------------------------------------------------------------------------

async fn set_disabled(st: &AppState, disabled: bool) -> ReconcilerToggleResponse {
    let changed = st.reconciler.is_disabled() != disabled;
    st.reconciler.set_disabled(disabled);
    {
        let mut s = st.status.write().await;
        s.reconciler_disabled = disabled;
    }

    if changed {
        let (level, msg) = if disabled {
            ("WARN", "reconciler DISABLED by operator")
        } else {
            ("INFO", "reconciler enabled by operator")
        };
        let _ = st.bus.send(BusMsg::LogLine {
            level: level.to_string(),
            msg: msg.to_string(),
        });
    }

    ReconcilerToggleResponse { disabled, changed }
}

pub(crate) async fn reconciler_disable(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = set_disabled(&st, true).await;
    info!(changed = resp.changed, "reconciler/disable");
    (StatusCode::OK, Json(resp))
}

pub(crate) async fn reconciler_enable(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = set_disabled(&st, false).await;
    info!(changed = resp.changed, "reconciler/enable");
    (StatusCode::OK, Json(resp))
}

// ---------------------------------------------------------------------------
// GET /v1/domains/summary
// ---------------------------------------------------------------------------

pub(crate) async fn domains_summary(State(st): State<Arc<AppState>>) -> Response {
    let rows = match st.reconciler.store().list(&DomainFilter::all()).await {
        Ok(rows) => rows,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "domains/summary store read failed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: format!("store unavailable: {err:#}"),
                }),
            )
                .into_response();
        }
    };

    let cutoff = match st.reconciler.lease_cutoff() {
        Ok(cutoff) => cutoff,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "domains/summary lease cutoff failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("{err:#}"),
                }),
            )
                .into_response();
        }
    };
    let mut summary = DomainSummaryResponse::default();
    for phase in DomainPhase::ALL {
        summary.by_phase.insert(phase.as_str().to_string(), 0);
    }
    for d in &rows {
        summary.total += 1;
        *summary
            .by_phase
            .entry(d.phase.as_str().to_string())
            .or_default() += 1;
        *summary
            .by_state
            .entry(d.state.as_str().to_string())
            .or_default() += 1;
        if d.is_leased_at(cutoff) {
            summary.leased += 1;
        }
    }

    (StatusCode::OK, Json(summary)).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
