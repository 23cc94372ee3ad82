//! Shared runtime state for rtd-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The reconcile loop
//! writes each tick's report into the status snapshot and onto the bus.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rtd_reconcile::{Reconciler, TickReport};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Status(StatusSnapshot),
    Tick(TickReport),
    LogLine { level: String, msg: String },
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Status(_) => "status",
            BusMsg::Tick(_) => "tick",
            BusMsg::LogLine { .. } => "log",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Returned by GET /v1/status and carried inside SSE `status` events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    /// "postgres" | "memory"
    pub store: String,
    pub reconciler_disabled: bool,
    pub ticks_run: u64,
    pub ticks_skipped: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_report: Option<TickReport>,
    /// Most recent step error; survives clean ticks.
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub status: Arc<RwLock<StatusSnapshot>>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(reconciler: Arc<Reconciler>, store: &str) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        let initial_status = StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            store: store.to_string(),
            reconciler_disabled: reconciler.is_disabled(),
            ticks_run: 0,
            ticks_skipped: 0,
            last_tick_at: None,
            last_report: None,
            last_error: None,
        };

        Self {
            bus,
            build: BuildInfo {
                service: "rtd-daemon".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            status: Arc::new(RwLock::new(initial_status)),
            reconciler,
        }
    }

    /// Current status with live fields refreshed.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let mut snap = self.status.read().await.clone();
        snap.daemon_uptime_secs = uptime_secs();
        snap.reconciler_disabled = self.reconciler.is_disabled();
        snap
    }

    /// Fold one tick report into the status and publish it.
    pub async fn record_tick(&self, report: TickReport) {
        let error = report.first_error();
        {
            let mut st = self.status.write().await;
            if report.skipped {
                st.ticks_skipped += 1;
            } else {
                st.ticks_run += 1;
            }
            st.last_tick_at = Some(report.started_at);
            st.reconciler_disabled = self.reconciler.is_disabled();
            if let Some(e) = &error {
                st.last_error = Some(e.clone());
            }
            st.last_report = Some(report.clone());
        }

        let _ = self.bus.send(BusMsg::Tick(report));
        if let Some(msg) = error {
            let _ = self.bus.send(BusMsg::LogLine {
                level: "WARN".to_string(),
                msg,
            });
        }
    }

    /// Run one tick and record it. The loop calls this; tests call it directly.
    pub async fn tick_once(&self) -> TickReport {
        let report = self.reconciler.tick().await;
        self.record_tick(report.clone()).await;
        report
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    })
}

/// Spawn the periodic reconcile loop.
///
/// Ticks run one after another inside a single task, so they never overlap
/// within this process. A tick that overruns the interval causes the missed
/// firings to be skipped rather than bunched up.
pub fn spawn_reconcile_loop(state: Arc<AppState>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            state.tick_once().await;
        }
    })
}
