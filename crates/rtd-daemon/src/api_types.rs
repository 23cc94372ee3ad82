//! Request and response types for all rtd-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests.  No business logic lives here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /v1/reconciler/disable  /v1/reconciler/enable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerToggleResponse {
    pub disabled: bool,
    /// False when the flag already had the requested value.
    pub changed: bool,
}

// ---------------------------------------------------------------------------
// /v1/domains/summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainSummaryResponse {
    pub total: u64,
    /// Keyed by phase (`CREATING`, ...). Every phase is present.
    pub by_phase: BTreeMap<String, u64>,
    pub by_state: BTreeMap<String, u64>,
    /// Records whose lease has not expired yet.
    pub leased: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
