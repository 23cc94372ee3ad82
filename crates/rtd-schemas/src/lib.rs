//! rtd-schemas
//!
//! Shared record and value types for runtime-domain reconciliation.
//! Serde-serializable, no IO.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Lease sentinel
// ---------------------------------------------------------------------------

/// The "infinitely old" lease marker: the Unix epoch.
///
/// Every record that is not currently leased carries this value in
/// `locked_at`. It is older than any lock-timeout cutoff, so a record holding
/// it is always claimable.
pub fn lock_sentinel() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// DomainState: desired state (set by an external actor)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainState {
    Active,
    Inactive,
    Deleted,
}

impl DomainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainState::Active => "ACTIVE",
            DomainState::Inactive => "INACTIVE",
            DomainState::Deleted => "DELETED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "ACTIVE" => Ok(DomainState::Active),
            "INACTIVE" => Ok(DomainState::Inactive),
            "DELETED" => Ok(DomainState::Deleted),
            other => Err(anyhow!("invalid domain state: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// DomainPhase: provisioning phase (owned by the reconciler)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainPhase {
    Creating,
    Created,
    Deleting,
    Deleted,
}

impl DomainPhase {
    pub const ALL: [DomainPhase; 4] = [
        DomainPhase::Creating,
        DomainPhase::Created,
        DomainPhase::Deleting,
        DomainPhase::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DomainPhase::Creating => "CREATING",
            DomainPhase::Created => "CREATED",
            DomainPhase::Deleting => "DELETING",
            DomainPhase::Deleted => "DELETED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "CREATING" => Ok(DomainPhase::Creating),
            "CREATED" => Ok(DomainPhase::Created),
            "DELETING" => Ok(DomainPhase::Deleting),
            "DELETED" => Ok(DomainPhase::Deleted),
            other => Err(anyhow!("invalid domain phase: {}", other)),
        }
    }

    /// Whether the reconciler may move a record from `self` to `to`.
    ///
    /// Edges:
    /// - `Deleted -> Creating` (desired state Active)
    /// - `Creating -> Created` (route created)
    /// - `Created -> Deleting` (desired state Inactive or Deleted)
    /// - `Deleting -> Deleted` (route deleted)
    pub fn can_transition_to(&self, to: DomainPhase) -> bool {
        matches!(
            (self, to),
            (DomainPhase::Deleted, DomainPhase::Creating)
                | (DomainPhase::Creating, DomainPhase::Created)
                | (DomainPhase::Created, DomainPhase::Deleting)
                | (DomainPhase::Deleting, DomainPhase::Deleted)
        )
    }
}

// ---------------------------------------------------------------------------
// RuntimeDomain
// ---------------------------------------------------------------------------

/// A binding from an application to a gateway-routable hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeDomain {
    /// Store-assigned identity.
    pub id: Uuid,
    /// Owning application. Immutable after creation.
    pub app_id: String,
    /// Routable hostname. Immutable after creation.
    pub domain: String,
    /// Desired state; read-only to the reconciler.
    pub state: DomainState,
    /// Provisioning phase; mutated only by the reconciler.
    pub phase: DomainPhase,
    /// Lease marker. [`lock_sentinel`] when not leased.
    pub locked_at: DateTime<Utc>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

impl RuntimeDomain {
    pub fn is_leased_at(&self, cutoff: DateTime<Utc>) -> bool {
        self.locked_at >= cutoff
    }
}

/// Insert payload for a new record. The store assigns `id`, timestamps and
/// initialises `locked_at` to the sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRuntimeDomain {
    pub app_id: String,
    pub domain: String,
    pub state: DomainState,
    pub phase: DomainPhase,
}

impl NewRuntimeDomain {
    pub fn new(
        app_id: impl Into<String>,
        domain: impl Into<String>,
        state: DomainState,
        phase: DomainPhase,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            domain: domain.into(),
            state,
            phase,
        }
    }
}

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// Gateway coordinates of one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConf {
    /// Base URL of the gateway admin API (e.g. `http://apisix-admin:9180`).
    pub admin_url: String,
    /// Name of the environment variable holding the admin API key.
    /// The key itself never appears in config.
    pub api_key_env: String,
    /// Upstream node for runtime routes; `{app_id}` is substituted.
    pub upstream_template: String,
}

/// A deployment location whose gateway serves an application's routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub gateway: GatewayConf,
}

// ---------------------------------------------------------------------------
// RouteHandle
// ---------------------------------------------------------------------------

/// What the gateway reported back for a route create/delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteHandle {
    pub route_id: String,
    pub region: String,
    /// Raw gateway response body (`Value::Null` when the gateway sent none).
    pub raw: Value,
}
