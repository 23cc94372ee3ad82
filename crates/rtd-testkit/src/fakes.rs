//! Fake gateway and region directory.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use rtd_gateway::{route_id_for, GatewayClient, GatewayError, RegionDirectory, RegionError};
use rtd_schemas::{GatewayConf, Region, RouteHandle};
use serde_json::json;
use tokio::sync::Semaphore;

pub fn test_region(name: &str) -> Region {
    Region {
        name: name.to_string(),
        gateway: GatewayConf {
            admin_url: format!("http://apisix-{name}.test:9180"),
            api_key_env: format!("RTD_TEST_KEY_{}", name.to_uppercase()),
            upstream_template: "{app_id}.runtime.test:8000".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// FakeGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Create,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub kind: CallKind,
    pub region: String,
    pub app_id: String,
    /// Only set for creates.
    pub domain: Option<String>,
}

/// Records every call. Failures are queued with [`FakeGateway::fail_next`]
/// (consumed one per call) or made permanent with [`FakeGateway::set_down`].
///
/// [`FakeGateway::held`] builds a gateway whose calls block after being
/// recorded until [`FakeGateway::release`] hands out permits. That is how
/// tests freeze a worker mid-call while another replica acts.
#[derive(Default)]
pub struct FakeGateway {
    calls: Mutex<Vec<GatewayCall>>,
    queued_failures: Mutex<VecDeque<GatewayError>>,
    down: Mutex<Option<GatewayError>>,
    gate: Option<Semaphore>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub fn fail_next(&self, err: GatewayError) {
        self.queued_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(err);
    }

    /// `Some(err)`: every call fails with `err` until cleared with `None`.
    pub fn set_down(&self, err: Option<GatewayError>) {
        *self.down.lock().unwrap_or_else(|e| e.into_inner()) = err;
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, kind: CallKind, app_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.kind == kind && c.app_id == app_id)
            .count()
    }

    async fn record(&self, call: GatewayCall) -> Result<RouteHandle, GatewayError> {
        let handle = RouteHandle {
            route_id: route_id_for(&call.app_id),
            region: call.region.clone(),
            raw: json!({ "fake": true }),
        };
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?;
            permit.forget();
        }

        if let Some(err) = self.down.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(err);
        }
        if let Some(err) = self
            .queued_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return Err(err);
        }
        Ok(handle)
    }
}

#[async_trait]
impl GatewayClient for FakeGateway {
    async fn create_app_route(
        &self,
        region: &Region,
        app_id: &str,
        domain: &str,
    ) -> Result<RouteHandle, GatewayError> {
        self.record(GatewayCall {
            kind: CallKind::Create,
            region: region.name.clone(),
            app_id: app_id.to_string(),
            domain: Some(domain.to_string()),
        })
        .await
    }

    async fn delete_app_route(
        &self,
        region: &Region,
        app_id: &str,
    ) -> Result<RouteHandle, GatewayError> {
        self.record(GatewayCall {
            kind: CallKind::Delete,
            region: region.name.clone(),
            app_id: app_id.to_string(),
            domain: None,
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// FakeRegions
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRegions {
    by_app: Mutex<BTreeMap<String, Region>>,
    fallback: Mutex<Option<Region>>,
    lookup_error: Mutex<Option<String>>,
}

impl FakeRegions {
    /// Resolves nothing until apps are assigned.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every app resolves to `region`.
    pub fn serving_all(region: Region) -> Self {
        let regions = Self::default();
        *regions.fallback.lock().unwrap_or_else(|e| e.into_inner()) = Some(region);
        regions
    }

    pub fn assign(&self, app_id: &str, region: Region) {
        self.by_app
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(app_id.to_string(), region);
    }

    pub fn set_fallback(&self, region: Option<Region>) {
        *self.fallback.lock().unwrap_or_else(|e| e.into_inner()) = region;
    }

    pub fn set_lookup_error(&self, msg: Option<&str>) {
        *self.lookup_error.lock().unwrap_or_else(|e| e.into_inner()) = msg.map(str::to_string);
    }
}

#[async_trait]
impl RegionDirectory for FakeRegions {
    async fn find_region(&self, app_id: &str) -> Result<Region, RegionError> {
        if let Some(msg) = self.lookup_error.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(RegionError::Lookup(msg));
        }
        if let Some(r) = self
            .by_app
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(app_id)
        {
            return Ok(r.clone());
        }
        self.fallback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| RegionError::NotFound {
                app_id: app_id.to_string(),
            })
    }
}
