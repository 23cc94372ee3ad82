//! Build a production [`Reconciler`] from the effective config.
//!
//! Shared by the daemon and the CLI's one-shot tick so both run the exact
//! same collaborators: APISIX client, config-backed region directory and
//! the system clock.

use std::sync::Arc;

use anyhow::{Context, Result};
use rtd_config::{resolve_gateway_keys, GatewayConfig, ReconcilerConfig, RegionsConfig};
use rtd_db::DomainStore;
use rtd_gateway::{ApisixClient, StaticRegionDirectory};
use serde_json::Value;

use crate::clock::SystemClock;
use crate::reconciler::{Reconciler, ReconcilerSettings};

pub fn reconciler_from_config(
    config_json: &Value,
    store: Arc<dyn DomainStore>,
) -> Result<Reconciler> {
    let rcfg = ReconcilerConfig::from_config_json(config_json)?.with_env_overrides()?;
    let regions = RegionsConfig::from_config_json(config_json)?;
    let gcfg = GatewayConfig::from_config_json(config_json)?;

    let keys = resolve_gateway_keys(&regions);
    for (region, env_name) in keys.missing() {
        tracing::warn!(region = %region, env_var = %env_name, "gateway admin key missing; routes in this region will fail");
    }

    let directory = StaticRegionDirectory::from_config(&regions);
    if directory.is_empty() {
        tracing::warn!("no regions configured; every claimed record will report a missing region");
    }

    let gateway = ApisixClient::new(keys, gcfg.request_timeout())
        .context("gateway client init failed")?;

    Ok(Reconciler::new(
        store,
        Arc::new(gateway),
        Arc::new(directory),
        Arc::new(SystemClock),
        ReconcilerSettings::from_config(&rcfg)?,
    ))
}
