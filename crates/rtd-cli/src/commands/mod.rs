//! Command handler modules for rtd-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod domains;
pub mod reconcile;

use std::sync::Arc;

use anyhow::{Context, Result};
use rtd_config::LoadedConfig;
use rtd_db::{DomainFilter, DomainStore, PgDomainStore};
use rtd_schemas::{DomainPhase, DomainState};

/// Build a listing filter from CLI flags. Invalid values fail before any
/// connection is attempted.
pub fn parse_filter(
    state: Option<&str>,
    phase: Option<&str>,
    app: Option<String>,
) -> Result<DomainFilter> {
    let mut filter = DomainFilter::all();
    if let Some(s) = state {
        filter = filter.state(DomainState::parse(s).context("--state")?);
    }
    if let Some(p) = phase {
        filter = filter.phase(DomainPhase::parse(p).context("--phase")?);
    }
    if let Some(a) = app {
        filter = filter.app_id(a);
    }
    Ok(filter)
}

/// Explicit paths win; otherwise fall back to RTD_CONFIG.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        return rtd_config::load_from_env();
    }
    let refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    rtd_config::load_layered_yaml(&refs)
}

pub async fn open_store() -> Result<Arc<dyn DomainStore>> {
    let pool = rtd_db::connect_from_env().await?;
    Ok(Arc::new(PgDomainStore::new(pool)))
}
