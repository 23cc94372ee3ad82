//! Region lookup: which gateway an application is served from.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use rtd_config::RegionsConfig;
use rtd_schemas::Region;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    /// The application has no region. The record is left leased and
    /// retried after the lock timeout.
    NotFound { app_id: String },
    /// The directory itself failed.
    Lookup(String),
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionError::NotFound { app_id } => write!(f, "no region for app '{app_id}'"),
            RegionError::Lookup(msg) => write!(f, "region lookup failed: {msg}"),
        }
    }
}

impl std::error::Error for RegionError {}

#[async_trait]
pub trait RegionDirectory: Send + Sync {
    async fn find_region(&self, app_id: &str) -> Result<Region, RegionError>;
}

/// Region directory backed by the `regions` config section.
///
/// Apps listed under a region map to it; anything else falls back to
/// `default_region` when one is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticRegionDirectory {
    by_app: BTreeMap<String, Region>,
    fallback: Option<Region>,
}

impl StaticRegionDirectory {
    pub fn from_config(cfg: &RegionsConfig) -> Self {
        let mut by_app = BTreeMap::new();
        for entry in &cfg.regions {
            let region = entry.region();
            for app in &entry.apps {
                by_app.insert(app.clone(), region.clone());
            }
        }
        let fallback = cfg.default_region.as_deref().and_then(|name| {
            cfg.regions
                .iter()
                .find(|r| r.name == name)
                .map(|r| r.region())
        });
        Self { by_app, fallback }
    }

    pub fn is_empty(&self) -> bool {
        self.by_app.is_empty() && self.fallback.is_none()
    }
}

#[async_trait]
impl RegionDirectory for StaticRegionDirectory {
    async fn find_region(&self, app_id: &str) -> Result<Region, RegionError> {
        self.by_app
            .get(app_id)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| RegionError::NotFound {
                app_id: app_id.to_string(),
            })
    }
}
