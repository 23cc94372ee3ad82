//! Typed views over the merged config document.
//!
//! Each view reads one section by JSON pointer and fills in defaults for
//! absent keys, so an empty config is a valid (single-replica, dev) config.
//!
//! ```yaml
//! reconciler:
//!   disabled: false
//!   lock_timeout_secs: 30
//!   tick_interval_ms: 1000
//! gateway:
//!   request_timeout_secs: 10
//! default_region: default
//! regions:
//!   - name: default
//!     gateway:
//!       admin_url: http://apisix-admin:9180
//!       api_key_env: RTD_APISIX_KEY_DEFAULT
//!       upstream_template: "{app_id}.runtime.svc.cluster.local:8000"
//!     apps: []
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rtd_schemas::{GatewayConf, Region};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Maintenance override: when truthy, every tick is short-circuited.
pub const ENV_DISABLED_GATEWAY_TASK: &str = "RTD_DISABLED_GATEWAY_TASK";

pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;

/// Upper bounds keep lease arithmetic and timer setup well inside the
/// representable range.
pub const MAX_LOCK_TIMEOUT_SECS: u64 = 86_400;
pub const MAX_TICK_INTERVAL_MS: u64 = 3_600_000;

fn section<T: DeserializeOwned + Default>(config_json: &Value, pointer: &str) -> Result<T> {
    match config_json.pointer(pointer) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v.clone())
            .with_context(|| format!("invalid config section {pointer}")),
    }
}

// ---------------------------------------------------------------------------
// /reconciler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerConfig {
    pub disabled: bool,
    pub lock_timeout_secs: u64,
    pub tick_interval_ms: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let cfg: Self = section(config_json, "/reconciler")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Also run by consumers that build the struct by hand.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_LOCK_TIMEOUT_SECS).contains(&self.lock_timeout_secs) {
            bail!(
                "reconciler.lock_timeout_secs must be in 1..={MAX_LOCK_TIMEOUT_SECS}, got {}",
                self.lock_timeout_secs
            );
        }
        if !(1..=MAX_TICK_INTERVAL_MS).contains(&self.tick_interval_ms) {
            bail!(
                "reconciler.tick_interval_ms must be in 1..={MAX_TICK_INTERVAL_MS}, got {}",
                self.tick_interval_ms
            );
        }
        Ok(())
    }

    /// Apply `RTD_DISABLED_GATEWAY_TASK` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        let raw = std::env::var(ENV_DISABLED_GATEWAY_TASK).ok();
        self.with_disabled_override(raw.as_deref())
    }

    /// Pure form of [`Self::with_env_overrides`]. An unset or blank value
    /// leaves the config untouched.
    pub fn with_disabled_override(mut self, raw: Option<&str>) -> Result<Self> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(self);
        };
        self.disabled = match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => bail!("{ENV_DISABLED_GATEWAY_TASK} must be a boolean, got '{other}'"),
        };
        Ok(self)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// /gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_GATEWAY_TIMEOUT_SECS,
        }
    }
}

impl GatewayConfig {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let cfg: Self = section(config_json, "/gateway")?;
        if cfg.request_timeout_secs == 0 {
            bail!("gateway.request_timeout_secs must be > 0");
        }
        Ok(cfg)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// /regions + /default_region
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionEntry {
    pub name: String,
    pub gateway: GatewayConf,
    /// Application ids deployed in this region.
    #[serde(default)]
    pub apps: Vec<String>,
}

impl RegionEntry {
    pub fn region(&self) -> Region {
        Region {
            name: self.name.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionsConfig {
    pub regions: Vec<RegionEntry>,
    /// Region serving applications that no entry lists explicitly.
    pub default_region: Option<String>,
}

impl RegionsConfig {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let regions: Vec<RegionEntry> = section(config_json, "/regions")?;
        let default_region: Option<String> = section(config_json, "/default_region")?;
        let cfg = Self {
            regions,
            default_region,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        let mut apps = BTreeSet::new();
        for r in &self.regions {
            if r.name.trim().is_empty() {
                bail!("regions: region name must not be empty");
            }
            if !names.insert(r.name.as_str()) {
                bail!("regions: duplicate region name '{}'", r.name);
            }
            if r.gateway.admin_url.trim().is_empty() {
                bail!("regions.{}: gateway.admin_url must not be empty", r.name);
            }
            for app in &r.apps {
                if !apps.insert(app.as_str()) {
                    bail!("regions: app '{}' is bound to more than one region", app);
                }
            }
        }
        if let Some(d) = &self.default_region {
            if !names.contains(d.as_str()) {
                bail!("default_region '{}' does not name a configured region", d);
            }
        }
        Ok(())
    }
}
