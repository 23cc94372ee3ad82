//! rtd-config
//!
//! Layered YAML configuration for the runtime-domain reconciler.
//!
//! Later documents override earlier ones (deep merge). The merged document is
//! canonicalised to JSON and hashed so operators can tell at a glance which
//! effective config a replica booted with. Secrets never appear as literal
//! values; config stores the NAME of the env var that holds them.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

pub mod secrets;
pub mod settings;

pub use secrets::{resolve_gateway_keys, ResolvedGatewayKeys};
pub use settings::{
    GatewayConfig, ReconcilerConfig, RegionEntry, RegionsConfig, ENV_DISABLED_GATEWAY_TASK,
    MAX_LOCK_TIMEOUT_SECS, MAX_TICK_INTERVAL_MS,
};

/// Comma-separated list of config paths, in merge order.
pub const ENV_CONFIG_PATHS: &str = "RTD_CONFIG";

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // Stripe / OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
];

/// Which binary is reading the config. Each consumer has its own registry of
/// JSON-pointer prefixes it actually reads; anything else is "unused".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigConsumer {
    Daemon,
    Cli,
}

impl ConfigConsumer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigConsumer::Daemon => "DAEMON",
            ConfigConsumer::Cli => "CLI",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub consumer: String,
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Minimal set of unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Registry of consumed JSON-pointer prefixes per consumer.
///
/// Must reflect what the code ACTUALLY reads today:
/// - `ReconcilerConfig::from_config_json`  /reconciler
/// - `RegionsConfig::from_config_json`     /regions, /default_region
/// - `GatewayConfig::from_config_json`     /gateway
pub fn consumed_pointers_for(consumer: ConfigConsumer) -> &'static [&'static str] {
    match consumer {
        ConfigConsumer::Daemon => &["/reconciler", "/regions", "/default_region", "/gateway"],
        // `rtd reconcile tick` loads and validates the whole reconciler
        // section even though a single tick never waits on the interval.
        ConfigConsumer::Cli => &["/reconciler", "/regions", "/default_region", "/gateway"],
    }
}

/// Produce an unused-key report for a given consumer.
///
/// `Warn` always returns the report; `Fail` turns a non-empty report into
/// a `CONFIG_UNUSED_KEYS` error.
pub fn report_unused_keys(
    consumer: ConfigConsumer,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = consumed_pointers_for(consumer)
        .iter()
        .map(|p| normalize_pointer(p))
        .collect();

    let unused: BTreeSet<String> = leaves(config_json)
        .into_iter()
        .map(|(ptr, _)| ptr)
        .filter(|ptr| !consumed.iter().any(|c| covers(c, ptr)))
        .collect();

    let report = UnusedKeyReport {
        consumer: consumer.as_str().to_string(),
        consumed_prefixes: consumed.into_iter().collect(),
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(12)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS (consumer={}): {} key(s) not read by this binary: {}",
            report.consumer,
            report.unused_leaf_pointers.len(),
            shown.join(", ")
        );
    }

    Ok(report)
}

/// Leading slash, no trailing slash (except the root pointer itself).
fn normalize_pointer(p: &str) -> String {
    let body = p.trim().trim_matches('/');
    format!("/{body}")
}

/// Whether consuming `prefix` also consumes `leaf`. Matches whole pointer
/// segments only: `/gateway` covers `/gateway/x` but not `/gateway_extra`.
fn covers(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match leaf.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Every scalar in `root` with its JSON pointer. The root scalar (if the
/// whole document is one) is reported as `/`.
fn leaves(root: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), root)];
    while let Some((ptr, v)) = stack.pop() {
        match v {
            Value::Object(map) => {
                for (k, child) in map {
                    let token = k.replace('~', "~0").replace('/', "~1");
                    stack.push((format!("{ptr}/{token}"), child));
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    stack.push((format!("{ptr}/{i}"), child));
                }
            }
            _ if ptr.is_empty() => out.push(("/".to_string(), v)),
            _ => out.push((ptr, v)),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// An empty document: every typed view falls back to its defaults.
    pub fn empty() -> Result<Self> {
        load_layered_yaml_from_strings(&[])
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

/// Load config from the paths listed in `RTD_CONFIG` (comma-separated).
/// Unset or empty => empty config (all defaults).
pub fn load_from_env() -> Result<LoadedConfig> {
    let raw = std::env::var(ENV_CONFIG_PATHS).unwrap_or_default();
    let paths = split_paths(&raw);
    if paths.is_empty() {
        return LoadedConfig::empty();
    }
    load_layered_yaml(&paths)
}

fn split_paths(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    // Earlier docs are base, later docs override.
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        if raw.trim().is_empty() {
            continue;
        }
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        // An empty YAML document parses as null; treat it as "no overrides".
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; anything else in `overlay` replaces `base`.
fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(over)) => {
            for (k, v) in over {
                let prior = merged.remove(&k).unwrap_or(Value::Null);
                merged.insert(k, deep_merge(prior, v));
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay,
    }
}

/// `serde_json::Map` is BTreeMap-backed here (no `preserve_order`), so the
/// serialized key order is sorted regardless of YAML source order.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let hit = leaves(v)
        .into_iter()
        .find(|(_, leaf)| leaf.as_str().is_some_and(looks_like_secret));
    if let Some((ptr, _)) = hit {
        bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED");
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pointer_respects_segment_boundary() {
        assert!(covers("/regions", "/regions/0/name"));
        assert!(covers("/gateway", "/gateway"));
        assert!(!covers("/gateway", "/gateway_extra/x"));
        assert!(covers("/", "/anything"));
    }

    #[test]
    fn split_paths_ignores_blanks() {
        assert_eq!(
            split_paths(" config/base.yaml, ,config/prod.yaml "),
            vec!["config/base.yaml", "config/prod.yaml"]
        );
        assert!(split_paths("").is_empty());
    }

    #[test]
    fn empty_document_yields_empty_object() {
        let loaded = load_layered_yaml_from_strings(&["", "   \n"]).unwrap();
        assert_eq!(loaded.config_json, serde_json::json!({}));
    }
}
