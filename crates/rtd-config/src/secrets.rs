//! Gateway admin-key resolution.
//!
//! Config stores only the NAME of the env var holding each region's admin
//! key. Callers resolve them once at startup with [`resolve_gateway_keys`]
//! and hand the result to the gateway client; nothing else reads these env
//! vars. `Debug` output never shows key values.

use std::collections::BTreeMap;

use crate::settings::RegionsConfig;

/// Admin keys per region name.
#[derive(Clone, Default)]
pub struct ResolvedGatewayKeys {
    keys: BTreeMap<String, String>,
    /// Regions whose named env var was absent or empty.
    missing: Vec<(String, String)>,
}

impl std::fmt::Debug for ResolvedGatewayKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted: BTreeMap<&str, &str> = self
            .keys
            .keys()
            .map(|k| (k.as_str(), "<REDACTED>"))
            .collect();
        f.debug_struct("ResolvedGatewayKeys")
            .field("keys", &redacted)
            .field("missing", &self.missing)
            .finish()
    }
}

impl ResolvedGatewayKeys {
    /// Build directly from (region, key) pairs. Used by tests and tools that
    /// source keys from somewhere other than the process environment.
    pub fn from_pairs<I, R, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (R, K)>,
        R: Into<String>,
        K: Into<String>,
    {
        Self {
            keys: pairs
                .into_iter()
                .map(|(r, k)| (r.into(), k.into()))
                .collect(),
            missing: Vec::new(),
        }
    }

    pub fn key_for(&self, region: &str) -> Option<&str> {
        self.keys.get(region).map(String::as_str)
    }

    /// `(region, env var name)` for every region without a key.
    pub fn missing(&self) -> &[(String, String)] {
        &self.missing
    }
}

/// Resolve every region's admin key from the process environment.
///
/// Missing keys are recorded, not fatal: a region without a key fails its
/// gateway calls (and is retried) while the other regions keep working.
pub fn resolve_gateway_keys(regions: &RegionsConfig) -> ResolvedGatewayKeys {
    resolve_gateway_keys_with(regions, |name| std::env::var(name).ok())
}

/// Same as [`resolve_gateway_keys`] with an injectable lookup.
pub fn resolve_gateway_keys_with<F>(regions: &RegionsConfig, lookup: F) -> ResolvedGatewayKeys
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = ResolvedGatewayKeys::default();
    for r in &regions.regions {
        let env_name = r.gateway.api_key_env.as_str();
        match lookup(env_name).filter(|v| !v.trim().is_empty()) {
            Some(v) => {
                out.keys.insert(r.name.clone(), v);
            }
            None => out.missing.push((r.name.clone(), env_name.to_string())),
        }
    }
    out
}
