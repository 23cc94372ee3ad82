//! APISIX admin-API gateway client.
//!
//! One route per application, keyed `app-<appId>`, so create is a PUT that
//! overwrites and delete is keyed by app alone. Admin keys come from
//! [`ResolvedGatewayKeys`]; they are sent as `X-API-KEY` and never logged.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use rtd_config::ResolvedGatewayKeys;
use rtd_schemas::{Region, RouteHandle};
use serde::Serialize;
use serde_json::Value;

use crate::gateway::{GatewayClient, GatewayError};

const ADMIN_KEY_HEADER: &str = "X-API-KEY";
const ROUTE_PRIORITY: i64 = 9;

pub fn route_id_for(app_id: &str) -> String {
    format!("app-{app_id}")
}

#[derive(Debug, Serialize)]
struct RouteBody<'a> {
    name: String,
    uri: &'static str,
    hosts: [&'a str; 1],
    priority: i64,
    enable_websocket: bool,
    upstream: UpstreamBody,
}

#[derive(Debug, Serialize)]
struct UpstreamBody {
    #[serde(rename = "type")]
    kind: &'static str,
    pass_host: &'static str,
    nodes: serde_json::Map<String, Value>,
}

fn route_body<'a>(region: &Region, app_id: &str, domain: &'a str) -> RouteBody<'a> {
    let node = region.gateway.upstream_template.replace("{app_id}", app_id);
    let mut nodes = serde_json::Map::new();
    nodes.insert(node, Value::from(1));
    RouteBody {
        name: route_id_for(app_id),
        uri: "/*",
        hosts: [domain],
        priority: ROUTE_PRIORITY,
        enable_websocket: true,
        upstream: UpstreamBody {
            kind: "roundrobin",
            pass_host: "pass",
            nodes,
        },
    }
}

#[derive(Debug, Clone)]
pub struct ApisixClient {
    keys: ResolvedGatewayKeys,
    http: reqwest::Client,
}

impl ApisixClient {
    pub fn new(keys: ResolvedGatewayKeys, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("build gateway http client failed")?;
        Ok(Self { keys, http })
    }

    fn route_url(region: &Region, route_id: &str) -> String {
        format!(
            "{}/apisix/admin/routes/{}",
            region.gateway.admin_url.trim_end_matches('/'),
            route_id
        )
    }

    fn admin_key<'a>(&'a self, region: &Region) -> Result<&'a str, GatewayError> {
        self.keys.key_for(&region.name).ok_or_else(|| {
            GatewayError::Config(format!(
                "no admin key for region '{}' (env var {} unset)",
                region.name, region.gateway.api_key_env
            ))
        })
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value, GatewayError> {
    let text = resp
        .text()
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))
}

/// Pull APISIX's `error_msg` out of an error body, falling back to the raw text.
async fn error_message(resp: reqwest::Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v.get("error_msg").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(text)
}

#[async_trait]
impl GatewayClient for ApisixClient {
    async fn create_app_route(
        &self,
        region: &Region,
        app_id: &str,
        domain: &str,
    ) -> Result<RouteHandle, GatewayError> {
        let key = self.admin_key(region)?;
        let route_id = route_id_for(app_id);
        let resp = self
            .http
            .put(Self::route_url(region, &route_id))
            .header(ADMIN_KEY_HEADER, key)
            .json(&route_body(region, app_id, domain))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: error_message(resp).await,
            });
        }

        let raw = read_json(resp).await?;
        tracing::debug!(region = %region.name, %route_id, %domain, "gateway route upserted");
        Ok(RouteHandle {
            route_id,
            region: region.name.clone(),
            raw,
        })
    }

    async fn delete_app_route(
        &self,
        region: &Region,
        app_id: &str,
    ) -> Result<RouteHandle, GatewayError> {
        let key = self.admin_key(region)?;
        let route_id = route_id_for(app_id);
        let resp = self
            .http
            .delete(Self::route_url(region, &route_id))
            .header(ADMIN_KEY_HEADER, key)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = resp.status();
        // Already gone counts as deleted.
        let raw = if status == StatusCode::NOT_FOUND {
            Value::Null
        } else if status.is_success() {
            read_json(resp).await?
        } else {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: error_message(resp).await,
            });
        };

        tracing::debug!(region = %region.name, %route_id, "gateway route removed");
        Ok(RouteHandle {
            route_id,
            region: region.name.clone(),
            raw,
        })
    }
}
