//! Scenario: the APISIX client speaks the admin API.
//!
//! # Invariants under test
//! 1. Create is a PUT to `/apisix/admin/routes/app-<appId>` carrying the
//!    region's admin key and the domain as host.
//! 2. Delete of a route the gateway no longer has succeeds.
//! 3. Non-success statuses surface as `GatewayError::Api`.
//! 4. A region without a resolved key fails before any request is sent.

use std::time::Duration;

use httpmock::prelude::*;
use rtd_config::ResolvedGatewayKeys;
use rtd_gateway::{ApisixClient, GatewayClient, GatewayError};
use rtd_schemas::{GatewayConf, Region};
use serde_json::json;

fn region(admin_url: String) -> Region {
    Region {
        name: "eu".to_string(),
        gateway: GatewayConf {
            admin_url,
            api_key_env: "RTD_TEST_GW_KEY_EU".to_string(),
            upstream_template: "app-{app_id}.runtime.svc:8000".to_string(),
        },
    }
}

fn client() -> ApisixClient {
    ApisixClient::new(
        ResolvedGatewayKeys::from_pairs([("eu", "admin-key-eu")]),
        Duration::from_secs(5),
    )
    .expect("client")
}

#[tokio::test]
async fn create_puts_route_with_admin_key_and_host() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/apisix/admin/routes/app-a1")
                .header("X-API-KEY", "admin-key-eu")
                .json_body_partial(
                    r#"{"hosts":["a1.example.dev"],"uri":"/*","upstream":{"nodes":{"app-a1.runtime.svc:8000":1}}}"#,
                );
            then.status(201)
                .json_body(json!({"key": "/apisix/routes/app-a1", "value": {"id": "app-a1"}}));
        })
        .await;

    let handle = client()
        .create_app_route(&region(server.base_url()), "a1", "a1.example.dev")
        .await
        .expect("create");

    m.assert_async().await;
    assert_eq!(handle.route_id, "app-a1");
    assert_eq!(handle.region, "eu");
    assert_eq!(handle.raw["value"]["id"], "app-a1");
}

#[tokio::test]
async fn delete_of_missing_route_is_success() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/apisix/admin/routes/app-a1");
            then.status(404)
                .json_body(json!({"message": "Key not found"}));
        })
        .await;

    let handle = client()
        .delete_app_route(&region(server.base_url()), "a1")
        .await
        .expect("404 on delete must be treated as deleted");

    m.assert_async().await;
    assert_eq!(handle.route_id, "app-a1");
    assert!(handle.raw.is_null());
}

#[tokio::test]
async fn server_error_surfaces_as_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/apisix/admin/routes/app-a1");
            then.status(503)
                .json_body(json!({"error_msg": "etcd unavailable"}));
        })
        .await;

    let err = client()
        .create_app_route(&region(server.base_url()), "a1", "a1.example.dev")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GatewayError::Api {
            status: 503,
            message: "etcd unavailable".to_string()
        }
    );
}

#[tokio::test]
async fn missing_admin_key_fails_without_request() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.any_request();
            then.status(200);
        })
        .await;

    let keyless = ApisixClient::new(ResolvedGatewayKeys::default(), Duration::from_secs(5))
        .expect("client");
    let err = keyless
        .delete_app_route(&region(server.base_url()), "a1")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Config(ref msg) if msg.contains("RTD_TEST_GW_KEY_EU")));
    m.assert_hits_async(0).await;
}
