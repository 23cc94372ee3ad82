//! Gateway client boundary.

use std::fmt;

use async_trait::async_trait;
use rtd_schemas::{Region, RouteHandle};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a [`GatewayClient`] implementation may return.
///
/// Every variant is treated as retryable by the reconciler: the record keeps
/// its phase and is picked up again once its lease expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Network or transport failure (connect, timeout, TLS).
    Transport(String),
    /// The gateway answered with a non-success status.
    Api { status: u16, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// The region is not usable (e.g. its admin key is missing).
    Config(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Transport(msg) => write!(f, "gateway transport error: {msg}"),
            GatewayError::Api { status, message } => {
                write!(f, "gateway api error status={status}: {message}")
            }
            GatewayError::Decode(msg) => write!(f, "gateway decode error: {msg}"),
            GatewayError::Config(msg) => write!(f, "gateway config error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Creates and deletes the route that exposes an application on its domain.
///
/// Both calls must be idempotent on the gateway side: a create for an
/// existing route overwrites it, a delete for a missing route succeeds. The
/// reconciler relies on this when it retries after a crash between the
/// gateway call and the phase write.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn create_app_route(
        &self,
        region: &Region,
        app_id: &str,
        domain: &str,
    ) -> Result<RouteHandle, GatewayError>;

    async fn delete_app_route(
        &self,
        region: &Region,
        app_id: &str,
    ) -> Result<RouteHandle, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_api_error_carries_status() {
        let err = GatewayError::Api {
            status: 401,
            message: "wrong admin key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "gateway api error status=401: wrong admin key"
        );
    }

    #[test]
    fn gateway_error_is_std_error() {
        let err: Box<dyn std::error::Error> =
            Box::new(GatewayError::Transport("connection refused".to_string()));
        assert!(err.to_string().contains("connection refused"));
    }
}
