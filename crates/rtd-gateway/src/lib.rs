//! rtd-gateway
//!
//! The two external collaborators of the reconciler: the API gateway that
//! serves runtime routes, and the region directory that says which gateway
//! an application lives behind.

pub mod apisix;
pub mod gateway;
pub mod region;

pub use apisix::{route_id_for, ApisixClient};
pub use gateway::{GatewayClient, GatewayError};
pub use region::{RegionDirectory, RegionError, StaticRegionDirectory};
