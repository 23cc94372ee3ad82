//! rtd-testkit
//!
//! In-process fakes for the reconciler's collaborators plus a [`Harness`]
//! that wires them to a [`MemDomainStore`]. Test-only; no production crate
//! depends on this.

pub mod clock;
pub mod fakes;
pub mod harness;
pub mod outage;

pub use clock::ManualClock;
pub use fakes::{test_region, CallKind, FakeGateway, FakeRegions, GatewayCall};
pub use harness::Harness;
pub use outage::{OutageStore, StoreOp};

pub use rtd_db::MemDomainStore;
