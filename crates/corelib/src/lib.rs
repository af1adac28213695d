//! Cluster host and connection-lifecycle core of the driver.
//!
//! This crate tracks every known server node and the state attached to it:
//! - Node identity, versions and topology metadata (`host`)
//! - A wait-free-for-readers membership snapshot (`topology`)
//! - Time-decayed latency estimates for load balancing (`latency`)
//! - A per-shard exchange of idle connections (`marketplace`)
//! - Adapters for external host state callbacks (`listener`)

pub mod address;
pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod latency;
pub mod listener;
pub mod marketplace;
pub mod metadata;
pub mod topology;
pub mod version;

pub use address::{Address, Inet};
pub use config::CoreConfig;
pub use connection::{BoxedConnection, Connection, ExportedConnection, IoContext, ShardId};
pub use error::{Error, Result};
pub use host::{Host, HostMetadata, HostPtr, HostWarning};
pub use latency::{LatencySettings, LatencyTracker, TimestampedAverage};
pub use listener::{ExternalHostListener, HostEvent, HostListener};
pub use marketplace::ConnectionMarketplace;
pub use metadata::{MapRow, Row, Value};
pub use topology::{
    AddOutcome, AppliedChange, ChangeOutcome, HostSnapshot, HostTopology, TopologyChange,
};
pub use version::VersionNumber;
