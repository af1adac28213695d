//! Per-node records.
//!
//! A [`Host`] is the authoritative record for one server node. Its identity
//! address never changes; everything else is refreshed from system table
//! rows by [`Host::set`] while connection pools and request threads use the
//! same `Arc<Host>` concurrently.

use crate::address::Address;
use crate::connection::{BoxedConnection, Connection, ExportedConnection, IoContext, ShardId};
use crate::latency::{LatencySettings, LatencyTracker};
use crate::marketplace::ConnectionMarketplace;
use crate::metadata::{Row, Value};
use crate::version::VersionNumber;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared handle to a host.
pub type HostPtr = Arc<Host>;

/// Column carrying the vendor's own product version.
pub const VENDOR_VERSION_FIELD: &str = "dse_version";

/// Server versions at or above this may be over-reported by old vendor builds.
const VENDOR_CHECK_MIN_SERVER_VERSION: VersionNumber = VersionNumber::new(4, 0, 0);
/// First vendor version that reports its server capabilities correctly.
const VENDOR_FIXED_VERSION: VersionNumber = VersionNumber::new(6, 7, 0);
/// Server version actually supported by vendor builds before the fix.
const VENDOR_FALLBACK_SERVER_VERSION: VersionNumber = VersionNumber::new(3, 11, 0);

/// Non-fatal conditions found while merging a metadata row.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostWarning {
    /// `release_version` did not parse; the previous version was kept.
    InvalidReleaseVersion,
    /// The vendor version column did not parse.
    InvalidVendorVersion,
    /// `rpc_address` was present but not a valid inet.
    InvalidRpcAddress,
    /// No `rpc_address`; the node is reachable only via its identity address.
    MissingRpcAddress,
    /// `rpc_address` is `0.0.0.0` or `::`; the identity address is used instead.
    BindAnyRpcAddress,
}

/// Mutable metadata of a host, refreshed on every topology update.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HostMetadata {
    pub rpc_address: Address,
    pub rack: String,
    pub rack_id: u32,
    pub dc: String,
    pub dc_id: u32,
    pub partitioner: String,
    pub tokens: Vec<String>,
    pub server_version: VersionNumber,
    pub vendor_version: Option<VersionNumber>,
}

impl HostMetadata {
    fn new(address: Address) -> Self {
        Self {
            rpc_address: address,
            rack: String::new(),
            rack_id: 0,
            dc: String::new(),
            dc_id: 0,
            partitioner: String::new(),
            tokens: Vec::new(),
            server_version: VersionNumber::default(),
            vendor_version: None,
        }
    }
}

/// A server node known to the driver.
pub struct Host {
    address: Address,
    address_string: String,
    metadata: RwLock<HostMetadata>,
    latency: LatencyTracker,
    connection_count: AtomicUsize,
    inflight_request_count: AtomicUsize,
    marketplace: Mutex<ConnectionMarketplace<BoxedConnection>>,
}

impl Host {
    pub fn new(address: Address) -> Self {
        Self::with_latency_settings(address, &LatencySettings::default())
    }

    pub fn with_latency_settings(address: Address, settings: &LatencySettings) -> Self {
        Self {
            address,
            address_string: address.to_string(),
            metadata: RwLock::new(HostMetadata::new(address)),
            latency: LatencyTracker::from_settings(settings),
            connection_count: AtomicUsize::new(0),
            inflight_request_count: AtomicUsize::new(0),
            marketplace: Mutex::new(ConnectionMarketplace::new()),
        }
    }

    /// Merge a freshly read `system.local` / `system.peers` row.
    ///
    /// Parse problems never fail the update: they are logged, returned as
    /// warnings, and the affected field keeps its previous value.
    pub fn set(&self, row: &dyn Row, use_tokens: bool) -> Vec<HostWarning> {
        let mut warnings = Vec::new();
        let mut meta = self.metadata.write();

        meta.rack = row.get_string_by_name("rack").unwrap_or_default();
        meta.dc = row.get_string_by_name("data_center").unwrap_or_default();

        let release_version = row.get_string_by_name("release_version").unwrap_or_default();
        match VersionNumber::parse(&release_version) {
            Ok(version) => meta.server_version = version,
            Err(_) => {
                warn!(
                    host = %self.address_string,
                    release_version = %release_version,
                    "Invalid release version string"
                );
                warnings.push(HostWarning::InvalidReleaseVersion);
            }
        }

        // Older vendor builds claim 4.0 features they do not have.
        if meta.server_version >= VENDOR_CHECK_MIN_SERVER_VERSION
            && row.get_by_name(VENDOR_VERSION_FIELD).is_some()
        {
            let vendor_version = row.get_string_by_name(VENDOR_VERSION_FIELD).unwrap_or_default();
            match VersionNumber::parse(&vendor_version) {
                Ok(version) => {
                    meta.vendor_version = Some(version);
                    if version < VENDOR_FIXED_VERSION {
                        meta.server_version = VENDOR_FALLBACK_SERVER_VERSION;
                    }
                }
                Err(_) => {
                    warn!(
                        host = %self.address_string,
                        vendor_version = %vendor_version,
                        "Invalid vendor version string"
                    );
                    warnings.push(HostWarning::InvalidVendorVersion);
                }
            }
        }

        if let Some(partitioner) = row.get_string_by_name("partitioner") {
            meta.partitioner = partitioner;
        }

        if use_tokens {
            if let Some(tokens) = row.get_by_name("tokens").and_then(Value::iter) {
                meta.tokens = tokens.map(Value::to_string).collect();
            }
        }

        match row.get_by_name("rpc_address").filter(|v| !v.is_null()) {
            Some(value) => {
                match value.as_inet(self.address.port()) {
                    Ok(rpc_address) => meta.rpc_address = rpc_address,
                    Err(err) => {
                        warn!(host = %self.address_string, error = %err, "Invalid address format for `rpc_address`");
                        warnings.push(HostWarning::InvalidRpcAddress);
                    }
                }
                if meta.rpc_address.is_bind_any() {
                    warn!(
                        host = %self.address_string,
                        "Found host with 'bind any' for rpc_address; using listen_address to contact instead. \
                         If this is incorrect you should configure a specific interface for rpc_address on the server."
                    );
                    warnings.push(HostWarning::BindAnyRpcAddress);
                }
            }
            None => {
                warn!(host = %self.address_string, "No rpc_address for host in system.local or system.peers");
                warnings.push(HostWarning::MissingRpcAddress);
            }
        }

        warnings
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn address_string(&self) -> &str {
        &self.address_string
    }

    pub fn rpc_address(&self) -> Address {
        self.metadata.read().rpc_address
    }

    pub fn has_bind_any_rpc_address(&self) -> bool {
        self.metadata.read().rpc_address.is_bind_any()
    }

    /// Address new connections should be opened to.
    pub fn connect_address(&self) -> Address {
        let rpc_address = self.rpc_address();
        if rpc_address.is_bind_any() {
            self.address
        } else {
            rpc_address
        }
    }

    pub fn rack(&self) -> String {
        self.metadata.read().rack.clone()
    }

    pub fn dc(&self) -> String {
        self.metadata.read().dc.clone()
    }

    pub fn rack_id(&self) -> u32 {
        self.metadata.read().rack_id
    }

    pub fn dc_id(&self) -> u32 {
        self.metadata.read().dc_id
    }

    /// Record the interned ids the topology assigned to this host's rack and dc.
    pub fn set_rack_and_dc_ids(&self, rack_id: u32, dc_id: u32) {
        let mut meta = self.metadata.write();
        meta.rack_id = rack_id;
        meta.dc_id = dc_id;
    }

    pub fn partitioner(&self) -> String {
        self.metadata.read().partitioner.clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.metadata.read().tokens.clone()
    }

    pub fn server_version(&self) -> VersionNumber {
        self.metadata.read().server_version
    }

    pub fn vendor_version(&self) -> Option<VersionNumber> {
        self.metadata.read().vendor_version
    }

    /// Consistent copy of all mutable metadata.
    pub fn metadata(&self) -> HostMetadata {
        self.metadata.read().clone()
    }

    pub fn latency_tracker(&self) -> &LatencyTracker {
        &self.latency
    }

    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::Relaxed)
    }

    pub fn increment_connection_count(&self) {
        self.connection_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_connection_count(&self) {
        saturating_decrement(&self.connection_count);
    }

    pub fn inflight_request_count(&self) -> usize {
        self.inflight_request_count.load(Ordering::Relaxed)
    }

    pub fn increment_inflight_requests(&self) {
        self.inflight_request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_inflight_requests(&self) {
        saturating_decrement(&self.inflight_request_count);
    }

    /// Hand an idle connection to this host's marketplace.
    pub fn deposit_connection(&self, connection: BoxedConnection) {
        let mut marketplace = self.marketplace.lock();
        debug!(
            shard = connection.shard_id(),
            host = %self.address_string,
            "Connection marketplace consumes a connection"
        );
        marketplace.deposit(connection);
    }

    /// Take up to `how_many` idle connections to `shard_id`, oldest first.
    pub fn withdraw_connections(
        &self,
        shard_id: ShardId,
        how_many: usize,
    ) -> Vec<ExportedConnection<BoxedConnection>> {
        let mut marketplace = self.marketplace.lock();
        debug!(
            how_many,
            shard = shard_id,
            host = %self.address_string,
            "Requesting connections from the marketplace"
        );
        marketplace.withdraw(shard_id, how_many)
    }

    /// Close every idle connection, re-activating each on `ctx` first.
    pub fn close_idle_connections(&self, ctx: &dyn IoContext) -> usize {
        let mut marketplace = self.marketplace.lock();
        let closed = marketplace.close_all(ctx);
        debug!(closed, host = %self.address_string, context = ctx.name(), "Closed idle connections");
        closed
    }

    pub fn idle_connection_count(&self) -> usize {
        self.marketplace.lock().total_idle()
    }

    pub fn idle_connections_on_shard(&self, shard_id: ShardId) -> usize {
        self.marketplace.lock().idle_count(shard_id)
    }
}

fn saturating_decrement(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("address", &self.address)
            .field("metadata", &*self.metadata.read())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address_string)
    }
}
