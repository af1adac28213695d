//! Copy-on-write cluster membership.
//!
//! Load-balancing policies iterate the host list on every request, while
//! membership changes only when topology refresh notices a node joining or
//! leaving. [`HostTopology`] therefore keeps an immutable snapshot behind an
//! atomic pointer: readers load it without locking, writers clone it, edit the
//! clone and publish it with one swap. A published snapshot is never
//! modified, so a reader holding one sees a stable list for as long as it
//! keeps it.

use crate::address::Address;
use crate::host::{Host, HostPtr};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Immutable point-in-time list of hosts.
pub type HostSnapshot = Arc<Vec<HostPtr>>;

/// Result of [`HostTopology::add`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// The address was new and the host was appended.
    Added,
    /// A host with the same address was replaced in place.
    Replaced,
}

/// A single membership edit.
#[derive(Clone, Debug)]
pub enum TopologyChange {
    Add(HostPtr),
    Remove(Address),
}

/// What a [`TopologyChange`] did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChangeOutcome {
    Added,
    Replaced,
    Removed,
    NotFound,
}

/// Outcome of a change plus the generation of the snapshot it left behind.
///
/// Generations increase by one per published snapshot, in the order writers
/// acquired the writer lock. A `NotFound` removal publishes nothing and
/// reports the unchanged current generation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AppliedChange {
    pub generation: u64,
    pub outcome: ChangeOutcome,
}

pub struct HostTopology {
    hosts: ArcSwap<Vec<HostPtr>>,
    /// Serializes writers and counts published snapshots; readers never take it.
    writer: Mutex<u64>,
}

impl HostTopology {
    pub fn new() -> Self {
        Self::from_hosts(Vec::new())
    }

    pub fn from_hosts(hosts: impl IntoIterator<Item = HostPtr>) -> Self {
        let topology = Self {
            hosts: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(0),
        };
        for host in hosts {
            topology.add(host);
        }
        topology
    }

    /// Current snapshot. Wait-free.
    pub fn snapshot(&self) -> HostSnapshot {
        self.hosts.load_full()
    }

    /// Number of snapshots published so far.
    pub fn generation(&self) -> u64 {
        *self.writer.lock()
    }

    /// Insert `host`, replacing any host with the same address in place.
    pub fn add(&self, host: HostPtr) -> AddOutcome {
        match self.apply(TopologyChange::Add(host)).outcome {
            ChangeOutcome::Replaced => AddOutcome::Replaced,
            _ => AddOutcome::Added,
        }
    }

    /// Remove the host with `address`. Returns whether one was found.
    ///
    /// Nothing is published when the address is unknown.
    pub fn remove(&self, address: &Address) -> bool {
        self.apply(TopologyChange::Remove(*address)).outcome == ChangeOutcome::Removed
    }

    pub fn remove_host(&self, host: &Host) -> bool {
        self.remove(host.address())
    }

    /// Apply one edit and publish the resulting snapshot.
    pub fn apply(&self, change: TopologyChange) -> AppliedChange {
        let mut generation = self.writer.lock();
        let current = self.hosts.load_full();

        let (hosts, outcome) = match change {
            TopologyChange::Add(host) => {
                let mut hosts = Vec::clone(&current);
                match hosts.iter_mut().find(|h| h.address() == host.address()) {
                    Some(slot) => {
                        *slot = host;
                        (hosts, ChangeOutcome::Replaced)
                    }
                    None => {
                        hosts.push(host);
                        (hosts, ChangeOutcome::Added)
                    }
                }
            }
            TopologyChange::Remove(address) => {
                let Some(index) = current.iter().position(|h| *h.address() == address) else {
                    return AppliedChange {
                        generation: *generation,
                        outcome: ChangeOutcome::NotFound,
                    };
                };
                let mut hosts = Vec::clone(&current);
                hosts.remove(index);
                (hosts, ChangeOutcome::Removed)
            }
        };

        self.hosts.store(Arc::new(hosts));
        *generation += 1;
        AppliedChange {
            generation: *generation,
            outcome,
        }
    }

    pub fn get(&self, address: &Address) -> Option<HostPtr> {
        self.hosts
            .load()
            .iter()
            .find(|h| h.address() == address)
            .cloned()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.hosts.load().iter().any(|h| h.address() == address)
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.hosts.load().iter().map(|h| *h.address()).collect()
    }

    pub fn len(&self) -> usize {
        self.hosts.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.load().is_empty()
    }
}

impl Default for HostTopology {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.addresses()).finish()
    }
}
