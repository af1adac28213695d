//! Integration tests for host topology, host metadata and the marketplace.
//!
//! # Test Strategy
//!
//! 1. **Membership**: add/replace/remove semantics on the shared topology
//! 2. **Metadata refresh**: replaced hosts carry the newest metadata
//! 3. **Snapshots**: readers are isolated from concurrent writers
//! 4. **Concurrency**: 8 writers racing, replayed in lock-acquisition order
//! 5. **Lifecycle**: hosts die with their last holder

use corelib::connection::{Connection, IoContext, ShardId};
use corelib::metadata::{MapRow, Value};
use corelib::topology::{AppliedChange, ChangeOutcome, HostTopology, TopologyChange};
use corelib::{Address, Host, HostPtr, VersionNumber};
use proptest::prelude::*;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

fn addr(last: u8) -> Address {
    Address::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), 9042)
}

fn host_with_version(last: u8, release_version: &str) -> HostPtr {
    let host = Host::new(addr(last));
    let row = MapRow::new()
        .with_text("rack", "r1")
        .with_text("data_center", "dc1")
        .with_text("release_version", release_version)
        .with("rpc_address", Value::Inet(vec![10, 0, 0, last]));
    host.set(&row, false);
    Arc::new(host)
}

// ============================================================================
// Membership Tests
// ============================================================================

#[test]
fn test_add_same_address_keeps_one_entry_with_newest_metadata() {
    let topology = HostTopology::new();
    topology.add(host_with_version(1, "3.0.0"));
    topology.add(host_with_version(2, "3.0.0"));
    topology.add(host_with_version(3, "3.0.0"));

    topology.add(host_with_version(2, "4.0.0"));

    let snapshot = topology.snapshot();
    assert_eq!(snapshot.len(), 3);
    let addresses: Vec<Address> = snapshot.iter().map(|h| *h.address()).collect();
    assert_eq!(addresses, vec![addr(1), addr(2), addr(3)], "position must be preserved");
    assert_eq!(snapshot[1].server_version(), VersionNumber::new(4, 0, 0));
}

#[test]
fn test_remove_missing_address_reports_not_found() {
    let topology = HostTopology::from_hosts([host_with_version(1, "3.11.0")]);
    let before = topology.snapshot();
    let generation = topology.generation();

    assert!(!topology.remove(&addr(42)));
    assert!(Arc::ptr_eq(&before, &topology.snapshot()));
    assert_eq!(topology.generation(), generation);
}

// ============================================================================
// Snapshot Isolation Tests
// ============================================================================

#[test]
fn test_reader_snapshot_never_sees_later_add() {
    let topology = Arc::new(HostTopology::from_hosts([host_with_version(1, "3.11.0")]));
    let snapshot = topology.snapshot();

    let writer = {
        let topology = Arc::clone(&topology);
        std::thread::spawn(move || {
            for last in 2..50 {
                topology.add(host_with_version(last, "3.11.0"));
            }
        })
    };
    writer.join().unwrap();

    assert_eq!(snapshot.len(), 1);
    assert_eq!(*snapshot[0].address(), addr(1));
    assert_eq!(topology.len(), 49);
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[test]
fn test_concurrent_writers_match_sequential_replay() {
    const WRITERS: usize = 8;
    const OPS_PER_WRITER: usize = 300;

    let (a, b) = (addr(1), addr(2));
    let topology = HostTopology::from_hosts([host_with_version(1, "3.11.0"), host_with_version(2, "3.11.0")]);
    let initial: Vec<HostPtr> = topology.snapshot().to_vec();
    let base_generation = topology.generation();
    let done = AtomicBool::new(false);
    let reads = AtomicUsize::new(0);

    let records: Vec<(TopologyChange, AppliedChange)> = crossbeam::thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|_| {
                while !done.load(Ordering::Acquire) {
                    let snapshot = topology.snapshot();
                    let unique: HashSet<Address> = snapshot.iter().map(|h| *h.address()).collect();
                    assert_eq!(unique.len(), snapshot.len(), "duplicate address in snapshot");
                    assert!(unique.iter().all(|x| *x == a || *x == b));
                    reads.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let topology = &topology;
                s.spawn(move |_| {
                    let mut records = Vec::with_capacity(OPS_PER_WRITER);
                    for i in 0..OPS_PER_WRITER {
                        let step = w * 7 + i * 13;
                        let last = if step % 2 == 0 { 1 } else { 2 };
                        let change = if step % 3 == 0 {
                            TopologyChange::Remove(addr(last))
                        } else {
                            TopologyChange::Add(Arc::new(Host::new(addr(last))))
                        };
                        let applied = topology.apply(change.clone());
                        records.push((change, applied));
                    }
                    records
                })
            })
            .collect();

        let joined: Vec<_> = writers.into_iter().map(|h| h.join()).collect();
        done.store(true, Ordering::Release);
        joined.into_iter().flat_map(|r| r.unwrap()).collect()
    })
    .unwrap();

    assert!(reads.load(Ordering::Relaxed) > 0);

    // Published changes must form a gapless sequence of generations.
    let mut published: Vec<&(TopologyChange, AppliedChange)> = records
        .iter()
        .filter(|(_, applied)| applied.outcome != ChangeOutcome::NotFound)
        .collect();
    published.sort_by_key(|(_, applied)| applied.generation);
    for (offset, (_, applied)) in published.iter().enumerate() {
        assert_eq!(applied.generation, base_generation + 1 + offset as u64);
    }

    // Replay sequentially, remembering the membership after every generation.
    let mut model = initial;
    let mut history: Vec<Vec<Address>> = vec![model.iter().map(|h| *h.address()).collect()];
    for (change, applied) in &published {
        match change {
            TopologyChange::Add(host) => {
                match model.iter_mut().find(|h| h.address() == host.address()) {
                    Some(slot) => {
                        assert_eq!(applied.outcome, ChangeOutcome::Replaced);
                        *slot = Arc::clone(host);
                    }
                    None => {
                        assert_eq!(applied.outcome, ChangeOutcome::Added);
                        model.push(Arc::clone(host));
                    }
                }
            }
            TopologyChange::Remove(address) => {
                let index = model
                    .iter()
                    .position(|h| h.address() == address)
                    .expect("removal of an absent host was reported as Removed");
                assert_eq!(applied.outcome, ChangeOutcome::Removed);
                model.remove(index);
            }
        }
        history.push(model.iter().map(|h| *h.address()).collect());
    }

    // A NotFound removal must have seen a membership without that address.
    for (change, applied) in records.iter().filter(|(_, a)| a.outcome == ChangeOutcome::NotFound) {
        let TopologyChange::Remove(address) = change else {
            panic!("add reported NotFound");
        };
        let seen = &history[(applied.generation - base_generation) as usize];
        assert!(!seen.contains(address));
    }

    let final_snapshot = topology.snapshot();
    assert_eq!(final_snapshot.len(), model.len());
    for (actual, expected) in final_snapshot.iter().zip(&model) {
        assert!(Arc::ptr_eq(actual, expected));
    }
}

#[test]
fn test_marketplaces_are_independent_across_hosts() {
    struct Idle(ShardId);

    impl Connection for Idle {
        fn shard_id(&self) -> ShardId {
            self.0
        }
        fn detach(&mut self) {}
        fn attach(&mut self, _ctx: &dyn IoContext) {}
        fn close(&mut self) {}
    }

    let one = host_with_version(1, "3.11.0");
    let two = host_with_version(2, "3.11.0");

    crossbeam::thread::scope(|s| {
        for host in [&one, &two] {
            s.spawn(move |_| {
                for shard in 0..4 {
                    for _ in 0..25 {
                        host.deposit_connection(Box::new(Idle(shard)));
                    }
                }
            });
        }
    })
    .unwrap();

    assert_eq!(one.idle_connection_count(), 100);
    assert_eq!(two.withdraw_connections(3, 30).len(), 25);
    assert_eq!(one.idle_connections_on_shard(3), 25);
    assert_eq!(two.idle_connection_count(), 75);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[test]
fn test_host_dropped_after_last_holder_releases() {
    let topology = HostTopology::new();
    let host = host_with_version(1, "3.11.0");
    let weak = Arc::downgrade(&host);
    topology.add(host);

    let held_by_pool = topology.get(&addr(1)).unwrap();
    assert!(topology.remove(&addr(1)));
    assert!(weak.upgrade().is_some(), "pool still holds the host");

    drop(held_by_pool);
    assert!(weak.upgrade().is_none());
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_topology_matches_vec_model(ops in prop::collection::vec((any::<bool>(), 1u8..6), 0..64)) {
        let topology = HostTopology::new();
        let mut model: Vec<Address> = Vec::new();

        for (is_add, last) in ops {
            let address = addr(last);
            if is_add {
                topology.add(Arc::new(Host::new(address)));
                if !model.contains(&address) {
                    model.push(address);
                }
            } else {
                let expected = model.iter().position(|x| *x == address);
                prop_assert_eq!(topology.remove(&address), expected.is_some());
                if let Some(index) = expected {
                    model.remove(index);
                }
            }
        }

        prop_assert_eq!(topology.addresses(), model);
    }
}
