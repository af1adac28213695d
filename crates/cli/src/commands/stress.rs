//! `hostctl stress`
//!
//! Two hosts, many writers adding and removing them at random, a few readers
//! scanning snapshots the whole time. Afterwards every published change is
//! replayed in generation (writer lock) order and the result compared with
//! the live topology.

use clap::builder::TypedValueParser;
use clap::Args;
use corelib::{
    Address, AppliedChange, ChangeOutcome, CoreConfig, Host, HostPtr, HostTopology, TopologyChange,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct StressArgs {
    /// Writer threads.
    #[arg(long, default_value_t = 8)]
    pub threads: usize,
    /// Operations per writer.
    #[arg(
        long,
        default_value_t = 1_000,
        value_parser = clap::value_parser!(u64).range(1..=1_000_000).map(|n| n as usize)
    )]
    pub ops: usize,
    /// Reader threads scanning snapshots.
    #[arg(long, default_value_t = 2)]
    pub readers: usize,
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(Debug, Serialize)]
pub struct StressReport {
    pub writers: usize,
    pub ops_per_writer: usize,
    pub published: usize,
    pub not_found: usize,
    pub reads: usize,
    pub torn_reads: usize,
    pub final_hosts: Vec<Address>,
    pub consistent: bool,
    pub problems: Vec<String>,
}

type Record = (TopologyChange, AppliedChange);

const MAX_RESERVED_RECORDS: usize = 4_096;

pub fn run(args: &StressArgs, core: &CoreConfig) -> StressReport {
    let members = [address(1), address(2)];
    let new_host =
        |addr: Address| -> HostPtr { Arc::new(Host::with_latency_settings(addr, &core.latency)) };

    let topology = HostTopology::from_hosts(members.iter().copied().map(&new_host));
    let initial = topology.snapshot().to_vec();
    let base_generation = topology.generation();

    let done = AtomicBool::new(false);
    let reads = AtomicUsize::new(0);
    let torn_reads = AtomicUsize::new(0);

    let scope_result = crossbeam::thread::scope(|s| {
        for _ in 0..args.readers {
            s.spawn(|_| {
                while !done.load(Ordering::Acquire) {
                    let snapshot = topology.snapshot();
                    let unique: HashSet<Address> = snapshot.iter().map(|h| *h.address()).collect();
                    if unique.len() != snapshot.len() || !unique.iter().all(|a| members.contains(a)) {
                        torn_reads.fetch_add(1, Ordering::Relaxed);
                    }
                    reads.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        let writers: Vec<_> = (0..args.threads)
            .map(|w| {
                let topology = &topology;
                let new_host = &new_host;
                s.spawn(move |_| {
                    let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(w as u64));
                    let mut records: Vec<Record> =
                        Vec::with_capacity(args.ops.min(MAX_RESERVED_RECORDS));
                    for _ in 0..args.ops {
                        let target = members[rng.gen_range(0..members.len())];
                        let change = if rng.gen_bool(0.4) {
                            TopologyChange::Remove(target)
                        } else {
                            TopologyChange::Add(new_host(target))
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
        joined
    });

    let mut problems = Vec::new();
    let mut records = Vec::new();
    match scope_result {
        Ok(joined) => {
            for result in joined {
                match result {
                    Ok(mut writer_records) => records.append(&mut writer_records),
                    Err(_) => problems.push("writer thread panicked".to_owned()),
                }
            }
        }
        Err(_) => problems.push("reader thread panicked".to_owned()),
    }

    let final_snapshot = topology.snapshot();
    problems.extend(replay(initial, base_generation, &records, &final_snapshot));

    let torn_reads = torn_reads.into_inner();
    if torn_reads > 0 {
        problems.push(format!("{torn_reads} reads observed a torn snapshot"));
    }

    let published = records
        .iter()
        .filter(|(_, applied)| applied.outcome != ChangeOutcome::NotFound)
        .count();
    let report = StressReport {
        writers: args.threads,
        ops_per_writer: args.ops,
        published,
        not_found: records.len() - published,
        reads: reads.into_inner(),
        torn_reads,
        final_hosts: final_snapshot.iter().map(|h| *h.address()).collect(),
        consistent: problems.is_empty(),
        problems,
    };
    tracing::info!(
        published = report.published,
        reads = report.reads,
        consistent = report.consistent,
        "Stress run finished"
    );
    report
}

fn address(last: u8) -> Address {
    Address::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, last)), 9042)
}

/// Replay published changes in generation order; return every mismatch found.
fn replay(
    mut model: Vec<HostPtr>,
    base_generation: u64,
    records: &[Record],
    final_snapshot: &[HostPtr],
) -> Vec<String> {
    let mut problems = Vec::new();

    let mut published: Vec<&Record> = records
        .iter()
        .filter(|(_, applied)| applied.outcome != ChangeOutcome::NotFound)
        .collect();
    published.sort_by_key(|(_, applied)| applied.generation);

    let mut history: Vec<Vec<Address>> = vec![model.iter().map(|h| *h.address()).collect()];
    for (offset, (change, applied)) in published.iter().enumerate() {
        let expected_generation = base_generation + 1 + offset as u64;
        if applied.generation != expected_generation {
            problems.push(format!(
                "generation {} published where {expected_generation} was expected",
                applied.generation
            ));
        }

        let outcome = match change {
            TopologyChange::Add(host) => {
                match model.iter_mut().find(|h| h.address() == host.address()) {
                    Some(slot) => {
                        *slot = Arc::clone(host);
                        ChangeOutcome::Replaced
                    }
                    None => {
                        model.push(Arc::clone(host));
                        ChangeOutcome::Added
                    }
                }
            }
            TopologyChange::Remove(address) => {
                match model.iter().position(|h| h.address() == address) {
                    Some(index) => {
                        model.remove(index);
                        ChangeOutcome::Removed
                    }
                    None => ChangeOutcome::NotFound,
                }
            }
        };
        if outcome != applied.outcome {
            problems.push(format!(
                "generation {}: replay gave {outcome:?}, topology reported {:?}",
                applied.generation, applied.outcome
            ));
        }
        history.push(model.iter().map(|h| *h.address()).collect());
    }

    for (change, applied) in records.iter().filter(|(_, a)| a.outcome == ChangeOutcome::NotFound) {
        let TopologyChange::Remove(address) = change else {
            problems.push("an add reported NotFound".to_owned());
            continue;
        };
        let index = applied.generation.saturating_sub(base_generation) as usize;
        if history.get(index).map_or(true, |seen| seen.contains(address)) {
            problems.push(format!(
                "removal of {address} reported NotFound at generation {}",
                applied.generation
            ));
        }
    }

    let matches = final_snapshot.len() == model.len()
        && final_snapshot
            .iter()
            .zip(&model)
            .all(|(actual, expected)| Arc::ptr_eq(actual, expected));
    if !matches {
        problems.push("final snapshot differs from sequential replay".to_owned());
    }

    problems
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} writers x {} ops: {} published, {} not found",
            self.writers, self.ops_per_writer, self.published, self.not_found
        )?;
        writeln!(f, "{} snapshot reads, {} torn", self.reads, self.torn_reads)?;
        let hosts: Vec<String> = self.final_hosts.iter().map(Address::to_string).collect();
        writeln!(f, "final hosts: [{}]", hosts.join(", "))?;
        if self.consistent {
            writeln!(f, "consistent with sequential replay")
        } else {
            for problem in &self.problems {
                writeln!(f, "problem: {problem}")?;
            }
            Ok(())
        }
    }
}
