//! `hostctl latency`
//!
//! Drives a tracker with an explicit clock so runs are reproducible.

use clap::Args;
use corelib::{CoreConfig, LatencySettings, LatencyTracker};
use serde::Serialize;
use std::fmt;

const NS_PER_US: u64 = 1_000;
/// Upper bound on steps reserved up front; longer runs grow the report as they go.
const MAX_RESERVED_STEPS: u64 = 4_096;

#[derive(Args, Debug)]
pub struct LatencyArgs {
    /// Number of samples to record.
    #[arg(
        long,
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(1..=10_000_000)
    )]
    pub samples: u64,
    /// Latency of each sample, in microseconds.
    #[arg(long, default_value_t = 1_000)]
    pub latency_us: u64,
    /// Time between consecutive samples, in microseconds.
    #[arg(long, default_value_t = 10_000)]
    pub gap_us: u64,
    /// Switch to this latency halfway through the run.
    #[arg(long)]
    pub shift_to_us: Option<u64>,
    /// Override `latency.min_measured` from the config.
    #[arg(long)]
    pub min_measured: Option<u64>,
    /// Override `latency.scale_ms` from the config.
    #[arg(long)]
    pub scale_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct LatencyStep {
    pub step: u64,
    pub timestamp_ns: u64,
    pub sample_ns: u64,
    pub applied: bool,
    pub average_ns: Option<u64>,
    pub num_measured: u64,
}

#[derive(Debug, Serialize)]
pub struct LatencyReport {
    pub settings: LatencySettings,
    pub steps: Vec<LatencyStep>,
}

pub fn run(args: &LatencyArgs, core: &CoreConfig) -> LatencyReport {
    let mut settings = core.latency.clone();
    if let Some(min_measured) = args.min_measured {
        settings.min_measured = min_measured;
    }
    if let Some(scale_ms) = args.scale_ms {
        settings.scale_ms = scale_ms;
    }

    let tracker = LatencyTracker::from_settings(&settings);
    let shift_at = args.samples / 2;
    let mut steps = Vec::with_capacity(reserved_steps(args.samples));

    for step in 1..=args.samples {
        let timestamp_ns = step.saturating_mul(args.gap_us).saturating_mul(NS_PER_US);
        let latency_us = match args.shift_to_us {
            Some(shifted) if step > shift_at => shifted,
            _ => args.latency_us,
        };
        let sample_ns = latency_us.saturating_mul(NS_PER_US);
        let applied = tracker.record_at(sample_ns, timestamp_ns);
        let state = tracker.snapshot();
        steps.push(LatencyStep {
            step,
            timestamp_ns,
            sample_ns,
            applied,
            average_ns: state.known_average(),
            num_measured: state.num_measured,
        });
    }

    tracing::debug!(samples = args.samples, "Latency simulation finished");
    LatencyReport { settings, steps }
}

fn reserved_steps(samples: u64) -> usize {
    usize::try_from(samples.min(MAX_RESERVED_STEPS)).unwrap_or(0)
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scale {} ms, min measured {}",
            self.settings.scale_ms, self.settings.min_measured
        )?;
        writeln!(f, "{:>6} {:>14} {:>12} {:>14}", "step", "t (us)", "sample (us)", "average (us)")?;
        for step in &self.steps {
            let average = match step.average_ns {
                Some(ns) => format!("{:.1}", ns as f64 / NS_PER_US as f64),
                None => "unknown".to_owned(),
            };
            writeln!(
                f,
                "{:>6} {:>14} {:>12} {:>14}{}",
                step.step,
                step.timestamp_ns / NS_PER_US,
                step.sample_ns / NS_PER_US,
                average,
                if step.applied { "" } else { " (dropped)" }
            )?;
        }
        Ok(())
    }
}
