//! Repeated harness cycles against the in-memory store.
//!
//! Each cycle runs a full writer + verifier + fuzzer pass and then checks the
//! run invariants: every write accounted for, no canary failures, no worker
//! panics, and an ordered shutdown timeline.
//!
//! Usage:
//!   cargo run --bin soak -- [--cycles N] [--documents N]

use indexquake_core::{NullSink, Phase, RunConfig, RunCoordinator, RunSummary};
use indexquake_store::{MemoryConnector, MemoryStore};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PHASE_ORDER: [Phase; 6] = [
    Phase::Started,
    Phase::WriterFinished,
    Phase::WorkersCancelled,
    Phase::VerifierStopped,
    Phase::FuzzerStopped,
    Phase::ReporterStopped,
];

#[derive(Default)]
struct Totals {
    elapsed: Duration,
    shutdown: Duration,
    writes: u64,
    verifications: u64,
    commands: u64,
    command_failures: u64,
}

fn arg_value(args: &[String], flag: &str) -> Option<u64> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn cycle_config(cycle: u64, documents: u64) -> RunConfig {
    let mut config = RunConfig::default();
    config.store.url = "memory://".to_owned();
    config.run.documents = documents;
    config.run.id_range = documents;
    config.run.flush = true;
    config.run.status_interval_ms = 50;
    config.chaos.enabled = true;
    config.chaos.seed = Some(cycle);
    config
}

fn run_cycle(cycle: u64, documents: u64, store: &Arc<MemoryStore>) -> Result<RunSummary, String> {
    let coordinator = RunCoordinator::connect(
        cycle_config(cycle, documents),
        Box::new(MemoryConnector::new(Arc::clone(store))),
    )
    .map_err(|e| format!("cycle {cycle}: CONNECT FAILED: {e}"))?;
    coordinator
        .run(&mut NullSink)
        .map_err(|e| format!("cycle {cycle}: RUN FAILED: {e}"))
}

fn check_invariants(cycle: u64, documents: u64, summary: &RunSummary) -> u64 {
    let mut failures = 0u64;
    let counters = &summary.counters;
    if counters.writes_total() != documents {
        eprintln!(
            "  cycle {cycle}: WRITE ACCOUNTING: {} of {documents} writes counted",
            counters.writes_total()
        );
        failures += 1;
    }
    if counters.verification_failure > 0 {
        eprintln!(
            "  cycle {cycle}: CANARY FAILURES: {}",
            counters.verification_failure
        );
        failures += 1;
    }
    if summary.panics > 0 {
        eprintln!("  cycle {cycle}: WORKER PANICS: {}", summary.panics);
        failures += 1;
    }
    let phases: Vec<Phase> = summary.timeline.iter().map(|m| m.phase).collect();
    if phases != PHASE_ORDER {
        eprintln!("  cycle {cycle}: TIMELINE OUT OF ORDER: {phases:?}");
        failures += 1;
    }
    let cancelled_early = summary
        .mark(Phase::WorkersCancelled)
        .is_some_and(|m| m.writes_completed != documents);
    if cancelled_early {
        eprintln!("  cycle {cycle}: WORKERS CANCELLED BEFORE WRITER FINISHED");
        failures += 1;
    }
    failures
}

fn print_report(cycles: u64, failures: u64, totals: &Totals) {
    let per_cycle = |d: Duration| d.as_secs_f64() * 1000.0 / cycles.max(1) as f64;
    println!();
    println!("============================================");
    println!("Results: {cycles} cycles, {failures} failures");
    println!(
        "  run:      {:.3}s total, {:.3}ms avg",
        totals.elapsed.as_secs_f64(),
        per_cycle(totals.elapsed)
    );
    println!("  shutdown: {:.3}ms avg", per_cycle(totals.shutdown));
    println!("  writes:         {}", totals.writes);
    println!("  verifications:  {}", totals.verifications);
    println!(
        "  chaos commands: {} ({} failed)",
        totals.commands, totals.command_failures
    );

    if failures > 0 {
        eprintln!("\nSOAK TEST FAILED");
        std::process::exit(1);
    } else {
        println!("\nSOAK TEST PASSED");
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let cycles = arg_value(&args, "--cycles").unwrap_or(50);
    let documents = arg_value(&args, "--documents").unwrap_or(500).max(1);

    println!("indexquake soak test: {cycles} cycles of {documents} documents");
    println!("============================================");

    let store = Arc::new(MemoryStore::new());
    let mut totals = Totals::default();
    let mut failures = 0u64;
    let started = Instant::now();

    for cycle in 1..=cycles {
        match run_cycle(cycle, documents, &store) {
            Ok(summary) => {
                failures += check_invariants(cycle, documents, &summary);
                totals.elapsed += Duration::from_millis(summary.elapsed_ms);
                totals.shutdown += Duration::from_millis(summary.shutdown_latency_ms);
                totals.writes += summary.counters.writes_total();
                totals.verifications += summary.counters.verifications_total();
                totals.commands += summary.counters.random_commands_executed;
                totals.command_failures += summary.counters.random_command_failures;
            }
            Err(e) => {
                eprintln!("  {e}");
                failures += 1;
            }
        }
        if cycle % 10 == 0 {
            println!(
                "  cycle {cycle}: {:.1}s elapsed, {} store ops",
                started.elapsed().as_secs_f64(),
                store.stats().total()
            );
        }
    }

    print_report(cycles, failures, &totals);
}
