use crate::counters::{CounterSnapshot, RunCounters};
use crate::CancelToken;
use std::time::{Duration, Instant};
use tracing::info;

/// Destination for periodic counter snapshots.
pub trait StatusSink: Send {
    fn render(&mut self, snapshot: &CounterSnapshot, elapsed: Duration);

    /// Called once with the last snapshot after the reporter is stopped.
    fn finish(&mut self, snapshot: &CounterSnapshot, elapsed: Duration) {
        self.render(snapshot, elapsed);
    }
}

/// Emits each snapshot as a structured `info!` event.
#[derive(Debug, Default)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn render(&mut self, snapshot: &CounterSnapshot, elapsed: Duration) {
        info!(
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            verification_success = snapshot.verification_success,
            verification_failure = snapshot.verification_failure,
            random_commands_executed = snapshot.random_commands_executed,
            random_command_failures = snapshot.random_command_failures,
            successful_write = snapshot.successful_write,
            unsuccessful_write = snapshot.unsuccessful_write,
            "status"
        );
    }
}

#[derive(Debug, Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn render(&mut self, _snapshot: &CounterSnapshot, _elapsed: Duration) {}
}

pub struct StatusReporter<'a> {
    counters: &'a RunCounters,
    interval: Duration,
}

impl<'a> StatusReporter<'a> {
    pub fn new(counters: &'a RunCounters, interval: Duration) -> Self {
        Self { counters, interval }
    }

    /// Render a snapshot every interval until `cancel` fires, then render a
    /// final one through [`StatusSink::finish`]. Returns the number of
    /// periodic renders.
    pub fn run(&self, sink: &mut dyn StatusSink, cancel: &CancelToken) -> u64 {
        let started = Instant::now();
        let mut renders = 0;
        while !cancel.wait_timeout(self.interval) {
            sink.render(&self.counters.snapshot(), started.elapsed());
            renders += 1;
        }
        sink.finish(&self.counters.snapshot(), started.elapsed());
        renders
    }
}
