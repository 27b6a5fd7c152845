use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared run counters. Every field only ever increases.
#[derive(Debug, Default)]
pub struct RunCounters {
    verification_success: AtomicU64,
    verification_failure: AtomicU64,
    random_commands_executed: AtomicU64,
    random_command_failures: AtomicU64,
    successful_write: AtomicU64,
    unsuccessful_write: AtomicU64,
}

/// Point-in-time copy of [`RunCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub verification_success: u64,
    pub verification_failure: u64,
    pub random_commands_executed: u64,
    pub random_command_failures: u64,
    pub successful_write: u64,
    pub unsuccessful_write: u64,
}

impl CounterSnapshot {
    pub fn writes_total(&self) -> u64 {
        self.successful_write + self.unsuccessful_write
    }

    pub fn verifications_total(&self) -> u64 {
        self.verification_success + self.verification_failure
    }
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_verification(&self, success: bool) {
        let counter = if success {
            &self.verification_success
        } else {
            &self.verification_failure
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Count one executed chaos command; failures are also counted separately.
    pub fn record_command(&self, success: bool) {
        self.random_commands_executed.fetch_add(1, Ordering::SeqCst);
        if !success {
            self.random_command_failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn record_write(&self, acknowledged: bool) {
        let counter = if acknowledged {
            &self.successful_write
        } else {
            &self.unsuccessful_write
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn writes_completed(&self) -> u64 {
        self.successful_write.load(Ordering::SeqCst) + self.unsuccessful_write.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            verification_success: self.verification_success.load(Ordering::SeqCst),
            verification_failure: self.verification_failure.load(Ordering::SeqCst),
            random_commands_executed: self.random_commands_executed.load(Ordering::SeqCst),
            random_command_failures: self.random_command_failures.load(Ordering::SeqCst),
            successful_write: self.successful_write.load(Ordering::SeqCst),
            unsuccessful_write: self.unsuccessful_write.load(Ordering::SeqCst),
        }
    }
}
