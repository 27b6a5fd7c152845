use crate::counters::RunCounters;
use crate::{CancelToken, CoreError};
use indexquake_schema::{Namespace, RecordGenerator};
use indexquake_store::ConnectionPool;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterReport {
    pub requested: u64,
    pub successful: u64,
    pub failed: u64,
    /// Stopped by the interrupt token before `requested` writes.
    pub interrupted: bool,
}

impl WriterReport {
    pub fn attempted(&self) -> u64 {
        self.successful + self.failed
    }
}

/// Seeds `count` generated documents under random ids.
pub struct BulkWriter<'a> {
    pool: &'a ConnectionPool,
    counters: &'a RunCounters,
    namespace: &'a Namespace,
    generator: &'a dyn RecordGenerator,
}

impl<'a> BulkWriter<'a> {
    pub fn new(
        pool: &'a ConnectionPool,
        counters: &'a RunCounters,
        namespace: &'a Namespace,
        generator: &'a dyn RecordGenerator,
    ) -> Self {
        Self {
            pool,
            counters,
            namespace,
            generator,
        }
    }

    /// Write `count` documents with ids drawn from `[1, id_range]`.
    ///
    /// Runs exactly `count` iterations unless `interrupt` fires first.
    pub fn run(
        &self,
        count: u64,
        id_range: u64,
        interrupt: &CancelToken,
        rng: &mut dyn RngCore,
    ) -> WriterReport {
        let mut report = WriterReport {
            requested: count,
            ..WriterReport::default()
        };
        let id_range = id_range.max(1);

        for _ in 0..count {
            if interrupt.is_cancelled() {
                report.interrupted = true;
                warn!(
                    written = report.attempted(),
                    requested = count,
                    "bulk writer interrupted"
                );
                break;
            }
            let id = rng.gen_range(1..=id_range);
            let acknowledged = match self.write_one(id, rng) {
                Ok(true) => true,
                Ok(false) => {
                    self.log_failure(&report, id, &"not acknowledged");
                    false
                }
                Err(e) => {
                    self.log_failure(&report, id, &e);
                    false
                }
            };
            if acknowledged {
                report.successful += 1;
            } else {
                report.failed += 1;
            }
            self.counters.record_write(acknowledged);
        }

        info!(
            successful = report.successful,
            failed = report.failed,
            "bulk writer finished"
        );
        report
    }

    /// The first failure of a run is a warning, the rest are debug noise.
    fn log_failure(&self, report: &WriterReport, id: u64, reason: &dyn std::fmt::Display) {
        let key = self.namespace.key(id);
        if report.failed == 0 {
            warn!(key = %key, "write failed: {reason}");
        } else {
            debug!(key = %key, "write failed: {reason}");
        }
    }

    fn write_one(&self, id: u64, rng: &mut dyn RngCore) -> Result<bool, CoreError> {
        let body = self.generator.random_document(id, rng).to_json()?;
        let key = self.namespace.key(id);
        let mut conn = self.pool.acquire()?;
        Ok(conn.json_set(key.as_str(), "$", &body)?)
    }
}
