use crate::fuzzer::{ChaosFuzzer, FuzzReport};
use crate::CancelToken;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmReport {
    /// One entry per worker that ran to completion, in spawn order.
    pub workers: Vec<FuzzReport>,
    pub total: FuzzReport,
    pub panics: u64,
    pub elapsed_ms: u64,
}

/// Run `workers` fuzz loops in parallel until `duration` elapses or `cancel`
/// fires. Every worker shares the fuzzer's pool and counters.
pub fn run_swarm(
    fuzzer: &ChaosFuzzer<'_>,
    workers: usize,
    duration: Duration,
    cancel: &CancelToken,
) -> SwarmReport {
    let started = Instant::now();
    let deadline = started + duration;
    info!(workers, duration = ?duration, "swarm starting");

    let mut report = SwarmReport::default();
    thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                s.spawn(move || {
                    let mut rng = fuzzer.worker_rng(worker);
                    fuzzer.run_until(Some(deadline), cancel, &mut rng)
                })
            })
            .collect();

        for (worker, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(worker_report) => {
                    report.total.merge(&worker_report);
                    report.workers.push(worker_report);
                }
                Err(_) => {
                    warn!(worker, "swarm worker panicked");
                    report.panics += 1;
                }
            }
        }
    });
    report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    info!(
        executed = report.total.executed,
        failed = report.total.failed,
        panics = report.panics,
        "swarm finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::RunCounters;
    use crate::fuzzer::{ChaosCommand, ChaosSettings, CommandTable};
    use crate::schema_manager::SchemaManager;
    use indexquake_schema::{book_index_schema, IndexName, Namespace};
    use indexquake_store::{ConnectionPool, MemoryConnector, MemoryStore, PoolConfig, StoreOp};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn settings() -> ChaosSettings {
        ChaosSettings {
            index: IndexName::new("idx:books"),
            alias: IndexName::new("idx:books_alias"),
            namespace: Namespace::new("books"),
            id_range: 100,
            expire_ttl: Duration::from_millis(2),
            seed: Some(11),
        }
    }

    fn setup(pool_size: usize) -> (Arc<MemoryStore>, ConnectionPool, SchemaManager) {
        let store = Arc::new(MemoryStore::new());
        let pool = ConnectionPool::connect(
            Box::new(MemoryConnector::new(Arc::clone(&store))),
            PoolConfig {
                max_size: pool_size,
                acquire_timeout: None,
            },
        )
        .unwrap();
        let schema = SchemaManager::new(
            IndexName::new("idx:books"),
            Namespace::new("books"),
            book_index_schema(),
        );
        schema.ensure_index(&pool).unwrap();
        (store, pool, schema)
    }

    #[test]
    fn workers_stop_at_deadline_and_counts_add_up() {
        let (store, pool, schema) = setup(4);
        let counters = RunCounters::new();
        let fuzzer = ChaosFuzzer::new(
            &pool,
            &schema,
            &counters,
            CommandTable::swarm(&BTreeMap::new()).unwrap(),
            settings(),
        );
        let before = store.stats().total();
        let report = run_swarm(&fuzzer, 6, Duration::from_millis(100), &CancelToken::new());

        assert_eq!(report.workers.len(), 6);
        assert_eq!(report.panics, 0);
        assert!(report.elapsed_ms >= 100);
        assert!(report.total.executed > 0);
        assert_eq!(
            report.workers.iter().map(|w| w.executed).sum::<u64>(),
            report.total.executed
        );
        assert_eq!(counters.snapshot().random_commands_executed, report.total.executed);
        assert_eq!(store.stats().total() - before, report.total.executed);
        assert_eq!(store.stats().count(StoreOp::AlterIndex), 0);
        assert!(!report
            .total
            .per_command
            .contains_key(ChaosCommand::AlterRandomField.name()));
    }

    #[test]
    fn cancel_ends_swarm_early() {
        let (_store, pool, schema) = setup(2);
        let counters = RunCounters::new();
        let fuzzer = ChaosFuzzer::new(
            &pool,
            &schema,
            &counters,
            CommandTable::swarm(&BTreeMap::new()).unwrap(),
            settings(),
        );
        let cancel = CancelToken::new();
        let report = thread::scope(|s| {
            let handle = s.spawn(|| run_swarm(&fuzzer, 3, Duration::from_secs(30), &cancel));
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
            handle.join().unwrap()
        });
        assert!(report.elapsed_ms < 10_000);
        assert_eq!(report.workers.len(), 3);
    }
}
