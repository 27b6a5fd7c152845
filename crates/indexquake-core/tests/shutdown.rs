//! Shutdown ordering: the verifier and fuzzer are only cancelled after the
//! writer's last write, and they exit promptly once cancelled.

use indexquake_core::{CancelToken, NullSink, Phase, RunConfig, RunCoordinator};
use indexquake_schema::{FieldDescriptor, IndexSchema};
use indexquake_store::{
    AggregateRequest, AggregateRow, Connector, IndexInfo, MemoryConnector, MemoryStore,
    SearchQuery, SearchResult, StoreConnection, StoreError, StoreOp,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const NAMESPACE: &str = "shutdown:books";

#[derive(Default)]
struct Observations {
    workers: OnceLock<CancelToken>,
    writes_after_cancel: AtomicU64,
    writes_before_cancel: AtomicU64,
}

struct ObservingConnector {
    inner: MemoryConnector,
    seen: Arc<Observations>,
}

impl Connector for ObservingConnector {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        Ok(Box::new(ObservingConnection {
            inner: self.inner.connect()?,
            seen: Arc::clone(&self.seen),
        }))
    }

    fn describe(&self) -> String {
        format!("observed {}", self.inner.describe())
    }
}

struct ObservingConnection {
    inner: Box<dyn StoreConnection>,
    seen: Arc<Observations>,
}

impl StoreConnection for ObservingConnection {
    fn json_set(
        &mut self,
        key: &str,
        path: &str,
        value: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        if key != format!("{NAMESPACE}:0") {
            let cancelled = self.seen.workers.get().is_some_and(CancelToken::is_cancelled);
            let counter = if cancelled {
                &self.seen.writes_after_cancel
            } else {
                &self.seen.writes_before_cancel
            };
            counter.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.json_set(key, path, value)
    }

    fn json_get(&mut self, key: &str, path: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.inner.json_get(key, path)
    }

    fn delete(&mut self, key: &str) -> Result<u64, StoreError> {
        self.inner.delete(key)
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.expire(key, ttl)
    }

    fn search(&mut self, index: &str, query: &SearchQuery) -> Result<SearchResult, StoreError> {
        self.inner.search(index, query)
    }

    fn aggregate(
        &mut self,
        index: &str,
        request: &AggregateRequest,
    ) -> Result<Vec<AggregateRow>, StoreError> {
        self.inner.aggregate(index, request)
    }

    fn create_index(
        &mut self,
        index: &str,
        prefix: &str,
        schema: &IndexSchema,
    ) -> Result<(), StoreError> {
        self.inner.create_index(index, prefix, schema)
    }

    fn alter_index(&mut self, index: &str, field: &FieldDescriptor) -> Result<(), StoreError> {
        self.inner.alter_index(index, field)
    }

    fn index_info(&mut self, index: &str) -> Result<IndexInfo, StoreError> {
        self.inner.index_info(index)
    }

    fn alias_add(&mut self, alias: &str, index: &str) -> Result<(), StoreError> {
        self.inner.alias_add(alias, index)
    }

    fn alias_update(&mut self, alias: &str, index: &str) -> Result<(), StoreError> {
        self.inner.alias_update(alias, index)
    }

    fn flush_all(&mut self) -> Result<(), StoreError> {
        self.inner.flush_all()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

fn config() -> RunConfig {
    let mut config = RunConfig::default();
    config.store.url = "memory://".to_owned();
    config.index.namespace = NAMESPACE.to_owned();
    config.run.documents = 10;
    config.run.id_range = 10;
    config.run.status_interval_ms = 5;
    config.chaos.enabled = true;
    config.chaos.seed = Some(42);
    config
}

#[test]
fn workers_cancelled_only_after_tenth_write() {
    let store = Arc::new(MemoryStore::new());
    store.faults().set_latency(Duration::from_millis(1));
    let seen = Arc::new(Observations::default());
    let connector = ObservingConnector {
        inner: MemoryConnector::new(Arc::clone(&store)),
        seen: Arc::clone(&seen),
    };
    let coordinator = RunCoordinator::connect(config(), Box::new(connector)).unwrap();
    assert!(seen.workers.set(coordinator.worker_token()).is_ok());

    let summary = coordinator.run(&mut NullSink).unwrap();

    assert_eq!(seen.writes_before_cancel.load(Ordering::SeqCst), 10);
    assert_eq!(seen.writes_after_cancel.load(Ordering::SeqCst), 0);
    assert_eq!(summary.counters.writes_total(), 10);
    assert_eq!(
        summary.mark(Phase::WriterFinished).unwrap().writes_completed,
        10
    );
    assert_eq!(
        summary.mark(Phase::WorkersCancelled).unwrap().writes_completed,
        10
    );
    assert!(summary.shutdown_latency_ms < 2000);
    assert_eq!(summary.panics, 0);
    // Canary seed plus ten writer writes.
    assert_eq!(store.stats().count(StoreOp::JsonSet), 11);
}

#[test]
fn interrupted_run_still_stops_every_worker() {
    let store = Arc::new(MemoryStore::new());
    store.faults().set_latency(Duration::from_millis(2));
    let mut config = config();
    config.run.documents = 100_000;
    config.run.id_range = 1000;
    let interrupt = CancelToken::new();
    let coordinator =
        RunCoordinator::connect(config, Box::new(MemoryConnector::new(Arc::clone(&store))))
            .unwrap()
            .with_interrupt(interrupt.clone());

    let summary = std::thread::scope(|s| {
        let handle = s.spawn(move || coordinator.run(&mut NullSink));
        std::thread::sleep(Duration::from_millis(100));
        interrupt.cancel();
        handle.join().unwrap().unwrap()
    });

    assert!(summary.writer.interrupted);
    assert!(summary.counters.writes_total() < 100_000);
    assert_eq!(summary.timeline.len(), 6);
    assert!(summary.shutdown_latency_ms < 2000);
}
