//! Lifecycle of one harness run.
//!
//! The coordinator prepares the store (optional flush, index, canary, chaos
//! preparation), then runs the bulk writer, canary verifier, chaos fuzzer and
//! status reporter on scoped threads. Shutdown is ordered: the writer finishes
//! first, then the verifier and fuzzer are cancelled and joined, and the
//! reporter is stopped last so its final render sees the final counters.

use crate::canary::{CanaryState, CanaryVerifier, VerifierReport};
use crate::config::RunConfig;
use crate::counters::{CounterSnapshot, RunCounters};
use crate::fuzzer::{ChaosFuzzer, ChaosSettings, CommandTable, FuzzReport, PrepareReport};
use crate::reporter::{StatusReporter, StatusSink};
use crate::schema_manager::SchemaManager;
use crate::swarm::{run_swarm, SwarmReport};
use crate::writer::{BulkWriter, WriterReport};
use crate::{CancelToken, CoreError};
use chrono::{DateTime, Utc};
use indexquake_schema::{book_index_schema, FakeBookGenerator, RecordGenerator, CANARY_ID};
use indexquake_store::{ConnectionPool, Connector, PoolConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const WRITER_STREAM: u64 = 0x5752_4954;
const CANARY_STREAM: u64 = 0x4341_4e41;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Started,
    WriterFinished,
    WorkersCancelled,
    VerifierStopped,
    FuzzerStopped,
    ReporterStopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Started => "started",
            Phase::WriterFinished => "writer_finished",
            Phase::WorkersCancelled => "workers_cancelled",
            Phase::VerifierStopped => "verifier_stopped",
            Phase::FuzzerStopped => "fuzzer_stopped",
            Phase::ReporterStopped => "reporter_stopped",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseMark {
    pub phase: Phase,
    /// Milliseconds since the run started.
    pub at_ms: u64,
    /// Writes completed (acknowledged or not) when the phase was reached.
    pub writes_completed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub store: String,
    pub index: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Time from cancelling the workers to the reporter's final render.
    pub shutdown_latency_ms: u64,
    pub counters: CounterSnapshot,
    /// `None` when the index could not be inspected or created.
    pub index_created: Option<bool>,
    pub writer: WriterReport,
    pub verifier: Option<VerifierReport>,
    pub fuzzer: Option<FuzzReport>,
    pub chaos_preparation: Option<PrepareReport>,
    pub canary_state: CanaryState,
    pub schema_fields: usize,
    pub timeline: Vec<PhaseMark>,
    pub panics: u64,
}

impl RunSummary {
    pub fn mark(&self, phase: Phase) -> Option<&PhaseMark> {
        self.timeline.iter().find(|m| m.phase == phase)
    }

    /// The canary failed at least one read-back.
    pub fn canary_failed(&self) -> bool {
        self.counters.verification_failure > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmSummary {
    pub store: String,
    pub index: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub index_created: Option<bool>,
    pub workers: usize,
    pub connections: usize,
    pub counters: CounterSnapshot,
    pub report: SwarmReport,
}

pub struct RunCoordinator {
    config: RunConfig,
    pool: ConnectionPool,
    counters: RunCounters,
    generator: Box<dyn RecordGenerator>,
    interrupt: CancelToken,
    workers: CancelToken,
}

impl RunCoordinator {
    /// Validate `config` and open the pool. Fails if the store is unreachable.
    pub fn connect(config: RunConfig, connector: Box<dyn Connector>) -> Result<Self, CoreError> {
        let pool_config = config.pool_config();
        Self::connect_with_pool(config, connector, pool_config)
    }

    pub fn connect_with_pool(
        config: RunConfig,
        connector: Box<dyn Connector>,
        pool_config: PoolConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let pool = ConnectionPool::connect(connector, pool_config)?;
        info!(store = %pool.describe(), max_size = pool_config.max_size, "connection pool ready");
        Ok(Self {
            config,
            pool,
            counters: RunCounters::new(),
            generator: Box::new(FakeBookGenerator),
            interrupt: CancelToken::new(),
            workers: CancelToken::new(),
        })
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Box<dyn RecordGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Use `token` to interrupt the bulk writer, typically wired to Ctrl-C.
    #[must_use]
    pub fn with_interrupt(mut self, token: CancelToken) -> Self {
        self.interrupt = token;
        self
    }

    pub fn interrupt(&self) -> &CancelToken {
        &self.interrupt
    }

    /// Token cancelled once the writer has finished.
    pub fn worker_token(&self) -> CancelToken {
        self.workers.clone()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    fn schema_manager(&self) -> SchemaManager {
        SchemaManager::new(
            self.config.index_name(),
            self.config.namespace(),
            book_index_schema(),
        )
    }

    fn rng(&self, stream: u64) -> StdRng {
        match self.config.chaos.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ stream),
            None => StdRng::from_entropy(),
        }
    }

    fn flush_if_requested(&self) -> Result<(), CoreError> {
        if !self.config.run.flush {
            return Ok(());
        }
        self.pool.acquire()?.flush_all()?;
        info!("store flushed");
        Ok(())
    }

    fn ensure_index(&self, schema: &SchemaManager) -> Option<bool> {
        schema.ensure_index(&self.pool).ok()
    }

    /// Execute the run and return its summary.
    ///
    /// Consumes the coordinator: counters, the worker token and the canary
    /// all belong to a single run. Only a failed flush aborts the run; every
    /// other failure is counted and reported in the summary.
    pub fn run(self, sink: &mut dyn StatusSink) -> Result<RunSummary, CoreError> {
        let started = Instant::now();
        let started_at = Utc::now();
        let mut timeline = Timeline::new(started, &self.counters);
        timeline.mark(Phase::Started);

        self.flush_if_requested()?;
        let schema = self.schema_manager();
        let index_created = self.ensure_index(&schema);

        let namespace = self.config.namespace();
        let template = self
            .generator
            .random_document(CANARY_ID, &mut self.rng(CANARY_STREAM));
        let verifier = CanaryVerifier::new(
            &self.pool,
            &self.counters,
            self.config.index_name(),
            &namespace,
            template,
        );
        if self.config.run.verify {
            if let Err(e) = verifier.seed() {
                warn!("canary seeding failed: {e}");
            }
        }

        let fuzzer = if self.config.chaos.enabled {
            let table = CommandTable::main(&self.config.chaos.weights)?;
            Some(ChaosFuzzer::new(
                &self.pool,
                &schema,
                &self.counters,
                table,
                ChaosSettings::from_config(&self.config),
            ))
        } else {
            None
        };
        let chaos_preparation = fuzzer.as_ref().map(ChaosFuzzer::prepare);

        let writer = BulkWriter::new(&self.pool, &self.counters, &namespace, &*self.generator);
        let reporter = StatusReporter::new(&self.counters, self.config.status_interval());
        let reporter_cancel = CancelToken::new();
        let mut writer_rng = self.rng(WRITER_STREAM);
        let mut panics = 0;
        let mut cancelled_at = None;

        let (writer_report, verifier_report, fuzzer_report) = thread::scope(|s| {
            let workers = &self.workers;
            let verifier = &verifier;
            let reporter_handle = s.spawn(|| reporter.run(sink, &reporter_cancel));
            let verifier_handle = self
                .config
                .run
                .verify
                .then(|| s.spawn(move || verifier.run(workers)));
            let fuzzer_handle = fuzzer
                .as_ref()
                .map(|fuzzer| s.spawn(move || fuzzer.run(workers)));
            let writer_handle = s.spawn(|| {
                writer.run(
                    self.config.run.documents,
                    self.config.run.id_range,
                    &self.interrupt,
                    &mut writer_rng,
                )
            });

            let writer_report = join_worker("bulk writer", writer_handle, &mut panics)
                .unwrap_or(WriterReport {
                    requested: self.config.run.documents,
                    ..WriterReport::default()
                });
            timeline.mark(Phase::WriterFinished);

            self.workers.cancel();
            cancelled_at = Some(Instant::now());
            timeline.mark(Phase::WorkersCancelled);

            let verifier_report = verifier_handle
                .and_then(|h| join_worker("canary verifier", h, &mut panics));
            timeline.mark(Phase::VerifierStopped);
            let fuzzer_report =
                fuzzer_handle.and_then(|h| join_worker("chaos fuzzer", h, &mut panics));
            timeline.mark(Phase::FuzzerStopped);

            reporter_cancel.cancel();
            join_worker("status reporter", reporter_handle, &mut panics);
            timeline.mark(Phase::ReporterStopped);

            (writer_report, verifier_report, fuzzer_report)
        });

        let shutdown_latency = cancelled_at.map_or(Duration::ZERO, |t| t.elapsed());
        let summary = RunSummary {
            store: self.pool.describe(),
            index: self.config.index.name.clone(),
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: millis(started.elapsed()),
            shutdown_latency_ms: millis(shutdown_latency),
            counters: self.counters.snapshot(),
            index_created,
            writer: writer_report,
            verifier: verifier_report,
            fuzzer: fuzzer_report,
            chaos_preparation,
            canary_state: verifier.state(),
            schema_fields: schema.field_count(),
            timeline: timeline.into_marks(),
            panics,
        };
        info!(
            elapsed_ms = summary.elapsed_ms,
            shutdown_latency_ms = summary.shutdown_latency_ms,
            writes = summary.counters.writes_total(),
            "run finished"
        );
        Ok(summary)
    }

    /// Run the multi-worker read-load variant for `swarm.duration_secs`.
    pub fn swarm(self) -> Result<SwarmSummary, CoreError> {
        let started_at = Utc::now();
        self.flush_if_requested()?;
        let schema = self.schema_manager();
        let index_created = self.ensure_index(&schema);

        let table = CommandTable::swarm(&self.config.chaos.weights)?;
        let fuzzer = ChaosFuzzer::new(
            &self.pool,
            &schema,
            &self.counters,
            table,
            ChaosSettings::from_config(&self.config),
        );
        let report = run_swarm(
            &fuzzer,
            self.config.swarm.workers,
            Duration::from_secs(self.config.swarm.duration_secs),
            &self.interrupt,
        );

        Ok(SwarmSummary {
            store: self.pool.describe(),
            index: self.config.index.name.clone(),
            started_at,
            finished_at: Utc::now(),
            index_created,
            workers: self.config.swarm.workers,
            connections: self.pool.config().max_size,
            counters: self.counters.snapshot(),
            report,
        })
    }
}

struct Timeline<'a> {
    started: Instant,
    counters: &'a RunCounters,
    marks: Vec<PhaseMark>,
}

impl<'a> Timeline<'a> {
    fn new(started: Instant, counters: &'a RunCounters) -> Self {
        Self {
            started,
            counters,
            marks: Vec::with_capacity(6),
        }
    }

    fn mark(&mut self, phase: Phase) {
        self.marks.push(PhaseMark {
            phase,
            at_ms: millis(self.started.elapsed()),
            writes_completed: self.counters.writes_completed(),
        });
    }

    fn into_marks(self) -> Vec<PhaseMark> {
        self.marks
    }
}

fn join_worker<T>(
    name: &str,
    handle: thread::ScopedJoinHandle<'_, T>,
    panics: &mut u64,
) -> Option<T> {
    match handle.join() {
        Ok(value) => Some(value),
        Err(payload) => {
            *panics += 1;
            error!(worker = name, "worker panicked: {}", panic_message(&*payload));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
