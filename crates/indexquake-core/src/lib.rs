//! Run orchestration for indexquake.
//!
//! This crate drives a harness run against a document store: it ensures the
//! search index, seeds and continuously verifies a canary document, bulk-writes
//! generated records, and fires randomized chaos commands, all while a status
//! reporter prints the shared counters. `RunCoordinator` owns the ordering of
//! those phases and the cooperative shutdown; `run_swarm` is the multi-worker
//! read-load variant.

pub mod cancel;
pub mod canary;
pub mod config;
pub mod coordinator;
pub mod counters;
pub mod fuzzer;
pub mod reporter;
pub mod schema_manager;
pub mod swarm;
pub mod writer;

pub use cancel::{install_signal_handler, shutdown_requested, CancelToken};
pub use canary::{validate_transition, CanaryState, CanaryVerifier, VerifierReport};
pub use config::{parse_config_file, parse_config_str, ConfigError, RunConfig};
pub use coordinator::{Phase, PhaseMark, RunCoordinator, RunSummary};
pub use counters::{CounterSnapshot, RunCounters};
pub use fuzzer::{
    ChaosCommand, ChaosFuzzer, ChaosSettings, CommandTable, CommandTally, FuzzReport,
    PrepareReport,
};
pub use reporter::{NullSink, StatusReporter, StatusSink, TracingSink};
pub use schema_manager::SchemaManager;
pub use swarm::{run_swarm, SwarmReport};
pub use writer::{BulkWriter, WriterReport};

use indexquake_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("connectivity error: {0}")]
    Connectivity(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("canary verification failed: {0}")]
    VerificationMismatch(String),
    #[error("chaos command {command} failed: {message}")]
    Command { command: String, message: String },
    #[error("field error: {0}")]
    Field(#[from] indexquake_schema::SchemaError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("worker panicked: {0}")]
    WorkerPanic(String),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        if e.is_connectivity() {
            CoreError::Connectivity(e.to_string())
        } else {
            CoreError::Store(e)
        }
    }
}

impl CoreError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, CoreError::Connectivity(_))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io;
    use std::sync::{Arc, Mutex};

    /// In-memory log sink for asserting on emitted events.
    #[derive(Clone, Default)]
    pub struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl CapturedLog {
        /// Run `f` on this thread with WARN and above written to the buffer.
        pub fn capture_warnings<T>(&self, f: impl FnOnce() -> T) -> T {
            let sink = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::WARN)
                .with_ansi(false)
                .without_time()
                .with_writer(move || sink.clone())
                .finish();
            tracing::subscriber::with_default(subscriber, f)
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_connectivity_maps_to_connectivity() {
        let err = CoreError::from(StoreError::Connectivity("refused".to_owned()));
        assert!(err.is_connectivity());
        let err = CoreError::from(StoreError::Response("Unknown index name".to_owned()));
        assert!(matches!(err, CoreError::Store(_)));
        assert!(!err.is_connectivity());
    }

    #[test]
    fn invalid_transition_display() {
        let err = CoreError::InvalidTransition {
            from: "stopped".to_owned(),
            to: "seeded".to_owned(),
        };
        assert_eq!(err.to_string(), "invalid state transition: stopped -> seeded");
    }
}
