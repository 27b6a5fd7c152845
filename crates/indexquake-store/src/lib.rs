//! Store access layer for indexquake.
//!
//! This crate models the document store as a collaborator: the object-safe
//! `StoreConnection` trait (JSON get/set, delete, expire, search, aggregate,
//! index create/alter/info, aliases), a `Connector` that opens connections, and
//! a bounded `ConnectionPool` shared by every worker. Two transports are
//! provided: `RedisConnector` speaking the RedisJSON/RediSearch commands, and
//! `MemoryConnector`, an in-process store with fault injection used by tests,
//! the soak binary, and `memory://` runs.

pub mod client;
pub mod eval;
pub mod memory;
pub mod pool;
pub mod query;
pub mod reply;
pub mod resp;

pub use client::{
    select_connector, AggregateRow, Connector, IndexAttribute, IndexInfo, SearchDocument,
    SearchResult, StoreConnection,
};
pub use memory::{FaultPlan, MemoryConnector, MemoryStore, OpStats, StoreOp};
pub use pool::{ConnectionPool, PoolConfig, PoolStatus, PooledConnection};
pub use query::{
    AggregateRequest, AggregateStep, NumericFilter, Reducer, ReturnField, SearchQuery, SortOrder,
};
pub use resp::RedisConnector;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connectivity error: {0}")]
    Connectivity(String),
    #[error("connection pool exhausted after waiting {waited:?} ({max_size} connections in use)")]
    PoolExhausted { waited: Duration, max_size: usize },
    #[error("store replied with error: {0}")]
    Response(String),
    #[error("index not found: {0}")]
    IndexNotFound(String),
    #[error("unexpected reply: {0}")]
    Protocol(String),
    #[error("unsupported store url '{0}' (expected redis://, rediss:// or memory://)")]
    UnsupportedUrl(String),
    #[error("invalid pool configuration: {0}")]
    InvalidPool(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True for transport-level failures: the operation never reached the store
    /// or its reply was lost.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            StoreError::Connectivity(_) | StoreError::PoolExhausted { .. }
        )
    }
}
