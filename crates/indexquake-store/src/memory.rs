//! In-process document store with a search index.
//!
//! `MemoryStore` keeps JSON documents, index definitions and aliases behind one
//! mutex and evaluates search and aggregate requests with [`crate::eval`]. It
//! counts every operation it receives and can be told to misbehave through its
//! [`FaultPlan`], which is how tests exercise failure accounting without a live
//! server.

use crate::client::{
    AggregateRow, Connector, IndexAttribute, IndexInfo, SearchDocument, SearchResult,
    StoreConnection,
};
use crate::eval::{self, compare_rendered, field_values, resolve_path, value_text};
use crate::query::{AggregateRequest, AggregateStep, Reducer, SearchQuery, SortOrder};
use crate::StoreError;
use indexquake_schema::{FieldDescriptor, IndexSchema, SchemaError};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    JsonSet,
    JsonGet,
    Delete,
    Expire,
    Search,
    Aggregate,
    CreateIndex,
    AlterIndex,
    IndexInfo,
    AliasAdd,
    AliasUpdate,
    FlushAll,
}

impl StoreOp {
    pub const ALL: [StoreOp; 12] = [
        StoreOp::JsonSet,
        StoreOp::JsonGet,
        StoreOp::Delete,
        StoreOp::Expire,
        StoreOp::Search,
        StoreOp::Aggregate,
        StoreOp::CreateIndex,
        StoreOp::AlterIndex,
        StoreOp::IndexInfo,
        StoreOp::AliasAdd,
        StoreOp::AliasUpdate,
        StoreOp::FlushAll,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StoreOp::JsonSet => "JSON.SET",
            StoreOp::JsonGet => "JSON.GET",
            StoreOp::Delete => "DEL",
            StoreOp::Expire => "PEXPIRE",
            StoreOp::Search => "FT.SEARCH",
            StoreOp::Aggregate => "FT.AGGREGATE",
            StoreOp::CreateIndex => "FT.CREATE",
            StoreOp::AlterIndex => "FT.ALTER",
            StoreOp::IndexInfo => "FT.INFO",
            StoreOp::AliasAdd => "FT.ALIASADD",
            StoreOp::AliasUpdate => "FT.ALIASUPDATE",
            StoreOp::FlushAll => "FLUSHALL",
        }
    }

    /// Operations refused while [`FaultPlan::reject_commands`] is set.
    fn is_chaos_target(self) -> bool {
        matches!(
            self,
            StoreOp::Delete
                | StoreOp::Expire
                | StoreOp::Search
                | StoreOp::Aggregate
                | StoreOp::AlterIndex
                | StoreOp::AliasAdd
                | StoreOp::AliasUpdate
        )
    }
}

/// Per-operation counters, incremented when a request arrives.
#[derive(Debug, Default)]
pub struct OpStats {
    counts: [AtomicU64; 12],
}

impl OpStats {
    fn record(&self, op: StoreOp) {
        self.counts[op as usize].fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self, op: StoreOp) -> u64 {
        self.counts[op as usize].load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        StoreOp::ALL.iter().map(|op| self.count(*op)).sum()
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        StoreOp::ALL
            .iter()
            .map(|op| (op.name(), self.count(*op)))
            .collect()
    }
}

/// Switches that make the store fail on purpose.
#[derive(Debug, Default)]
pub struct FaultPlan {
    unreachable: AtomicBool,
    reject_commands: AtomicBool,
    write_failure_every: AtomicU64,
    writes_seen: AtomicU64,
    latency_micros: AtomicU64,
}

impl FaultPlan {
    /// Every request, including new connections, fails with a connectivity
    /// error while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn is_unreachable(&self) -> bool {
        self.unreachable.load(Ordering::SeqCst)
    }

    /// Fail every `n`th JSON write with an error reply. Zero disables.
    pub fn fail_every_nth_write(&self, n: u64) {
        self.write_failure_every.store(n, Ordering::SeqCst);
    }

    /// Refuse deletes, expiries, searches, aggregates, index alterations and
    /// alias changes with an error reply.
    pub fn reject_commands(&self, reject: bool) {
        self.reject_commands.store(reject, Ordering::SeqCst);
    }

    /// Delay every request by `latency` before it is served.
    pub fn set_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_micros.store(micros, Ordering::SeqCst);
    }

    fn latency(&self) -> Option<Duration> {
        match self.latency_micros.load(Ordering::SeqCst) {
            0 => None,
            micros => Some(Duration::from_micros(micros)),
        }
    }

    fn write_should_fail(&self) -> bool {
        let every = self.write_failure_every.load(Ordering::SeqCst);
        let seen = self.writes_seen.fetch_add(1, Ordering::SeqCst) + 1;
        every > 0 && seen % every == 0
    }
}

struct StoredDoc {
    value: Value,
    expires_at: Option<Instant>,
}

struct MemoryIndex {
    prefix: String,
    schema: IndexSchema,
}

#[derive(Default)]
struct MemoryState {
    docs: BTreeMap<String, StoredDoc>,
    indexes: BTreeMap<String, MemoryIndex>,
    aliases: HashMap<String, String>,
}

impl MemoryState {
    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.docs
            .retain(|_, doc| doc.expires_at.map_or(true, |at| at > now));
    }

    fn resolve_index(&self, name: &str) -> Result<&MemoryIndex, StoreError> {
        self.indexes
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|i| self.indexes.get(i)))
            .ok_or_else(|| StoreError::Response(format!("{name}: no such index")))
    }

    fn indexed_docs<'a>(&'a self, index: &'a MemoryIndex) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.docs
            .iter()
            .filter(move |(key, _)| key.starts_with(&index.prefix))
            .map(|(key, doc)| (key, &doc.value))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    stats: OpStats,
    faults: FaultPlan,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &OpStats {
        &self.stats
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Current document under `key`, ignoring expired entries.
    pub fn document(&self, key: &str) -> Option<Value> {
        let mut state = self.state.lock().ok()?;
        state.purge_expired();
        state.docs.get(key).map(|d| d.value.clone())
    }

    pub fn document_count(&self) -> usize {
        self.state
            .lock()
            .map(|mut s| {
                s.purge_expired();
                s.docs.len()
            })
            .unwrap_or(0)
    }

    pub fn index_count(&self) -> usize {
        self.state.lock().map(|s| s.indexes.len()).unwrap_or(0)
    }

    pub fn index_schema(&self, index: &str) -> Option<IndexSchema> {
        let state = self.state.lock().ok()?;
        state.indexes.get(index).map(|i| i.schema.clone())
    }

    pub fn alias_target(&self, alias: &str) -> Option<String> {
        let state = self.state.lock().ok()?;
        state.aliases.get(alias).cloned()
    }

    fn enter(&self, op: StoreOp) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.stats.record(op);
        if let Some(latency) = self.faults.latency() {
            std::thread::sleep(latency);
        }
        if self.faults.is_unreachable() {
            return Err(StoreError::Connectivity(
                "memory store unreachable".to_owned(),
            ));
        }
        if op.is_chaos_target() && self.faults.reject_commands.load(Ordering::SeqCst) {
            return Err(StoreError::Response(format!(
                "{} rejected by fault plan",
                op.name()
            )));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|e| StoreError::Connectivity(format!("memory store mutex poisoned: {e}")))?;
        state.purge_expired();
        Ok(state)
    }
}

/// Opens connections to a shared [`MemoryStore`].
#[derive(Default, Clone)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        if self.store.faults.is_unreachable() {
            return Err(StoreError::Connectivity(
                "connection refused: memory store unreachable".to_owned(),
            ));
        }
        Ok(Box::new(MemoryConnection {
            store: Arc::clone(&self.store),
        }))
    }

    fn describe(&self) -> String {
        "memory://".to_owned()
    }
}

pub struct MemoryConnection {
    store: Arc<MemoryStore>,
}

impl StoreConnection for MemoryConnection {
    fn json_set(&mut self, key: &str, path: &str, value: &Value) -> Result<bool, StoreError> {
        let mut state = self.store.enter(StoreOp::JsonSet)?;
        if self.store.faults.write_should_fail() {
            return Err(StoreError::Response("simulated write failure".to_owned()));
        }
        if let Some(doc) = state.docs.get_mut(key) {
            return Ok(eval::set_path(&mut doc.value, path, value.clone()));
        }
        if !matches!(path, "$" | ".") {
            return Err(StoreError::Response(
                "new objects must be created at the root".to_owned(),
            ));
        }
        state.docs.insert(
            key.to_owned(),
            StoredDoc {
                value: value.clone(),
                expires_at: None,
            },
        );
        Ok(true)
    }

    fn json_get(&mut self, key: &str, path: &str) -> Result<Option<Value>, StoreError> {
        let state = self.store.enter(StoreOp::JsonGet)?;
        Ok(state
            .docs
            .get(key)
            .and_then(|doc| resolve_path(&doc.value, path).first().map(|v| (*v).clone())))
    }

    fn delete(&mut self, key: &str) -> Result<u64, StoreError> {
        let mut state = self.store.enter(StoreOp::Delete)?;
        Ok(u64::from(state.docs.remove(key).is_some()))
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut state = self.store.enter(StoreOp::Expire)?;
        Ok(match state.docs.get_mut(key) {
            Some(doc) => {
                doc.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        })
    }

    fn search(&mut self, index: &str, query: &SearchQuery) -> Result<SearchResult, StoreError> {
        let state = self.store.enter(StoreOp::Search)?;
        let idx = state.resolve_index(index)?;
        let parsed = eval::parse_query(&query.text)?;

        let mut hits: Vec<(&String, &Value)> = state
            .indexed_docs(idx)
            .filter(|(_, doc)| eval::matches(&parsed, doc, &idx.schema))
            .filter(|(_, doc)| {
                query.filters.iter().all(|f| {
                    field_values(doc, &idx.schema, &f.field)
                        .iter()
                        .filter_map(|v| v.as_f64())
                        .any(|n| n >= f.min && n <= f.max)
                })
            })
            .collect();

        if let Some((field, order)) = &query.sort_by {
            let alias = field.trim_start_matches('@');
            hits.sort_by(|(_, a), (_, b)| {
                let a = first_rendered(a, &idx.schema, alias);
                let b = first_rendered(b, &idx.schema, alias);
                let ord = compare_rendered(a.as_deref(), b.as_deref());
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }

        let total = hits.len() as u64;
        let (offset, num) = query.limit.unwrap_or((0, DEFAULT_SEARCH_LIMIT));
        let documents = hits
            .into_iter()
            .skip(offset)
            .take(num)
            .map(|(key, doc)| {
                let mut fields = BTreeMap::new();
                if query.return_fields.is_empty() {
                    fields.insert("$".to_owned(), doc.to_string());
                }
                for r in &query.return_fields {
                    let value = if r.path.starts_with('$') {
                        resolve_path(doc, &r.path).first().map(|v| value_text(v))
                    } else {
                        first_rendered(doc, &idx.schema, &r.path)
                    };
                    if let Some(value) = value {
                        fields.insert(r.output_name().to_owned(), value);
                    }
                }
                SearchDocument {
                    id: key.clone(),
                    fields,
                }
            })
            .collect();
        Ok(SearchResult { total, documents })
    }

    fn aggregate(
        &mut self,
        index: &str,
        request: &AggregateRequest,
    ) -> Result<Vec<AggregateRow>, StoreError> {
        let state = self.store.enter(StoreOp::Aggregate)?;
        let idx = state.resolve_index(index)?;
        let parsed = eval::parse_query(&request.query)?;
        let schema = &idx.schema;

        let mut rows: Vec<Row<'_>> = state
            .indexed_docs(idx)
            .filter(|(_, doc)| eval::matches(&parsed, doc, schema))
            .map(|(_, doc)| Row {
                doc: Some(doc),
                values: AggregateRow::new(),
            })
            .collect();

        for step in &request.steps {
            match step {
                AggregateStep::Load(fields) => {
                    for row in &mut rows {
                        for field in fields {
                            let name = field.trim_start_matches('@');
                            if let Some(v) = row.lookup(schema, name) {
                                row.values.insert(name.to_owned(), v);
                            }
                        }
                    }
                }
                AggregateStep::Apply { expression, alias } => {
                    for row in &mut rows {
                        let value = eval::geodistance(expression, |name| row.lookup(schema, name))?;
                        row.values.insert(alias.clone(), value);
                    }
                }
                AggregateStep::GroupBy { fields, reducers } => {
                    rows = group_rows(rows, schema, fields, reducers);
                }
                AggregateStep::SortBy(keys) => {
                    for row in &mut rows {
                        for (field, _) in keys {
                            let name = field.trim_start_matches('@');
                            if let Some(v) = row.lookup(schema, name) {
                                row.values.insert(name.to_owned(), v);
                            }
                        }
                    }
                    rows.sort_by(|a, b| {
                        for (field, order) in keys {
                            let name = field.trim_start_matches('@');
                            let ord = compare_rendered(
                                a.values.get(name).map(String::as_str),
                                b.values.get(name).map(String::as_str),
                            );
                            let ord = match order {
                                SortOrder::Asc => ord,
                                SortOrder::Desc => ord.reverse(),
                            };
                            if ord.is_ne() {
                                return ord;
                            }
                        }
                        std::cmp::Ordering::Equal
                    });
                }
                AggregateStep::Limit { offset, num } => {
                    rows = rows.into_iter().skip(*offset).take(*num).collect();
                }
            }
        }

        Ok(rows.into_iter().map(|r| r.values).collect())
    }

    fn create_index(
        &mut self,
        index: &str,
        prefix: &str,
        schema: &IndexSchema,
    ) -> Result<(), StoreError> {
        let mut state = self.store.enter(StoreOp::CreateIndex)?;
        if state.indexes.contains_key(index) {
            return Err(StoreError::Response("Index already exists".to_owned()));
        }
        state.indexes.insert(
            index.to_owned(),
            MemoryIndex {
                prefix: prefix.to_owned(),
                schema: schema.clone(),
            },
        );
        Ok(())
    }

    fn alter_index(&mut self, index: &str, field: &FieldDescriptor) -> Result<(), StoreError> {
        let mut state = self.store.enter(StoreOp::AlterIndex)?;
        let idx = state
            .indexes
            .get_mut(index)
            .ok_or_else(|| StoreError::Response("Unknown index name".to_owned()))?;
        idx.schema.push(field.clone()).map_err(|e| match e {
            SchemaError::DuplicateAlias(alias) => {
                StoreError::Response(format!("Duplicate field in schema - {alias}"))
            }
            other => StoreError::Response(other.to_string()),
        })
    }

    fn index_info(&mut self, index: &str) -> Result<IndexInfo, StoreError> {
        let state = self.store.enter(StoreOp::IndexInfo)?;
        let idx = state
            .indexes
            .get(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_owned()))?;
        Ok(IndexInfo {
            name: index.to_owned(),
            num_docs: state.indexed_docs(idx).count() as u64,
            prefixes: vec![idx.prefix.clone()],
            attributes: idx
                .schema
                .fields()
                .iter()
                .map(|f| IndexAttribute {
                    identifier: f.path.clone(),
                    alias: f.alias.clone(),
                    kind: f.kind.keyword().to_owned(),
                })
                .collect(),
        })
    }

    fn alias_add(&mut self, alias: &str, index: &str) -> Result<(), StoreError> {
        let mut state = self.store.enter(StoreOp::AliasAdd)?;
        if !state.indexes.contains_key(index) {
            return Err(StoreError::Response("Unknown index name".to_owned()));
        }
        if state.aliases.contains_key(alias) {
            return Err(StoreError::Response("Alias already exists".to_owned()));
        }
        state.aliases.insert(alias.to_owned(), index.to_owned());
        Ok(())
    }

    fn alias_update(&mut self, alias: &str, index: &str) -> Result<(), StoreError> {
        let mut state = self.store.enter(StoreOp::AliasUpdate)?;
        if !state.indexes.contains_key(index) {
            return Err(StoreError::Response("Unknown index name".to_owned()));
        }
        state.aliases.insert(alias.to_owned(), index.to_owned());
        Ok(())
    }

    fn flush_all(&mut self) -> Result<(), StoreError> {
        let mut state = self.store.enter(StoreOp::FlushAll)?;
        *state = MemoryState::default();
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.store.faults.is_unreachable()
    }
}

struct Row<'a> {
    doc: Option<&'a Value>,
    values: AggregateRow,
}

impl Row<'_> {
    fn lookup(&self, schema: &IndexSchema, name: &str) -> Option<String> {
        self.values
            .get(name)
            .cloned()
            .or_else(|| self.doc.and_then(|doc| first_rendered(doc, schema, name)))
    }
}

fn first_rendered(doc: &Value, schema: &IndexSchema, alias: &str) -> Option<String> {
    field_values(doc, schema, alias).first().map(|v| value_text(v))
}

fn group_rows<'a>(
    rows: Vec<Row<'a>>,
    schema: &IndexSchema,
    fields: &[String],
    reducers: &[Reducer],
) -> Vec<Row<'a>> {
    let names: Vec<&str> = fields.iter().map(|f| f.trim_start_matches('@')).collect();
    let mut groups: Vec<(Vec<Option<String>>, Vec<Row<'a>>)> = Vec::new();
    for row in rows {
        let key: Vec<Option<String>> = names.iter().map(|n| row.lookup(schema, n)).collect();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut values = AggregateRow::new();
            for (name, value) in names.iter().zip(key) {
                if let Some(value) = value {
                    values.insert((*name).to_owned(), value);
                }
            }
            for reducer in reducers {
                let value = match reducer {
                    Reducer::Count { .. } => members.len().to_string(),
                    Reducer::Sum { field, .. } => {
                        let name = field.trim_start_matches('@');
                        let sum: f64 = members
                            .iter()
                            .filter_map(|m| m.lookup(schema, name))
                            .filter_map(|v| v.parse::<f64>().ok())
                            .sum();
                        render_number(sum)
                    }
                };
                values.insert(reducer.alias().to_owned(), value);
            }
            Row { doc: None, values }
        })
        .collect()
}

fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
