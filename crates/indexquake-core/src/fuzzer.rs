//! Randomized chaos commands against the store and its index.
//!
//! Each [`ChaosCommand`] issues exactly one store request with randomized
//! parameters. A [`CommandTable`] picks commands by weight; [`ChaosFuzzer`]
//! runs them in a loop, counting every execution and swallowing failures.

use crate::counters::RunCounters;
use crate::schema_manager::SchemaManager;
use crate::{CancelToken, ConfigError, CoreError};
use indexquake_schema::{random_word, FieldDescriptor, IndexName, Namespace};
use indexquake_store::{
    AggregateRequest, ConnectionPool, NumericFilter, Reducer, SearchQuery, SortOrder,
    StoreConnection, StoreError,
};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const KEYWORD: &str = "green";
const GEO_RADIUS_QUERY: &str = "@geo:[34.0060 40.7128 500 km]";
const GEO_DISTANCE_QUERY: &str = "@geo:[-73.982254 40.753181 1000 km]";
const GEO_DISTANCE_EXPR: &str = "geodistance(@geo, -73.982254, 40.753181)";
const YEAR_RANGE_QUERY: &str = "@year_published:[1948 1975]";
const ADDRESS_PROBE_QUERY: &str = "@address:Sentinel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChaosCommand {
    AlterRandomField,
    AliasSearch,
    AliasRefresh,
    KeywordSearch,
    DeleteRandom,
    ExpireRandom,
    GeoRadiusSearch,
    GeoDistanceAggregate,
    CountAggregate,
    RandomWordSearch,
    SortedPageSearch,
    YearRangeSearch,
    WordSortAggregate,
    RatingFilterSearch,
}

impl ChaosCommand {
    /// Commands used alongside the writer and verifier.
    pub const MAIN: [ChaosCommand; 13] = [
        ChaosCommand::AlterRandomField,
        ChaosCommand::AliasSearch,
        ChaosCommand::AliasRefresh,
        ChaosCommand::DeleteRandom,
        ChaosCommand::ExpireRandom,
        ChaosCommand::GeoRadiusSearch,
        ChaosCommand::GeoDistanceAggregate,
        ChaosCommand::CountAggregate,
        ChaosCommand::RandomWordSearch,
        ChaosCommand::SortedPageSearch,
        ChaosCommand::YearRangeSearch,
        ChaosCommand::WordSortAggregate,
        ChaosCommand::RatingFilterSearch,
    ];

    /// Read-mostly commands used by swarm workers.
    pub const SWARM: [ChaosCommand; 11] = [
        ChaosCommand::ExpireRandom,
        ChaosCommand::KeywordSearch,
        ChaosCommand::DeleteRandom,
        ChaosCommand::GeoRadiusSearch,
        ChaosCommand::GeoDistanceAggregate,
        ChaosCommand::CountAggregate,
        ChaosCommand::RandomWordSearch,
        ChaosCommand::SortedPageSearch,
        ChaosCommand::YearRangeSearch,
        ChaosCommand::WordSortAggregate,
        ChaosCommand::RatingFilterSearch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChaosCommand::AlterRandomField => "alter_random_field",
            ChaosCommand::AliasSearch => "alias_search",
            ChaosCommand::AliasRefresh => "alias_refresh",
            ChaosCommand::KeywordSearch => "keyword_search",
            ChaosCommand::DeleteRandom => "delete_random",
            ChaosCommand::ExpireRandom => "expire_random",
            ChaosCommand::GeoRadiusSearch => "geo_radius_search",
            ChaosCommand::GeoDistanceAggregate => "geo_distance_aggregate",
            ChaosCommand::CountAggregate => "count_aggregate",
            ChaosCommand::RandomWordSearch => "random_word_search",
            ChaosCommand::SortedPageSearch => "sorted_page_search",
            ChaosCommand::YearRangeSearch => "year_range_search",
            ChaosCommand::WordSortAggregate => "word_sort_aggregate",
            ChaosCommand::RatingFilterSearch => "rating_filter_search",
        }
    }

    fn all() -> impl Iterator<Item = ChaosCommand> {
        ChaosCommand::MAIN
            .into_iter()
            .chain(std::iter::once(ChaosCommand::KeywordSearch))
    }

    /// Run this command once on `conn`.
    pub fn execute(
        self,
        conn: &mut dyn StoreConnection,
        ctx: &ChaosContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<(), CoreError> {
        let index = ctx.settings.index.as_str();
        let outcome: Result<(), StoreError> = match self {
            ChaosCommand::AlterRandomField => {
                return ctx.schema.alter_random_field_on(conn, rng).map(|_| ());
            }
            ChaosCommand::AliasSearch => conn
                .search(
                    ctx.settings.alias.as_str(),
                    &SearchQuery::new(KEYWORD).return_field("$.description"),
                )
                .map(|_| ()),
            ChaosCommand::AliasRefresh => {
                conn.alias_update(ctx.settings.alias.as_str(), index)
            }
            ChaosCommand::KeywordSearch => conn
                .search(index, &SearchQuery::new(KEYWORD).return_field("$.description"))
                .map(|_| ()),
            ChaosCommand::DeleteRandom => {
                conn.delete(ctx.random_key(rng).as_str()).map(|_| ())
            }
            ChaosCommand::ExpireRandom => conn
                .expire(ctx.random_key(rng).as_str(), ctx.settings.expire_ttl)
                .map(|_| ()),
            ChaosCommand::GeoRadiusSearch => {
                conn.search(index, &SearchQuery::new(GEO_RADIUS_QUERY)).map(|_| ())
            }
            ChaosCommand::GeoDistanceAggregate => conn
                .aggregate(
                    index,
                    &AggregateRequest::new(GEO_DISTANCE_QUERY)
                        .load(&["@geo"])
                        .apply(GEO_DISTANCE_EXPR, "geodistance"),
                )
                .map(|_| ()),
            ChaosCommand::CountAggregate => conn
                .aggregate(
                    index,
                    &AggregateRequest::new("*").group_by(&[], vec![Reducer::count("total")]),
                )
                .map(|_| ()),
            ChaosCommand::RandomWordSearch => conn
                .search(
                    index,
                    &SearchQuery::new(random_word(rng)).return_field_as("$.description", "author"),
                )
                .map(|_| ()),
            ChaosCommand::SortedPageSearch => conn
                .search(
                    index,
                    &SearchQuery::new("*")
                        .paging(0, 500)
                        .sort_by("year_published", SortOrder::Desc),
                )
                .map(|_| ()),
            ChaosCommand::YearRangeSearch => conn
                .search(
                    index,
                    &SearchQuery::new(YEAR_RANGE_QUERY)
                        .return_field_as("$.description", "description"),
                )
                .map(|_| ()),
            ChaosCommand::WordSortAggregate => conn
                .aggregate(
                    index,
                    &AggregateRequest::new(random_word(rng)).sort_by("@weight_grams", SortOrder::Asc),
                )
                .map(|_| ()),
            ChaosCommand::RatingFilterSearch => conn
                .search(
                    index,
                    &SearchQuery::new(random_word(rng))
                        .filter(NumericFilter::new("rating_votes", 900.0, 1000.0)),
                )
                .map(|_| ()),
        };
        outcome.map_err(|e| command_error(self, e))
    }
}

impl fmt::Display for ChaosCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChaosCommand {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChaosCommand::all()
            .find(|c| c.name() == s)
            .ok_or_else(|| {
                CoreError::Config(ConfigError::Invalid(format!("unknown chaos command '{s}'")))
            })
    }
}

fn command_error(command: ChaosCommand, e: StoreError) -> CoreError {
    if e.is_connectivity() {
        CoreError::Connectivity(e.to_string())
    } else {
        CoreError::Command {
            command: command.name().to_owned(),
            message: e.to_string(),
        }
    }
}

/// Parameters shared by every chaos command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaosSettings {
    pub index: IndexName,
    pub alias: IndexName,
    pub namespace: Namespace,
    /// Chaos keys are drawn from `[1, id_range]`.
    pub id_range: u64,
    pub expire_ttl: Duration,
    pub seed: Option<u64>,
}

impl ChaosSettings {
    pub fn from_config(config: &crate::RunConfig) -> Self {
        Self {
            index: config.index_name(),
            alias: config.alias_name(),
            namespace: config.namespace(),
            id_range: config.chaos.id_range,
            expire_ttl: Duration::from_millis(config.chaos.expire_ttl_ms),
            seed: config.chaos.seed,
        }
    }
}

pub struct ChaosContext<'a> {
    pub settings: &'a ChaosSettings,
    pub schema: &'a SchemaManager,
}

impl ChaosContext<'_> {
    fn random_key(&self, rng: &mut dyn RngCore) -> indexquake_schema::DocKey {
        let id = rng.gen_range(1..=self.settings.id_range.max(1));
        self.settings.namespace.key(id)
    }
}

/// Weighted selection over a fixed command list.
#[derive(Debug, Clone)]
pub struct CommandTable {
    commands: Vec<(ChaosCommand, u32)>,
    distribution: WeightedIndex<u32>,
}

impl CommandTable {
    /// Commands absent from `weights` weigh 1. Fails if every weight is 0.
    pub fn new(commands: &[ChaosCommand], weights: &BTreeMap<String, u32>) -> Result<Self, CoreError> {
        let commands: Vec<(ChaosCommand, u32)> = commands
            .iter()
            .map(|c| (*c, weights.get(c.name()).copied().unwrap_or(1)))
            .collect();
        let distribution = WeightedIndex::new(commands.iter().map(|(_, w)| *w)).map_err(|e| {
            CoreError::Config(ConfigError::Invalid(format!(
                "chaos command weights are unusable: {e}"
            )))
        })?;
        Ok(Self {
            commands,
            distribution,
        })
    }

    pub fn main(weights: &BTreeMap<String, u32>) -> Result<Self, CoreError> {
        Self::new(&ChaosCommand::MAIN, weights)
    }

    pub fn swarm(weights: &BTreeMap<String, u32>) -> Result<Self, CoreError> {
        Self::new(&ChaosCommand::SWARM, weights)
    }

    pub fn pick(&self, rng: &mut dyn RngCore) -> ChaosCommand {
        self.commands[self.distribution.sample(rng)].0
    }

    /// Commands with a non-zero weight.
    pub fn enabled(&self) -> impl Iterator<Item = ChaosCommand> + '_ {
        self.commands
            .iter()
            .filter(|(_, w)| *w > 0)
            .map(|(c, _)| *c)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTally {
    pub executed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzReport {
    pub executed: u64,
    pub failed: u64,
    pub per_command: BTreeMap<String, CommandTally>,
}

impl FuzzReport {
    fn record(&mut self, command: ChaosCommand, success: bool) {
        let tally = self.per_command.entry(command.name().to_owned()).or_default();
        tally.executed += 1;
        self.executed += 1;
        if !success {
            tally.failed += 1;
            self.failed += 1;
        }
    }

    pub fn merge(&mut self, other: &FuzzReport) {
        self.executed += other.executed;
        self.failed += other.failed;
        for (name, tally) in &other.per_command {
            let entry = self.per_command.entry(name.clone()).or_default();
            entry.executed += tally.executed;
            entry.failed += tally.failed;
        }
    }
}

/// Outcome of the best-effort steps run once before the fuzz loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareReport {
    pub alias_added: bool,
    pub address_field_added: bool,
    pub probe_succeeded: bool,
}

pub struct ChaosFuzzer<'a> {
    pool: &'a ConnectionPool,
    schema: &'a SchemaManager,
    counters: &'a RunCounters,
    table: CommandTable,
    settings: ChaosSettings,
}

impl<'a> ChaosFuzzer<'a> {
    pub fn new(
        pool: &'a ConnectionPool,
        schema: &'a SchemaManager,
        counters: &'a RunCounters,
        table: CommandTable,
        settings: ChaosSettings,
    ) -> Self {
        Self {
            pool,
            schema,
            counters,
            table,
            settings,
        }
    }

    pub fn settings(&self) -> &ChaosSettings {
        &self.settings
    }

    /// Alias the index, add an `address` text field and probe it. Each step
    /// is attempted regardless of the others; failures are logged.
    pub fn prepare(&self) -> PrepareReport {
        let mut report = PrepareReport::default();
        let mut conn = match self.pool.acquire() {
            Ok(conn) => conn,
            Err(e) => {
                warn!("chaos preparation skipped: {e}");
                return report;
            }
        };

        match conn.alias_add(self.settings.alias.as_str(), self.settings.index.as_str()) {
            Ok(()) => report.alias_added = true,
            Err(e) => debug!(alias = %self.settings.alias, "alias add failed: {e}"),
        }
        match self
            .schema
            .alter_add_on(&mut *conn, FieldDescriptor::text("$.address", "address"))
        {
            Ok(()) => report.address_field_added = true,
            Err(e) => debug!("address field not added: {e}"),
        }
        match conn.search(
            self.settings.index.as_str(),
            &SearchQuery::new(ADDRESS_PROBE_QUERY).return_field_as("$.description", "author"),
        ) {
            Ok(_) => report.probe_succeeded = true,
            Err(e) => debug!("address probe failed: {e}"),
        }
        info!(
            alias_added = report.alias_added,
            address_field_added = report.address_field_added,
            probe_succeeded = report.probe_succeeded,
            "chaos preparation finished"
        );
        report
    }

    fn rng(&self, stream: u64) -> StdRng {
        match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_entropy(),
        }
    }

    /// Execute one command, counting it whatever the outcome.
    pub fn execute_one(&self, command: ChaosCommand, rng: &mut dyn RngCore) -> Result<(), CoreError> {
        let ctx = ChaosContext {
            settings: &self.settings,
            schema: self.schema,
        };
        let result = self
            .pool
            .acquire()
            .map_err(CoreError::from)
            .and_then(|mut conn| command.execute(&mut *conn, &ctx, rng));
        self.counters.record_command(result.is_ok());
        result
    }

    /// Fuzz until `cancel` fires.
    pub fn run(&self, cancel: &CancelToken) -> FuzzReport {
        let mut rng = self.rng(0);
        let report = self.run_until(None, cancel, &mut rng);
        info!(
            executed = report.executed,
            failed = report.failed,
            "chaos fuzzer stopped"
        );
        report
    }

    /// Fuzz until `deadline` passes or `cancel` fires.
    pub fn run_until(
        &self,
        deadline: Option<Instant>,
        cancel: &CancelToken,
        rng: &mut dyn RngCore,
    ) -> FuzzReport {
        let mut report = FuzzReport::default();
        while !cancel.is_cancelled() && deadline.map_or(true, |d| Instant::now() < d) {
            let command = self.table.pick(rng);
            let result = self.execute_one(command, rng);
            if let Err(e) = &result {
                if report.failed == 0 {
                    warn!(command = command.name(), "chaos command failed: {e}");
                } else {
                    debug!(command = command.name(), "chaos command failed: {e}");
                }
            }
            report.record(command, result.is_ok());
        }
        report
    }

    /// Deterministic per-worker RNG when a seed is configured.
    pub fn worker_rng(&self, worker: usize) -> StdRng {
        self.rng(worker as u64 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CapturedLog;
    use indexquake_schema::book_index_schema;
    use indexquake_store::{MemoryConnector, MemoryStore, PoolConfig, StoreOp};
    use std::sync::Arc;
    use std::thread;

    struct Harness {
        store: Arc<MemoryStore>,
        pool: ConnectionPool,
        schema: SchemaManager,
        counters: RunCounters,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let pool = ConnectionPool::connect(
            Box::new(MemoryConnector::new(Arc::clone(&store))),
            PoolConfig::default(),
        )
        .unwrap();
        let schema = SchemaManager::new(
            IndexName::new("idx:books"),
            Namespace::new("books"),
            book_index_schema(),
        );
        schema.ensure_index(&pool).unwrap();
        Harness {
            store,
            pool,
            schema,
            counters: RunCounters::new(),
        }
    }

    fn settings(seed: Option<u64>) -> ChaosSettings {
        ChaosSettings {
            index: IndexName::new("idx:books"),
            alias: IndexName::new("idx:books_alias"),
            namespace: Namespace::new("books"),
            id_range: 100,
            expire_ttl: Duration::from_millis(2),
            seed,
        }
    }

    #[test]
    fn command_names_round_trip_through_from_str() {
        for command in ChaosCommand::all() {
            assert_eq!(command.name().parse::<ChaosCommand>().unwrap(), command);
        }
        assert!("drop_index".parse::<ChaosCommand>().is_err());
    }

    #[test]
    fn tables_have_expected_members() {
        assert!(!ChaosCommand::SWARM.contains(&ChaosCommand::AlterRandomField));
        assert!(ChaosCommand::SWARM.contains(&ChaosCommand::KeywordSearch));
        assert!(!ChaosCommand::MAIN.contains(&ChaosCommand::KeywordSearch));
    }

    #[test]
    fn zero_weight_disables_command() {
        let weights: BTreeMap<String, u32> = ChaosCommand::MAIN
            .iter()
            .map(|c| (c.name().to_owned(), u32::from(*c == ChaosCommand::CountAggregate)))
            .collect();
        let table = CommandTable::main(&weights).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(table.pick(&mut rng), ChaosCommand::CountAggregate);
        }
        assert_eq!(table.enabled().count(), 1);
    }

    #[test]
    fn all_zero_weights_rejected() {
        let weights: BTreeMap<String, u32> = ChaosCommand::SWARM
            .iter()
            .map(|c| (c.name().to_owned(), 0))
            .collect();
        assert!(CommandTable::swarm(&weights).is_err());
    }

    #[test]
    fn default_weights_reach_every_command() {
        let table = CommandTable::main(&BTreeMap::new()).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let seen: std::collections::BTreeSet<_> = (0..2000).map(|_| table.pick(&mut rng)).collect();
        assert_eq!(seen.len(), ChaosCommand::MAIN.len());
    }

    #[test]
    fn every_command_runs_against_memory_store() {
        let h = harness();
        let fuzzer = ChaosFuzzer::new(
            &h.pool,
            &h.schema,
            &h.counters,
            CommandTable::main(&BTreeMap::new()).unwrap(),
            settings(Some(1)),
        );
        let prep = fuzzer.prepare();
        assert!(prep.alias_added);
        assert!(prep.address_field_added);
        assert!(prep.probe_succeeded);

        let mut rng = StdRng::seed_from_u64(2);
        for command in ChaosCommand::all() {
            let result = fuzzer.execute_one(command, &mut rng);
            assert!(result.is_ok(), "{command} failed: {result:?}");
        }
        let executed = ChaosCommand::all().count() as u64;
        assert_eq!(h.counters.snapshot().random_commands_executed, executed);
        assert_eq!(h.counters.snapshot().random_command_failures, 0);
    }

    #[test]
    fn prepare_is_best_effort_on_rerun() {
        let h = harness();
        let fuzzer = ChaosFuzzer::new(
            &h.pool,
            &h.schema,
            &h.counters,
            CommandTable::main(&BTreeMap::new()).unwrap(),
            settings(None),
        );
        fuzzer.prepare();
        let again = fuzzer.prepare();
        assert!(!again.alias_added);
        assert!(!again.address_field_added);
        assert!(again.probe_succeeded);
    }

    #[test]
    fn first_command_failure_is_a_warning() {
        let h = harness();
        h.store.faults().reject_commands(true);
        let fuzzer = ChaosFuzzer::new(
            &h.pool,
            &h.schema,
            &h.counters,
            CommandTable::main(&BTreeMap::new()).unwrap(),
            settings(Some(6)),
        );
        let log = CapturedLog::default();
        let report = log.capture_warnings(|| {
            fuzzer.run_until(
                Some(Instant::now() + Duration::from_millis(20)),
                &CancelToken::new(),
                &mut StdRng::seed_from_u64(6),
            )
        });
        assert!(report.failed > 0);
        assert_eq!(log.contents().matches("chaos command failed").count(), 1);
    }

    #[test]
    fn failures_are_counted_and_swallowed() {
        let h = harness();
        h.store.faults().reject_commands(true);
        let fuzzer = ChaosFuzzer::new(
            &h.pool,
            &h.schema,
            &h.counters,
            CommandTable::main(&BTreeMap::new()).unwrap(),
            settings(Some(4)),
        );
        let cancel = CancelToken::new();
        let report = fuzzer.run_until(
            Some(Instant::now() + Duration::from_millis(30)),
            &cancel,
            &mut StdRng::seed_from_u64(4),
        );
        assert!(report.executed > 0);
        assert_eq!(report.failed, report.executed);
        let snap = h.counters.snapshot();
        assert_eq!(snap.random_commands_executed, report.executed);
        assert_eq!(snap.random_command_failures, report.failed);
    }

    #[test]
    fn run_stops_on_cancel_and_matches_store_ops() {
        let h = harness();
        let mut weights = BTreeMap::new();
        weights.insert(ChaosCommand::AlterRandomField.name().to_owned(), 0);
        let fuzzer = ChaosFuzzer::new(
            &h.pool,
            &h.schema,
            &h.counters,
            CommandTable::main(&weights).unwrap(),
            settings(Some(5)),
        );
        fuzzer.prepare();
        let before = h.store.stats().total();
        let cancel = CancelToken::new();
        let report = thread::scope(|s| {
            let handle = s.spawn(|| fuzzer.run(&cancel));
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
            handle.join().unwrap()
        });
        assert!(report.executed > 0);
        assert_eq!(h.store.stats().total() - before, report.executed);
        assert_eq!(h.store.stats().count(StoreOp::JsonSet), 0);
        assert_eq!(
            report.per_command.values().map(|t| t.executed).sum::<u64>(),
            report.executed
        );
    }

    #[test]
    fn seeded_runs_pick_the_same_sequence() {
        let table = CommandTable::main(&BTreeMap::new()).unwrap();
        let a: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(77);
            (0..50).map(|_| table.pick(&mut rng)).collect()
        };
        let b: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(77);
            (0..50).map(|_| table.pick(&mut rng)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn report_merge_adds_tallies() {
        let mut a = FuzzReport::default();
        a.record(ChaosCommand::DeleteRandom, true);
        let mut b = FuzzReport::default();
        b.record(ChaosCommand::DeleteRandom, false);
        b.record(ChaosCommand::CountAggregate, true);
        a.merge(&b);
        assert_eq!(a.executed, 3);
        assert_eq!(a.failed, 1);
        assert_eq!(a.per_command["delete_random"].executed, 2);
        assert_eq!(a.per_command["delete_random"].failed, 1);
    }
}
