use criterion::{criterion_group, criterion_main, Criterion};
use indexquake_core::{
    BulkWriter, CancelToken, ChaosCommand, ChaosFuzzer, ChaosSettings, CommandTable, RunCounters,
    SchemaManager,
};
use indexquake_schema::{book_index_schema, FakeBookGenerator, IndexName, Namespace};
use indexquake_store::{ConnectionPool, MemoryConnector, MemoryStore, PoolConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn memory_pool() -> ConnectionPool {
    ConnectionPool::connect(
        Box::new(MemoryConnector::new(Arc::new(MemoryStore::new()))),
        PoolConfig::default(),
    )
    .unwrap()
}

fn schema() -> SchemaManager {
    SchemaManager::new(
        IndexName::new("idx:bench"),
        Namespace::new("bench"),
        book_index_schema(),
    )
}

fn settings() -> ChaosSettings {
    ChaosSettings {
        index: IndexName::new("idx:bench"),
        alias: IndexName::new("idx:bench_alias"),
        namespace: Namespace::new("bench"),
        id_range: 100,
        expire_ttl: Duration::from_millis(2),
        seed: Some(1),
    }
}

fn bench_bulk_write(c: &mut Criterion) {
    c.bench_function("bulk_write_100_docs", |b| {
        b.iter_with_setup(
            || {
                let pool = memory_pool();
                let schema = schema();
                schema.ensure_index(&pool).unwrap();
                (pool, RunCounters::new(), Namespace::new("bench"))
            },
            |(pool, counters, namespace)| {
                let writer = BulkWriter::new(&pool, &counters, &namespace, &FakeBookGenerator);
                writer.run(100, 100, &CancelToken::new(), &mut StdRng::seed_from_u64(7));
            },
        );
    });
}

fn bench_chaos_commands(c: &mut Criterion) {
    let pool = memory_pool();
    let schema = schema();
    schema.ensure_index(&pool).unwrap();
    let counters = RunCounters::new();
    let writer = BulkWriter::new(&pool, &counters, schema.namespace(), &FakeBookGenerator);
    writer.run(500, 100, &CancelToken::new(), &mut StdRng::seed_from_u64(3));

    let fuzzer = ChaosFuzzer::new(
        &pool,
        &schema,
        &counters,
        CommandTable::swarm(&BTreeMap::new()).unwrap(),
        settings(),
    );
    fuzzer.prepare();
    let mut rng = StdRng::seed_from_u64(5);

    for command in [
        ChaosCommand::KeywordSearch,
        ChaosCommand::GeoRadiusSearch,
        ChaosCommand::CountAggregate,
        ChaosCommand::SortedPageSearch,
    ] {
        c.bench_function(&format!("chaos_{}", command.name()), |b| {
            b.iter(|| {
                let _ = fuzzer.execute_one(command, &mut rng);
            });
        });
    }
}

criterion_group!(benches, bench_bulk_write, bench_chaos_commands);
criterion_main!(benches);
