//! Benchmarks for card classification and header writes.
//!
//! Classification runs on every wake-up with a card in the field, walking
//! the factory table and every cached slot. The worst case is an unknown
//! card against a full database.
//!
//! # Run Benchmarks
//!
//! ```sh
//! cargo bench --bench classify_bench
//!
//! # Only the classification group
//! cargo bench --bench classify_bench -- classify
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use doorlock_cardman::CardDatabase;
use doorlock_core::{CardUid, SwFunction};
use doorlock_hardware::mock::MemoryPageStore;
use std::hint::black_box;

fn database_with_keys(keys: u8) -> CardDatabase<MemoryPageStore> {
    let mut db = CardDatabase::open(MemoryPageStore::new(32, 64)).unwrap();
    db.initialize().unwrap();
    db.set_programming_card(&CardUid::from_array([0x11, 0x22, 0x33, 0x44]))
        .unwrap();
    for i in 0..keys {
        db.add_key(&CardUid::from_array([0x04, i, 0x5a, 0xc3, 0x01, 0x80, 0x00]))
            .unwrap();
    }
    db
}

/// Classification against databases of increasing size.
fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(1));

    let cases = [
        ("factory", CardUid::from_array([0x5e, 0xa6, 0x3d, 0xeb])),
        ("programming", CardUid::from_array([0x11, 0x22, 0x33, 0x44])),
        (
            "last_key",
            CardUid::from_array([0x04, 49, 0x5a, 0xc3, 0x01, 0x80, 0x00]),
        ),
        ("unknown", CardUid::from_array([0xfe; 10])),
    ];

    for keys in [0u8, 10, 50] {
        let db = database_with_keys(keys);
        for (name, uid) in &cases {
            group.bench_with_input(BenchmarkId::new(*name, keys), uid, |b, uid| {
                b.iter(|| black_box(db.classify(black_box(uid))));
            });
        }
    }

    group.finish();
}

/// Header rewrite, the cost paid by every configuration change.
fn bench_header_write(c: &mut Criterion) {
    let mut db = database_with_keys(0);
    let mut flags = [SwFunction::ALARM, SwFunction::LATCH].into_iter().cycle();

    c.bench_function("header_write", |b| {
        b.iter(|| {
            let function = flags.next().unwrap_or(SwFunction::ALARM);
            db.set_software_function(black_box(function)).unwrap();
        });
    });
}

criterion_group!(benches, bench_classify, bench_header_write);
criterion_main!(benches);
