//! Intention encoding benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logtree_bench::{generate_pairs, preloaded_db};
use logtree_codec::{Decode, Encode, IntentionRecord};
use logtree_core::{Config, Intention, NodePtr};

/// Builds the record of an intention that puts `count` keys into an empty tree.
fn fresh_record(count: usize) -> IntentionRecord {
    let mut intention = Intention::new(&NodePtr::Nil, None).unwrap();
    for (key, value) in generate_pairs(count, 64) {
        intention.put(key, value).unwrap();
    }
    intention.freeze().unwrap()
}

/// Benchmark freezing intentions into records.
fn bench_freeze(c: &mut Criterion) {
    let mut group = c.benchmark_group("freeze");

    for count in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let pairs = generate_pairs(count, 64);
            b.iter(|| {
                let mut intention = Intention::new(&NodePtr::Nil, None).unwrap();
                for (key, value) in &pairs {
                    intention.put(key.clone(), value.clone()).unwrap();
                }
                black_box(intention.freeze().unwrap())
            });
        });
    }
    group.finish();
}

/// Benchmark encoding and decoding records.
fn bench_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("record");

    for count in [1, 10, 100, 1000].iter() {
        let record = fresh_record(*count);
        let bytes = record.encode().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", count), &record, |b, record| {
            b.iter(|| black_box(record.encode().unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", count), &bytes, |b, bytes| {
            b.iter(|| black_box(IntentionRecord::decode(bytes).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark a one-key update on top of a large tree, which copies a
/// single root-to-leaf path.
fn bench_path_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_copy");

    for count in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let db = preloaded_db(&generate_pairs(count, 64), Config::default());
            let snapshot = db.snapshot();

            b.iter(|| {
                let mut intention =
                    Intention::new(snapshot.root(), snapshot.position()).unwrap();
                intention
                    .put(logtree_bench::bench_key(count / 2), vec![1u8; 64])
                    .unwrap();
                black_box(intention.freeze().unwrap().encode().unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_freeze, bench_encode_decode, bench_path_copy);
criterion_main!(benches);
