//! Criterion micro-benchmarks for the dispatch hot path.
//!
//! These benchmarks measure the per-entry costs of a dispatch cycle:
//! - Sticky-key extraction from framed payloads
//! - Consistent-hash selection
//! - Redelivery-set add/drain churn
//!
//! Run with: `cargo bench --bench dispatch_bench`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use keyshared::dispatch::{
    ConsistentHashSelector, RedeliverySet, StickyKeySelector, encode_keyed_payload,
    peek_sticky_key,
};
use keyshared::types::{ConsumerId, Position};

fn bench_key_peek(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_peek");

    for key_len in [8usize, 64, 256].iter() {
        let key = vec![b'k'; *key_len];
        let payload = encode_keyed_payload(&key, &vec![0u8; 1024]);

        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(key_len), key_len, |b, _| {
            b.iter(|| peek_sticky_key(black_box(&payload)));
        });
    }

    group.finish();
}

fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");

    for consumers in [2usize, 8, 32].iter() {
        let mut selector = ConsistentHashSelector::new();
        for index in 0..*consumers {
            selector.add_consumer(ConsumerId::allocate(), &format!("consumer-{}", index));
        }
        let keys: Vec<Vec<u8>> = (0..1000u32)
            .map(|k| format!("key-{}", k).into_bytes())
            .collect();

        group.throughput(Throughput::Elements(keys.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(consumers),
            consumers,
            |b, _| {
                b.iter(|| {
                    for key in &keys {
                        black_box(selector.select(black_box(key)));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_redelivery_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("redelivery_churn");

    for size in [100usize, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut set = RedeliverySet::new();
                for entry in 0..size as i64 {
                    set.add(Position::new(1, entry));
                }
                let batch = set.first_n(100);
                for position in &batch {
                    set.remove(position);
                }
                black_box(set.len())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_key_peek,
    bench_selection,
    bench_redelivery_churn
);
criterion_main!(benches);
