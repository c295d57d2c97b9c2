use birds_nest::{
    BirdsNest, BirdsNestConfig, BirdsNestConfigBuilder, CuckooConfigBuilder,
    CuckooFilter, ExtensionRegistry, KeyType, RuleType, RulesConfigBuilder,
    TimestampKey, TxFilter,
};
use criterion::{
    BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main,
};
use std::hint::black_box;

// Helper to create fresh keys stamped with the current time
fn generate_keys(count: usize) -> Vec<TimestampKey> {
    (0..count)
        .map(|_| TimestampKey::generate().expect("Failed to generate key"))
        .collect()
}

fn nest_config(length: u32, max_num_keys: u32) -> BirdsNestConfig {
    BirdsNestConfigBuilder::default()
        .length(length)
        .cuckoo(
            CuckooConfigBuilder::default()
                .key_type(KeyType::Timestamp)
                .max_num_keys(max_num_keys)
                .build()
                .expect("Failed to build cuckoo config"),
        )
        .rules(
            RulesConfigBuilder::default()
                .absolute_expire_time(600)
                .build()
                .expect("Failed to build rules config"),
        )
        .build()
        .expect("Failed to build nest config")
}

fn bench_filter_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("cuckoo_filter_add");
    let registry = ExtensionRegistry::default();

    for capacity in [1_000, 10_000, 100_000] {
        let keys = generate_keys(capacity);
        let config = CuckooConfigBuilder::default()
            .max_num_keys(capacity as u32)
            .build()
            .expect("Failed to build cuckoo config");

        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &keys,
            |b, keys| {
                b.iter_batched(
                    || {
                        CuckooFilter::new(
                            config.clone(),
                            registry
                                .build(KeyType::Timestamp)
                                .expect("Failed to build extension"),
                        )
                        .expect("Failed to create filter")
                    },
                    |mut filter| {
                        for key in keys {
                            black_box(filter.add(key).expect("add failed"));
                        }
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_nest_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("nest_add");

    // small filters rotate often, large ones almost never
    for max_num_keys in [100, 10_000] {
        let keys = generate_keys(10_000);
        group.bench_with_input(
            BenchmarkId::from_parameter(max_num_keys),
            &keys,
            |b, keys| {
                b.iter_batched(
                    || {
                        BirdsNest::builder(nest_config(10, max_num_keys))
                            .in_memory()
                            .open()
                            .expect("Failed to open nest")
                    },
                    |nest| nest.adds(keys).expect("adds failed"),
                    BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_nest_contains(c: &mut Criterion) {
    let mut group = c.benchmark_group("nest_contains");

    let nest = BirdsNest::builder(nest_config(10, 10_000))
        .in_memory()
        .open()
        .expect("Failed to open nest");
    let present = generate_keys(50_000);
    nest.adds(&present).expect("adds failed");
    let absent = generate_keys(1_000);

    group.bench_function("present", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % present.len();
            black_box(nest.contains(&present[i], &[]).expect("contains failed"))
        });
    });

    group.bench_function("absent", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % absent.len();
            black_box(nest.contains(&absent[i], &[]).expect("contains failed"))
        });
    });

    group.bench_function("absent_with_expiry_rule", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % absent.len();
            black_box(
                nest.contains(&absent[i], &[RuleType::AbsoluteExpireTime])
                    .expect("contains failed"),
            )
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_filter_add,
    bench_nest_add,
    bench_nest_contains
);
criterion_main!(benches);
