use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use multi_index::{
    HashUnique, IndexSpec, MultiIndex, OrdMulti, OrdUnique, StableNode, TranslationArray,
    UpdatePointer,
};
use rand_core::{RngCore, SeedableRng};
use rand_pcg::Lcg128Xsl64 as Pcg;

fn key(n: u64) -> String {
    format!("k{:016x}", n)
}

struct ByLen;
impl IndexSpec<String, u64> for ByLen {
    type Family = OrdMulti;
    type SecKey = usize;
    fn project(key: &String, payload: &u64) -> usize {
        key.len() + (*payload % 13) as usize
    }
}

struct ByBucket;
impl IndexSpec<String, u64> for ByBucket {
    type Family = HashUnique;
    type SecKey = u64;
    fn project(_key: &String, payload: &u64) -> u64 {
        *payload
    }
}

type Stable = MultiIndex<String, u64, StableNode, OrdUnique, (ByLen, ByBucket)>;
type Dense = MultiIndex<String, u64, UpdatePointer, HashUnique, (ByLen, ByBucket)>;
type Translated = MultiIndex<String, u64, TranslationArray, HashUnique, (ByLen, ByBucket)>;

const N: u64 = 10_000;

fn fill<Pol, Prim>(m: &mut MultiIndex<String, u64, Pol, Prim, (ByLen, ByBucket)>, n: u64)
where
    Pol: multi_index::Policy<String, u64>,
    Prim: multi_index::MapFamily,
{
    let mut rng = Pcg::seed_from_u64(1);
    let mut i = 0;
    while i < n {
        let x = rng.next_u64();
        if m.insert(key(x), x).is_ok() {
            i += 1;
        }
    }
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_index::insert");
    group.throughput(Throughput::Elements(N));
    group.bench_function("stable_10k", |b| {
        b.iter_batched(
            Stable::new,
            |mut m| {
                fill(&mut m, N);
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
    group.bench_function("update_pointer_10k", |b| {
        b.iter_batched(
            Dense::new,
            |mut m| {
                fill(&mut m, N);
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
    group.bench_function("translation_10k", |b| {
        b.iter_batched(
            Translated::new,
            |mut m| {
                fill(&mut m, N);
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_index::find");
    group.throughput(Throughput::Elements(N));

    let mut stable = Stable::new();
    fill(&mut stable, N);
    group.bench_function("primary_10k", |b| {
        b.iter(|| {
            let mut rng = Pcg::seed_from_u64(1);
            let mut hits = 0u64;
            for _ in 0..N {
                let x = rng.next_u64();
                if stable.find(&key(x)).is_some() {
                    hits += 1;
                }
            }
            black_box(hits)
        })
    });

    let mut dense = Dense::new();
    fill(&mut dense, N);
    group.bench_function("secondary_10k", |b| {
        b.iter(|| {
            let mut rng = Pcg::seed_from_u64(1);
            let mut hits = 0u64;
            let view = dense.view::<ByBucket, _>();
            for _ in 0..N {
                let x = rng.next_u64();
                if view.find(&x).is_some() {
                    hits += 1;
                }
            }
            black_box(hits)
        })
    });
    group.finish();
}

fn bench_erase(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_index::erase");
    group.throughput(Throughput::Elements(N));
    group.bench_function("update_pointer_drain_10k", |b| {
        b.iter_batched(
            || {
                let mut m = Dense::new();
                fill(&mut m, N);
                m
            },
            |mut m| {
                let mut rng = Pcg::seed_from_u64(1);
                for _ in 0..N {
                    let x = rng.next_u64();
                    m.remove(&key(x));
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_modify(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_index::modify");
    group.throughput(Throughput::Elements(N));
    group.bench_function("rebuild_secondaries_10k", |b| {
        b.iter_batched(
            || {
                let mut m = Stable::new();
                fill(&mut m, N);
                m
            },
            |mut m| {
                let mut rng = Pcg::seed_from_u64(1);
                for _ in 0..N {
                    let x = rng.next_u64();
                    if let Some(h) = m.find(&key(x)) {
                        m.modify(h, |p| *p = p.wrapping_add(1));
                    }
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_find, bench_erase, bench_modify);
criterion_main!(benches);
