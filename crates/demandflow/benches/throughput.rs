use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use demandflow::{merge, zip2, FlowConfig, Source};

const ITEMS: u64 = 100_000;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn bench_windows(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("demand_window");
    group.throughput(Throughput::Elements(ITEMS));

    for (name, config) in [
        ("low_latency", FlowConfig::low_latency()),
        ("default", FlowConfig::default()),
        ("high_throughput", FlowConfig::high_throughput()),
    ] {
        group.bench_with_input(BenchmarkId::new("map_collect", name), &config, |b, config| {
            b.to_async(&rt).iter(|| async move {
                let items = Source::range(0, ITEMS)
                    .with_config(*config)
                    .map(|n| n.wrapping_mul(3))
                    .with_config(*config)
                    .collect()
                    .await
                    .unwrap();
                black_box(items.len());
            });
        });
    }

    group.finish();
}

fn bench_combinators(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("combinators");
    group.throughput(Throughput::Elements(ITEMS));

    group.bench_function("merge_4", |b| {
        b.to_async(&rt).iter(|| async {
            let quarter = ITEMS / 4;
            let sources = (0..4).map(|i| Source::range(i * quarter, quarter));
            let items = merge(sources).collect().await.unwrap();
            black_box(items.len());
        });
    });

    group.bench_function("zip2", |b| {
        b.to_async(&rt).iter(|| async {
            let items = zip2(Source::range(0, ITEMS), Source::range(0, ITEMS))
                .collect()
                .await
                .unwrap();
            black_box(items.len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_windows, bench_combinators);
criterion_main!(benches);
