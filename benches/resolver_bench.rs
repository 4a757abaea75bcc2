//! Benchmarks for the service resolver

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use dependency_resolver::prelude::*;
use std::hint::black_box;
use std::thread;

trait Repo: Send + Sync {
    fn id(&self) -> u32;
}

struct SqlRepo {
    id: u32,
}

impl Repo for SqlRepo {
    fn id(&self) -> u32 {
        self.id
    }
}

impl Service for SqlRepo {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new([], |_| SqlRepo { id: 7 })]
    }

    fn bindings() -> Vec<Binding<Self>> {
        vec![Binding::<Self>::to::<dyn Repo>(|r| r)]
    }
}

#[allow(dead_code)]
struct Handler {
    repo: Option<Arc<dyn Repo>>,
    name: Option<String>,
    retries: Option<u32>,
}

impl Service for Handler {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![
            Constructor::new([], |_| Handler {
                repo: None,
                name: None,
                retries: None,
            }),
            Constructor::new([Param::of::<dyn Repo>("repo")], |args| Handler {
                repo: args.get(0),
                name: None,
                retries: None,
            }),
            Constructor::new(
                [Param::of::<dyn Repo>("repo"), Param::of::<String>("name")],
                |args| Handler {
                    repo: args.get(0),
                    name: args.value(1),
                    retries: None,
                },
            ),
            Constructor::new(
                [
                    Param::of::<dyn Repo>("repo"),
                    Param::of::<String>("name"),
                    Param::of::<u32>("retries"),
                ],
                |args| Handler {
                    repo: args.get(0),
                    name: args.value(1),
                    retries: args.value(2),
                },
            ),
        ]
    }
}

struct RequestState;

impl Service for RequestState {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new([], |_| RequestState)]
    }
}

fn provider() -> ServiceProvider {
    let repo = ServiceRepository::new();
    repo.register(Definition::<SqlRepo>::new().singleton()).unwrap();
    repo.register(Definition::<Handler>::new()).unwrap();
    repo.register(Definition::<RequestState>::new().scoped())
        .unwrap();
    repo.create_provider()
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("register_3", |b| {
        b.iter(|| {
            let repo = ServiceRepository::new();
            repo.register(Definition::<SqlRepo>::new().singleton()).unwrap();
            repo.register(Definition::<Handler>::new()).unwrap();
            repo.register(Definition::<RequestState>::new().scoped())
                .unwrap();
            black_box(repo)
        })
    });

    // Every registration after the first rebuilds the index
    group.bench_function("register_with_live_provider", |b| {
        let repo = ServiceRepository::new();
        repo.register(Definition::<Handler>::new()).unwrap();
        let _provider = repo.create_provider();

        b.iter(|| {
            let id = repo.register(Definition::<SqlRepo>::new()).unwrap();
            repo.unregister_definition(id);
        })
    });

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    let provider = provider();

    group.bench_function("get_singleton", |b| {
        b.iter(|| black_box(provider.get::<dyn Repo>().unwrap()))
    });

    group.bench_function("get_transient_prepared", |b| {
        b.iter(|| black_box(provider.get::<Handler>().unwrap()))
    });

    group.bench_function("get_not_found", |b| {
        b.iter(|| black_box(provider.get::<String>().unwrap()))
    });

    group.bench_function("can_resolve", |b| {
        b.iter(|| black_box(provider.can_resolve::<dyn Repo>().unwrap()))
    });

    group.finish();
}

fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");
    group.throughput(Throughput::Elements(1));

    let provider = provider();

    group.bench_function("create_no_params", |b| {
        b.iter(|| black_box(provider.create::<Handler>().unwrap()))
    });

    group.bench_function("create_positional", |b| {
        let params = params!["handler".to_string(), 3u32];
        b.iter(|| black_box(provider.create_with::<Handler>(&params).unwrap()))
    });

    group.bench_function("create_named", |b| {
        let params = params![retries = 3u32];
        b.iter(|| black_box(provider.create_with::<Handler>(&params).unwrap()))
    });

    group.finish();
}

fn bench_scoped(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoped");

    let provider = provider();

    group.bench_function("create_scope", |b| {
        b.iter(|| {
            let scope = provider.create_scope().unwrap();
            black_box(&scope);
            scope.dispose();
        })
    });

    group.bench_function("resolve_scoped_cached", |b| {
        let scope = provider.create_scope().unwrap();
        scope.get::<RequestState>().unwrap();
        b.iter(|| black_box(scope.get::<RequestState>().unwrap()))
    });

    group.bench_function("scope_create_resolve_dispose", |b| {
        b.iter(|| {
            let scope = provider.create_scope().unwrap();
            black_box(scope.get::<RequestState>().unwrap());
            scope.dispose();
        })
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");

    group.bench_function("concurrent_reads_4", |b| {
        let provider = provider();

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let p = provider.clone();
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let _ = p.get::<dyn Repo>().unwrap();
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_registration,
    bench_resolution,
    bench_selection,
    bench_scoped,
    bench_concurrent,
);

criterion_main!(benches);
