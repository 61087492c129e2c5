//! Benchmarks for trace and telemetry emission
//!
//! Measures the wrapper overhead (state lock plus engine call) against the
//! in-process engine, single threaded and contended.

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use p7_core::{Client, CounterSettings, Level, MemoryEngine, Telemetry, Trace};

fn setup() -> (Arc<MemoryEngine>, Client) {
    let engine = Arc::new(MemoryEngine::new());
    let client = Client::create(engine.clone(), "/P7.Sink=Null").unwrap();
    (engine, client)
}

fn bench_trace(c: &mut Criterion) {
    let (_engine, client) = setup();
    let trace = Trace::create(&client, "Debug").unwrap();
    // Filtered records skip storage, so the bench does not grow memory
    trace.set_verbosity(None, Level::Critical).unwrap();

    c.bench_function("trace_filtered", |b| {
        b.iter(|| trace.info(None, black_box("frame done")).unwrap())
    });
}

fn bench_telemetry(c: &mut Criterion) {
    let mut group = c.benchmark_group("telemetry_add");

    for threads in [1usize, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let (_engine, client) = setup();
            let telemetry = Arc::new(Telemetry::create(&client, "bench").unwrap());
            let id = telemetry
                .create_counter(&CounterSettings::new("x").enabled(false))
                .unwrap()
                .unwrap();

            b.iter(|| {
                let workers: Vec<_> = (0..threads)
                    .map(|_| {
                        let telemetry = telemetry.clone();
                        thread::spawn(move || {
                            for i in 0..100 {
                                telemetry.add(id, black_box(i as f64)).unwrap();
                            }
                        })
                    })
                    .collect();
                for worker in workers {
                    worker.join().unwrap();
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_trace, bench_telemetry);
criterion_main!(benches);
