//! Trace and telemetry channel behavior against the in-process engine

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use p7_core::{
    Client, CounterId, CounterSettings, EngineLimits, Level, MemoryEngine, SourceLocation,
    Telemetry, TelemetryConfig, Trace, UNKNOWN_LOCATION,
};

fn setup() -> (Arc<MemoryEngine>, Client) {
    let engine = Arc::new(MemoryEngine::new());
    let client = Client::create(engine.clone(), "/P7.Sink=Null").expect("Failed to create client");
    (engine, client)
}

// ═══════════════════════════════════════════════════════════════════════════
// Trace
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn unresolved_location_sends_sentinel() {
    let (engine, client) = setup();
    let trace = Trace::create(&client, "Debug").unwrap();

    trace
        .add(0, Level::Error, None, &SourceLocation::unknown(), "no frame info")
        .unwrap();

    let records = engine.records(trace.handle().unwrap());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].file, UNKNOWN_LOCATION);
    assert_eq!(records[0].function, UNKNOWN_LOCATION);
    assert_eq!(records[0].message, "no frame info");
}

#[test]
fn trace_id_and_thread_travel_with_record() {
    let (engine, client) = setup();
    let trace = Trace::create(&client, "Debug").unwrap();
    assert!(trace.register_current_thread("main").unwrap());

    trace
        .add(7, Level::Info, None, &SourceLocation::new("game.rs", 12, "update"), "tick")
        .unwrap();

    let handle = trace.handle().unwrap();
    let record = &engine.records(handle)[0];
    assert_eq!(record.trace_id, 7);
    assert_eq!(record.line, 12);
    assert_eq!(engine.thread_name(handle, record.thread_id).as_deref(), Some("main"));
}

#[test]
fn channel_verbosity_filters_but_accepts() {
    let (engine, client) = setup();
    let trace = Trace::create(&client, "Debug").unwrap();
    trace.set_verbosity(None, Level::Warning).unwrap();

    assert!(trace.debug(None, "below threshold").unwrap());
    assert!(trace.error(None, "above threshold").unwrap());

    let records = engine.records(trace.handle().unwrap());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, Level::Error);
}

// ═══════════════════════════════════════════════════════════════════════════
// Telemetry
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn counter_beyond_limit_fails_and_earlier_stay_valid() {
    let engine = Arc::new(MemoryEngine::with_limits(EngineLimits {
        max_counters_per_channel: 4,
        ..EngineLimits::default()
    }));
    let client = Client::create(engine.clone(), "/P7.Sink=Null").unwrap();
    let telemetry = Telemetry::create(&client, "stats").unwrap();

    let ids: Vec<CounterId> = (0..4)
        .map(|i| {
            telemetry
                .create_counter(&CounterSettings::new(format!("c{}", i)))
                .unwrap()
                .expect("within limit")
        })
        .collect();

    assert_eq!(
        telemetry.create_counter(&CounterSettings::new("c4")).unwrap(),
        None
    );

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(telemetry.find_counter(&format!("c{}", i)).unwrap(), Some(*id));
        assert!(telemetry.add(*id, i as f64).unwrap());
    }
}

#[test]
fn default_limit_is_256_counters() {
    let (_engine, client) = setup();
    let telemetry = Telemetry::create(&client, "stats").unwrap();

    for i in 0..256 {
        assert!(telemetry
            .create_counter(&CounterSettings::new(format!("counter-{}", i)))
            .unwrap()
            .is_some());
    }
    assert!(telemetry
        .create_counter(&CounterSettings::new("counter-256"))
        .unwrap()
        .is_none());
    assert!(telemetry.find_counter("counter-0").unwrap().is_some());
}

#[test]
fn concurrent_adds_keep_counter_table_intact() {
    let (engine, client) = setup();
    let telemetry = Arc::new(Telemetry::create(&client, "stats").unwrap());
    let ids: Vec<CounterId> = ["x", "y", "z"]
        .iter()
        .map(|name| telemetry.create_counter(&CounterSettings::new(*name)).unwrap().unwrap())
        .collect();

    const THREADS: usize = 8;
    const SAMPLES: usize = 500;

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let telemetry = telemetry.clone();
            let ids = ids.clone();
            thread::spawn(move || {
                for i in 0..SAMPLES {
                    let id = ids[(t + i) % ids.len()];
                    assert!(telemetry.add(id, i as f64).unwrap());
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    let handle = telemetry.handle().unwrap();
    let total: usize = ids.iter().map(|id| engine.samples(handle, *id).len()).sum();
    assert_eq!(total, THREADS * SAMPLES);
    assert_eq!(engine.counter_names(handle), vec!["x", "y", "z"]);
    assert_eq!(telemetry.find_counter("y").unwrap(), Some(ids[1]));
}

#[test]
fn concurrent_adds_racing_release_fail_closed() {
    let (_engine, client) = setup();
    let telemetry = Arc::new(Telemetry::create(&client, "stats").unwrap());
    let id = telemetry.create_counter(&CounterSettings::new("x")).unwrap().unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let telemetry = telemetry.clone();
            thread::spawn(move || {
                for i in 0..1_000 {
                    // Either accepted or rejected as released, never a crash
                    let _ = telemetry.add(id, i as f64);
                }
            })
        })
        .collect();
    telemetry.release().unwrap();
    for worker in workers {
        worker.join().expect("worker panicked");
    }
    assert!(!telemetry.is_live());
}

#[test]
fn host_clock_stamps_samples() {
    let (engine, client) = setup();
    let ticks = Arc::new(AtomicU64::new(100));
    let clock = ticks.clone();
    let config =
        TelemetryConfig::new().with_clock(1_000, move || clock.fetch_add(10, Ordering::SeqCst));
    let telemetry = Telemetry::create_with(&client, "stats", &config).unwrap();
    let id = telemetry.create_counter(&CounterSettings::new("x")).unwrap().unwrap();

    telemetry.add(id, 1.0).unwrap();
    telemetry.add(id, 2.0).unwrap();

    let stamps: Vec<u64> = engine
        .samples(telemetry.handle().unwrap(), id)
        .iter()
        .map(|s| s.timestamp)
        .collect();
    assert_eq!(stamps, vec![100, 110]);
}
