//! P7 Demo - stream a moving point into telemetry counters
//!
//! Starts an owner against the in-process engine, moves a point towards a
//! sequence of targets inside a sphere and writes its x/y/z into the first
//! three counters of the first telemetry channel. Prints what the engine
//! recorded once the owner is torn down.
//!
//! Usage:
//!     p7-demo
//!     p7-demo --frames 1200 --radius 10
//!     p7-demo --config host.json --json

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use p7_core::{CounterSettings, EngineStats, InitParams, MemoryEngine, Sink};
use p7_host::{ChannelDeclaration, HostConfig, HostResult, Owner, TelemetryBinding, TimeType, TraceLayer};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

#[derive(Parser, Debug)]
#[command(name = "p7-demo")]
#[command(about = "Stream a moving point into P7 telemetry counters")]
#[command(version)]
struct Args {
    /// Host configuration JSON (default: one "Position" channel with x/y/z)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames to simulate
    #[arg(long, default_value_t = 600)]
    frames: u32,

    /// Simulated frame rate
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Radius of the sphere targets are picked in
    #[arg(long, default_value_t = 5.0)]
    radius: f64,

    /// Movement speed (fraction of the remaining distance per second)
    #[arg(long, default_value_t = 2.0)]
    speed: f64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    started_at: DateTime<Utc>,
    frames: u32,
    targets_reached: u32,
    counters: Vec<CounterReport>,
    engine: EngineStats,
}

#[derive(Serialize)]
struct CounterReport {
    channel: String,
    name: String,
    samples: u64,
    /// Among the samples the engine still retains
    alarms: usize,
}

/// Point chasing targets spread over a sphere
struct Mover {
    position: [f64; 3],
    target: [f64; 3],
    radius: f64,
    speed: f64,
    next: u32,
}

impl Mover {
    fn new(radius: f64, speed: f64) -> Self {
        let mut mover = Self {
            position: [0.0; 3],
            target: [0.0; 3],
            radius,
            speed,
            next: 0,
        };
        mover.pick_target();
        mover
    }

    fn pick_target(&mut self) {
        // Spiral over the unit sphere, scaled by a low-discrepancy distance
        let i = f64::from(self.next);
        let y = 1.0 - 2.0 * ((i * 0.618_033_988_75 + 0.5) % 1.0);
        let ring = (1.0 - y * y).sqrt();
        let theta = GOLDEN_ANGLE * i;
        let distance = self.radius * ((i * 0.754_877_666 + 0.3) % 1.0);
        self.target = [ring * theta.cos() * distance, y * distance, ring * theta.sin() * distance];
        self.next += 1;
    }

    /// Advance one frame; true when the target was reached
    fn step(&mut self, dt: f64) -> bool {
        let t = (self.speed * dt).min(1.0);
        for (p, target) in self.position.iter_mut().zip(self.target) {
            *p += (target - *p) * t;
        }
        let distance = self
            .position
            .iter()
            .zip(self.target)
            .map(|(p, target)| (target - p).powi(2))
            .sum::<f64>()
            .sqrt();
        if distance < 0.1 {
            self.pick_target();
            return true;
        }
        false
    }
}

fn default_config(radius: f64) -> HostConfig {
    let axis = |name: &str| CounterSettings::new(name).range(-radius, radius);
    HostConfig {
        init: InitParams::new().sink(Sink::Null).name("p7-demo"),
        flush_on_panic: true,
        telemetry: vec![ChannelDeclaration::new("Position")
            .time_type(TimeType::Host)
            .counter(axis("x"))
            .counter(axis("y"))
            .counter(axis("z"))],
        ..HostConfig::default()
    }
}

fn main() {
    let args = Args::parse();

    let bridge = TraceLayer::new();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "p7_host=info,p7_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(bridge.clone())
        .init();

    if let Err(e) = run(&args, &bridge) {
        eprintln!("Error [{}]: {}", e.error_code(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args, bridge: &TraceLayer) -> HostResult<()> {
    let config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None => default_config(args.radius),
    };

    let started_at = Utc::now();
    let engine = Arc::new(MemoryEngine::new());
    let clock = Arc::new(AtomicU64::new(0));
    let host_clock = clock.clone();
    let owner = Arc::new(
        Owner::start(engine.clone(), &config)?
            .with_host_clock(NANOS_PER_SECOND, move || host_clock.load(Ordering::Relaxed)),
    );
    if config.bridge_log {
        bridge.attach(&owner);
    }

    let bindings = config
        .telemetry
        .iter()
        .cloned()
        .map(|declaration| TelemetryBinding::bind(declaration, &owner))
        .collect::<HostResult<Vec<_>>>()?;

    tracing::info!(
        engine = "memory",
        channels = bindings.len(),
        frames = args.frames,
        "Demo started"
    );

    let dt = 1.0 / args.fps.max(1.0);
    let frame_nanos = (dt * NANOS_PER_SECOND as f64) as u64;
    let mut mover = Mover::new(args.radius, args.speed);
    let mut targets_reached = 0;

    for frame in 0..args.frames {
        clock.fetch_add(frame_nanos, Ordering::Relaxed);
        if mover.step(dt) {
            targets_reached += 1;
            tracing::debug!(frame, target = ?mover.target, "New target");
        }

        if let Some(binding) = bindings.first().filter(|b| b.count() > 2) {
            for (axis, value) in mover.position.iter().enumerate() {
                if let Some(counter) = binding.counter(axis) {
                    counter.add(*value);
                }
            }
        }
    }
    tracing::info!(targets_reached, "Demo finished");

    // Gather samples while channels are still alive
    let mut counters = Vec::new();
    for binding in &bindings {
        let Some(telemetry) = binding.telemetry() else {
            continue;
        };
        let Some(handle) = telemetry.handle() else {
            continue;
        };
        for index in 0..binding.count() {
            if let Some(counter) = binding.counter(index) {
                let samples = engine.samples(handle, counter.id());
                counters.push(CounterReport {
                    channel: binding.id().to_string(),
                    name: counter.settings().name.clone(),
                    samples: engine.sample_count(handle, counter.id()),
                    alarms: samples.iter().filter(|s| s.alarm).count(),
                });
            }
        }
    }

    owner.flush()?;
    for binding in &bindings {
        binding.on_application_quit()?;
    }
    bridge.detach();
    owner.teardown()?;

    let report = Report {
        started_at,
        frames: args.frames,
        targets_reached,
        counters,
        engine: engine.stats(),
    };
    print_report(&report, args.json)?;
    Ok(())
}

fn print_report(report: &Report, json: bool) -> HostResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("P7 demo ({})", report.started_at.to_rfc3339());
    println!("  frames:          {}", report.frames);
    println!("  targets reached: {}", report.targets_reached);
    for counter in &report.counters {
        println!(
            "  {}/{}: {} samples, {} alarms",
            counter.channel, counter.name, counter.samples, counter.alarms
        );
    }
    let stats = &report.engine;
    println!("  trace records:   {}", stats.trace_records);
    println!("  live objects:    {}", stats.live_clients + stats.live_traces + stats.live_telemetry);
    Ok(())
}
