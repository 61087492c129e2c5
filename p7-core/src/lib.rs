//! # P7 Core - reference-counted handles for the P7 engine
//!
//! P7 is a logging and telemetry engine. Its objects (clients, trace
//! channels, telemetry channels) are reference counted and may be shared by
//! name between components of one process. This crate wraps them so they
//! neither leak nor get released twice:
//!
//! - **Engine**: the boundary every call ends in. [`MemoryEngine`] runs in
//!   process and records calls; `NativeEngine` (feature `native`) calls the
//!   prebuilt shared library.
//! - **Resources**: [`Client`], [`Trace`] and [`Telemetry`] own their engine
//!   references and release them on drop. A released resource fails fast.
//! - **Registry**: [`ChannelRegistry`] publishes and looks up resources by
//!   name.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use p7_core::{ChannelRegistry, Client, CounterSettings, MemoryEngine, Telemetry, Trace};
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let client = Client::create(engine.clone(), "/P7.Sink=Null").unwrap();
//!
//! // Trace channel
//! let trace = Trace::create(&client, "Debug").unwrap();
//! trace.info(None, "engine up").unwrap();
//!
//! // Telemetry channel with one counter
//! let telemetry = Telemetry::create(&client, "frame").unwrap();
//! let fps = telemetry
//!     .create_counter(&CounterSettings::new("fps").range(0.0, 120.0))
//!     .unwrap()
//!     .unwrap();
//! telemetry.add(fps, 59.9).unwrap();
//!
//! // Share the client with other components
//! let registry = ChannelRegistry::new(engine.clone());
//! registry.publish(&client, "main").unwrap();
//! let other: Client = registry.lookup("main").unwrap();
//! assert_eq!(other.handle(), client.handle());
//!
//! // Channels keep the client alive inside the engine
//! drop(other);
//! drop(client);
//! drop(trace);
//! drop(telemetry);
//! assert_eq!(engine.live_objects(), 0);
//! ```

pub mod client;
pub mod crash;
pub mod engine;
pub mod error;
pub mod handle;
pub mod init;
pub mod registry;
pub mod resource;
pub mod telemetry;
pub mod trace;

// Re-export main types
pub use client::Client;
pub use crash::{install_panic_flush, panic_flush_targets};
pub use engine::{
    current_thread_id, Engine, EngineCall, EngineLimits, EngineStats, MemoryEngine, RecordedTrace,
    Sample,
};
#[cfg(feature = "native")]
pub use engine::NativeEngine;
pub use error::{ErrorCategory, P7Error, Result};
pub use handle::{Handle, ModuleHandle, ResourceKind};
pub use init::{InitParams, Sink, DEFAULT_INIT};
pub use registry::{ChannelRegistry, SharedResource};
pub use resource::Resource;
pub use telemetry::{CounterId, CounterSettings, Telemetry, TelemetryConfig};
pub use trace::{Level, SourceLocation, Trace, TraceRecord, UNKNOWN_LOCATION};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
