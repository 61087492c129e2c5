//! P7 Host - host-side components for P7 clients
//!
//! The host is the application embedding the engine. It owns:
//! - An [`Owner`]: one client, the default trace channel, and every
//!   telemetry channel minted through it, torn down in dependency order
//! - [`TelemetryBinding`]s: declared channels with their counters
//! - The log bridge: host log messages and `tracing` events forwarded into
//!   the owner's trace channel
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         HOST                                │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐          │
//! │  │ Telemetry   │  │ Telemetry   │  │ TraceLayer  │          │
//! │  │ Binding     │  │ Binding     │  │ (log bridge)│          │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘          │
//! │         └────────────────┼────────────────┘                 │
//! │                    ┌─────▼─────┐                            │
//! │                    │   Owner   │  client + "Debug" trace    │
//! │                    └─────┬─────┘                            │
//! └──────────────────────────┼──────────────────────────────────┘
//!                            │ p7_core::Engine
//!                            ▼
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use p7_core::{CounterSettings, InitParams, MemoryEngine, Sink};
//! use p7_host::{ChannelDeclaration, HostConfig, HostLogType, Owner, TelemetryBinding};
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let config = HostConfig {
//!     init: InitParams::new().sink(Sink::Null),
//!     ..HostConfig::default()
//! };
//! let owner = Arc::new(Owner::start(engine.clone(), &config).unwrap());
//!
//! let declaration = ChannelDeclaration::new("Frame").counter(CounterSettings::new("fps"));
//! let binding = TelemetryBinding::bind(declaration, &owner).unwrap();
//! binding.counter(0).unwrap().add(60.0);
//!
//! owner.handle_log("level loaded", HostLogType::Log);
//!
//! owner.teardown().unwrap();
//! assert_eq!(engine.live_objects(), 0);
//! ```

pub mod binding;
pub mod bridge;
pub mod config;
pub mod error;
pub mod owner;

pub use binding::{Counter, TelemetryBinding};
pub use bridge::{HostLogType, TraceLayer};
pub use config::{ChannelDeclaration, HostConfig, TimeType};
pub use error::{HostError, HostResult};
pub use owner::{HostClock, Owner};
