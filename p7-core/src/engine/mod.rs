//! Engine boundary
//!
//! Everything this crate does ends in a call on an [`Engine`]: the opaque
//! component that owns the real objects, their reference counts and the
//! process-wide shared-name table. The wrapper types never touch engine
//! state directly, which keeps them testable against an in-process engine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │           Client / Trace / Telemetry  (ref-counted wrappers)        │
//! └────────────────────────────────┬────────────────────────────────────┘
//!                                  │ Arc<dyn Engine>
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          Engine (trait)                             │
//! ├──────────────────────────────────┬──────────────────────────────────┤
//! │ MemoryEngine                     │ NativeEngine (feature "native")  │
//! │ (in-process, records calls)      │ (prebuilt p7 shared library)     │
//! └──────────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! ## Contract
//!
//! - A `None` handle from a create or lookup call means the engine refused.
//! - `add_ref`/`release` are atomic inside the engine and return the new
//!   count. A negative value means the handle was not alive.
//! - A channel keeps its client alive inside the engine; releasing the last
//!   wrapper reference to a client does not destroy it while channels exist.
//! - `get_shared` returns a new reference the caller must release. `share`
//!   does not take a reference.

mod memory;
#[cfg(feature = "native")]
mod native;

pub use memory::{
    current_thread_id, EngineCall, EngineLimits, EngineStats, MemoryEngine, RecordedTrace, Sample,
};
#[cfg(feature = "native")]
pub use native::NativeEngine;

use crate::handle::{Handle, ModuleHandle, ResourceKind};
use crate::telemetry::{CounterId, CounterSettings, TelemetryConfig};
use crate::trace::{Level, TraceRecord};

/// Abstract engine boundary
///
/// Implementations must be safe to call from any thread.
pub trait Engine: Send + Sync {
    /// Backend name (for logging)
    fn name(&self) -> &'static str;

    // Client

    /// Allocate a client from an initialization string
    fn client_create(&self, args: &str) -> Option<Handle>;

    /// Push buffered data of one client to its sink
    fn client_flush(&self, client: Handle) -> bool;

    // Trace channel

    fn trace_create(&self, client: Handle, name: &str) -> Option<Handle>;

    /// Thread id 0 stands for the calling thread
    fn trace_register_thread(&self, trace: Handle, name: &str, thread_id: u32) -> bool;

    fn trace_unregister_thread(&self, trace: Handle, thread_id: u32) -> bool;

    fn trace_register_module(&self, trace: Handle, name: &str) -> Option<ModuleHandle>;

    /// `None` module sets the channel-wide verbosity
    fn trace_set_verbosity(&self, trace: Handle, module: Option<ModuleHandle>, level: Level);

    fn trace_get_verbosity(&self, trace: Handle, module: Option<ModuleHandle>) -> Level;

    /// Records below the effective verbosity are accepted and dropped
    fn trace_emit(&self, trace: Handle, record: &TraceRecord<'_>) -> bool;

    // Telemetry channel

    fn telemetry_create(
        &self,
        client: Handle,
        name: &str,
        config: &TelemetryConfig,
    ) -> Option<Handle>;

    fn telemetry_create_counter(
        &self,
        telemetry: Handle,
        settings: &CounterSettings,
    ) -> Option<CounterId>;

    fn telemetry_put_value(&self, telemetry: Handle, counter: CounterId, value: f64) -> bool;

    fn telemetry_find_counter(&self, telemetry: Handle, name: &str) -> Option<CounterId>;

    // Shared lifecycle

    /// Publish `handle` under `name`; false if the engine refuses
    fn share(&self, kind: ResourceKind, handle: Handle, name: &str) -> bool;

    /// Look up a shared object and take a new reference on it
    fn get_shared(&self, kind: ResourceKind, name: &str) -> Option<Handle>;

    fn add_ref(&self, kind: ResourceKind, handle: Handle) -> i32;

    fn release(&self, kind: ResourceKind, handle: Handle) -> i32;

    // Process wide

    /// Ask every client to deliver what it has buffered
    fn flush(&self);

    /// Crash-path flush, safe to call from a fault handler
    fn exceptional_flush(&self);
}
