//! Trace (log) channel
//!
//! Messages carry a level, an optional module and the source location they
//! were emitted from. Filtering by verbosity happens inside the engine.

mod level;
mod location;

pub use level::Level;
pub use location::{SourceLocation, TraceRecord, UNKNOWN_LOCATION};

use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;

use crate::client::Client;
use crate::engine::Engine;
use crate::error::{P7Error, Result};
use crate::handle::{ModuleHandle, ResourceKind};
use crate::registry::SharedResource;
use crate::resource::Resource;

/// Reference-counted trace channel
#[derive(Debug)]
pub struct Trace(Resource);

impl Trace {
    /// Create a trace channel on a live client.
    ///
    /// Fails with [`P7Error::InvalidArgument`] if the client was released
    /// and [`P7Error::AllocationFailed`] if the engine refuses the channel.
    pub fn create(client: &Client, name: &str) -> Result<Self> {
        let created = client
            .with_handle("create trace", |engine, handle| engine.trace_create(handle, name))
            .map_err(|_| P7Error::InvalidArgument {
                reason: format!("can't create trace '{}', client is released", name),
            })?;
        let handle = created.ok_or_else(|| P7Error::AllocationFailed {
            kind: ResourceKind::Trace,
            reason: format!("client refused channel '{}', channel limit reached?", name),
        })?;
        debug!(name, ?handle, "Trace channel created");
        Ok(Self(Resource::adopt(
            client.engine().clone(),
            ResourceKind::Trace,
            handle,
        )))
    }

    /// Trace channel shared under `name`, `None` if absent.
    pub fn get_shared(engine: Arc<dyn Engine>, name: &str) -> Option<Self> {
        Resource::get_shared(engine, ResourceKind::Trace, name).map(Self)
    }

    /// Name a thread; `thread_id` 0 is the calling thread.
    pub fn register_thread(&self, name: &str, thread_id: u32) -> Result<bool> {
        self.with_handle("register thread", |engine, handle| {
            engine.trace_register_thread(handle, name, thread_id)
        })
    }

    pub fn register_current_thread(&self, name: &str) -> Result<bool> {
        self.register_thread(name, 0)
    }

    pub fn unregister_thread(&self, thread_id: u32) -> Result<bool> {
        self.with_handle("unregister thread", |engine, handle| {
            engine.trace_unregister_thread(handle, thread_id)
        })
    }

    /// Register a module to scope verbosity; `None` if the engine refuses.
    pub fn register_module(&self, name: &str) -> Result<Option<ModuleHandle>> {
        self.with_handle("register module", |engine, handle| {
            engine.trace_register_module(handle, name)
        })
    }

    /// Set verbosity of one module, or of the whole channel with `None`
    pub fn set_verbosity(&self, module: Option<ModuleHandle>, level: Level) -> Result<()> {
        self.with_handle("set verbosity", |engine, handle| {
            engine.trace_set_verbosity(handle, module, level)
        })
    }

    pub fn verbosity(&self, module: Option<ModuleHandle>) -> Result<Level> {
        self.with_handle("get verbosity", |engine, handle| {
            engine.trace_get_verbosity(handle, module)
        })
    }

    /// Emit one message.
    ///
    /// Missing parts of `location` are sent as [`UNKNOWN_LOCATION`].
    pub fn add(
        &self,
        trace_id: u16,
        level: Level,
        module: Option<ModuleHandle>,
        location: &SourceLocation<'_>,
        message: &str,
    ) -> Result<bool> {
        let record = TraceRecord::new(trace_id, level, module, location, message);
        self.with_handle("trace", |engine, handle| engine.trace_emit(handle, &record))
    }

    #[track_caller]
    pub fn trace(&self, module: Option<ModuleHandle>, message: &str) -> Result<bool> {
        self.add(0, Level::Trace, module, &SourceLocation::caller(), message)
    }

    #[track_caller]
    pub fn debug(&self, module: Option<ModuleHandle>, message: &str) -> Result<bool> {
        self.add(0, Level::Debug, module, &SourceLocation::caller(), message)
    }

    #[track_caller]
    pub fn info(&self, module: Option<ModuleHandle>, message: &str) -> Result<bool> {
        self.add(0, Level::Info, module, &SourceLocation::caller(), message)
    }

    #[track_caller]
    pub fn warning(&self, module: Option<ModuleHandle>, message: &str) -> Result<bool> {
        self.add(0, Level::Warning, module, &SourceLocation::caller(), message)
    }

    #[track_caller]
    pub fn error(&self, module: Option<ModuleHandle>, message: &str) -> Result<bool> {
        self.add(0, Level::Error, module, &SourceLocation::caller(), message)
    }

    #[track_caller]
    pub fn critical(&self, module: Option<ModuleHandle>, message: &str) -> Result<bool> {
        self.add(0, Level::Critical, module, &SourceLocation::caller(), message)
    }

    pub fn try_clone(&self) -> Result<Self> {
        self.0.try_clone().map(Self)
    }
}

impl Deref for Trace {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}

impl SharedResource for Trace {
    const KIND: ResourceKind = ResourceKind::Trace;

    fn from_resource(resource: Resource) -> Self {
        Self(resource)
    }

    fn resource(&self) -> &Resource {
        &self.0
    }
}
