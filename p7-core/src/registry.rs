//! Shared-name registry
//!
//! The name table itself lives in the engine and is serialized there. This
//! service is the injectable front for it: components publish a resource
//! under a name and others look it up, each lookup returning a wrapper that
//! owns its own reference.
//!
//! ```rust
//! use std::sync::Arc;
//! use p7_core::{ChannelRegistry, Client, MemoryEngine, Trace};
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let registry = ChannelRegistry::new(engine.clone());
//!
//! let client = Client::create(engine, "/P7.Sink=Null").unwrap();
//! let trace = Trace::create(&client, "Debug").unwrap();
//! assert!(registry.publish(&trace, "main-trace").unwrap());
//!
//! let found: Trace = registry.lookup("main-trace").unwrap();
//! assert_eq!(found.handle(), trace.handle());
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::engine::Engine;
use crate::error::{P7Error, Result};
use crate::handle::ResourceKind;
use crate::resource::Resource;

/// A typed wrapper around a [`Resource`] that can be looked up by name
pub trait SharedResource: Sized {
    const KIND: ResourceKind;

    fn from_resource(resource: Resource) -> Self;

    fn resource(&self) -> &Resource;
}

/// Publish and look up resources by name
#[derive(Clone)]
pub struct ChannelRegistry {
    engine: Arc<dyn Engine>,
}

impl ChannelRegistry {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Publish `resource` under `name`.
    ///
    /// `Ok(false)` when the engine refuses the name. Fails if the resource
    /// was already released.
    pub fn publish<R: SharedResource>(&self, resource: &R, name: &str) -> Result<bool> {
        resource.resource().share(name)
    }

    /// Look up `name`; the returned wrapper holds a new reference.
    pub fn lookup<R: SharedResource>(&self, name: &str) -> Option<R> {
        Resource::get_shared(self.engine.clone(), R::KIND, name).map(R::from_resource)
    }

    /// Like [`lookup`](Self::lookup) but absence is an error
    pub fn require<R: SharedResource>(&self, name: &str) -> Result<R> {
        self.lookup(name).ok_or_else(|| P7Error::NotFound {
            kind: R::KIND,
            name: name.to_string(),
        })
    }

    /// Look up `name`, or create the resource and publish it.
    pub fn lookup_or_create<R, F>(&self, name: &str, create: F) -> Result<R>
    where
        R: SharedResource,
        F: FnOnce() -> Result<R>,
    {
        if let Some(found) = self.lookup(name) {
            return Ok(found);
        }
        let created = create()?;
        if !self.publish(&created, name)? {
            debug!(kind = %R::KIND, name, "Created resource was not published");
        }
        Ok(created)
    }

    /// Ask every client in the process to deliver what it has buffered
    pub fn flush(&self) {
        self.engine.flush();
    }

    /// Crash-path flush
    pub fn exceptional_flush(&self) {
        self.engine.exceptional_flush();
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("engine", &self.engine.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::{Client, Telemetry, Trace};

    fn setup() -> (Arc<MemoryEngine>, ChannelRegistry, Client) {
        let engine = Arc::new(MemoryEngine::new());
        let registry = ChannelRegistry::new(engine.clone());
        let client = Client::create(engine.clone(), "/P7.Sink=Null").unwrap();
        (engine, registry, client)
    }

    #[test]
    fn test_lookup_before_publish() {
        let (_engine, registry, _client) = setup();
        assert!(registry.lookup::<Client>("main").is_none());
        assert!(matches!(
            registry.require::<Client>("main"),
            Err(P7Error::NotFound { kind: ResourceKind::Client, .. })
        ));
    }

    #[test]
    fn test_names_are_scoped_by_kind() {
        let (_engine, registry, client) = setup();
        let trace = Trace::create(&client, "Debug").unwrap();
        registry.publish(&trace, "shared").unwrap();

        assert!(registry.lookup::<Telemetry>("shared").is_none());
        assert!(registry.lookup::<Trace>("shared").is_some());
    }

    #[test]
    fn test_publish_released_fails() {
        let (_engine, registry, client) = setup();
        client.release().unwrap();
        assert!(matches!(
            registry.publish(&client, "main"),
            Err(P7Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_lookup_or_create() {
        let (engine, registry, client) = setup();
        let first: Telemetry = registry
            .lookup_or_create("stats", || Telemetry::create(&client, "stats"))
            .unwrap();
        let second: Telemetry = registry
            .lookup_or_create("stats", || panic!("must reuse the published channel"))
            .unwrap();

        assert_eq!(first.handle(), second.handle());
        assert_eq!(engine.ref_count(first.handle().unwrap()), Some(2));
    }

    #[test]
    fn test_flushes_reach_engine() {
        let (engine, registry, _client) = setup();
        registry.flush();
        registry.exceptional_flush();
        let stats = engine.stats();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.exceptional_flushes, 1);
    }
}
