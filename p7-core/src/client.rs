//! Client: the connection to a sink that every channel hangs off

use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::{P7Error, Result};
use crate::handle::ResourceKind;
use crate::init::InitParams;
use crate::registry::SharedResource;
use crate::resource::Resource;

/// Reference-counted engine client
#[derive(Debug)]
pub struct Client(Resource);

impl Client {
    /// Create a client from an initialization string such as
    /// `/P7.Sink=Baical /P7.Addr=localhost`.
    pub fn create(engine: Arc<dyn Engine>, args: &str) -> Result<Self> {
        let handle = engine
            .client_create(args)
            .ok_or_else(|| P7Error::AllocationFailed {
                kind: ResourceKind::Client,
                reason: format!("engine refused initialization string '{}'", args),
            })?;
        info!(engine = engine.name(), args, ?handle, "P7 client created");
        Ok(Self(Resource::adopt(engine, ResourceKind::Client, handle)))
    }

    pub fn with_params(engine: Arc<dyn Engine>, params: &InitParams) -> Result<Self> {
        Self::create(engine, &params.to_string())
    }

    /// Client shared by another component under `name`, `None` if absent.
    pub fn get_shared(engine: Arc<dyn Engine>, name: &str) -> Option<Self> {
        Resource::get_shared(engine, ResourceKind::Client, name).map(Self)
    }

    /// Deliver everything this client has buffered
    pub fn flush(&self) -> Result<bool> {
        let flushed = self.with_handle("flush", |engine, handle| engine.client_flush(handle))?;
        debug!(flushed, "Client flush");
        Ok(flushed)
    }

    /// New wrapper owning its own reference to the same client
    pub fn try_clone(&self) -> Result<Self> {
        self.0.try_clone().map(Self)
    }
}

impl Deref for Client {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}

impl SharedResource for Client {
    const KIND: ResourceKind = ResourceKind::Client;

    fn from_resource(resource: Resource) -> Self {
        Self(resource)
    }

    fn resource(&self) -> &Resource {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    #[test]
    fn test_create_and_flush() {
        let engine = Arc::new(MemoryEngine::new());
        let client = Client::create(engine.clone(), "/P7.Sink=Null").unwrap();
        let handle = client.handle().unwrap();

        assert!(client.flush().unwrap());
        assert_eq!(engine.client_flush_count(handle), 1);
    }

    #[test]
    fn test_refused_init_is_allocation_error() {
        let engine = Arc::new(MemoryEngine::new());
        let err = Client::create(engine.clone(), "/P7.Sink=Pigeon").unwrap_err();
        assert!(matches!(
            err,
            P7Error::AllocationFailed { kind: ResourceKind::Client, .. }
        ));
        assert_eq!(engine.live_objects(), 0);
    }

    #[test]
    fn test_flush_after_release_fails() {
        let engine = Arc::new(MemoryEngine::new());
        let client = Client::with_params(engine, &InitParams::new()).unwrap();
        client.release().unwrap();
        assert!(matches!(
            client.flush(),
            Err(P7Error::InvalidState { operation: "flush", .. })
        ));
    }
}
