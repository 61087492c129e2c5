//! Telemetry (counter) channel

mod counter;

pub use counter::{CounterId, CounterSettings, EnableCallback, TelemetryConfig, TimestampSource};

use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::Client;
use crate::engine::Engine;
use crate::error::{P7Error, Result};
use crate::handle::ResourceKind;
use crate::registry::SharedResource;
use crate::resource::Resource;

/// Reference-counted telemetry channel
#[derive(Debug)]
pub struct Telemetry(Resource);

impl Telemetry {
    /// Create a channel stamped by the engine's own clock
    pub fn create(client: &Client, name: &str) -> Result<Self> {
        Self::create_with(client, name, &TelemetryConfig::default())
    }

    pub fn create_with(client: &Client, name: &str, config: &TelemetryConfig) -> Result<Self> {
        let created = client
            .with_handle("create telemetry", |engine, handle| {
                engine.telemetry_create(handle, name, config)
            })
            .map_err(|_| P7Error::InvalidArgument {
                reason: format!("can't create telemetry '{}', client is released", name),
            })?;
        let handle = created.ok_or_else(|| P7Error::AllocationFailed {
            kind: ResourceKind::Telemetry,
            reason: format!("client refused channel '{}', channel limit reached?", name),
        })?;
        debug!(name, ?handle, ?config, "Telemetry channel created");
        Ok(Self(Resource::adopt(
            client.engine().clone(),
            ResourceKind::Telemetry,
            handle,
        )))
    }

    /// Telemetry channel shared under `name`, `None` if absent.
    pub fn get_shared(engine: Arc<dyn Engine>, name: &str) -> Option<Self> {
        Resource::get_shared(engine, ResourceKind::Telemetry, name).map(Self)
    }

    /// Declare a counter; `None` when the name is taken or the channel is full.
    pub fn create_counter(&self, settings: &CounterSettings) -> Result<Option<CounterId>> {
        let id = self.with_handle("create counter", |engine, handle| {
            engine.telemetry_create_counter(handle, settings)
        })?;
        if id.is_none() {
            warn!(counter = %settings.name, "Engine refused counter");
        }
        Ok(id)
    }

    /// Append one sample, stamped by the channel's clock
    pub fn add(&self, counter: CounterId, value: f64) -> Result<bool> {
        self.with_handle("add sample", |engine, handle| {
            engine.telemetry_put_value(handle, counter, value)
        })
    }

    pub fn find_counter(&self, name: &str) -> Result<Option<CounterId>> {
        self.with_handle("find counter", |engine, handle| {
            engine.telemetry_find_counter(handle, name)
        })
    }

    pub fn try_clone(&self) -> Result<Self> {
        self.0.try_clone().map(Self)
    }
}

impl Deref for Telemetry {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}

impl SharedResource for Telemetry {
    const KIND: ResourceKind = ResourceKind::Telemetry;

    fn from_resource(resource: Resource) -> Self {
        Self(resource)
    }

    fn resource(&self) -> &Resource {
        &self.0
    }
}
