//! Telemetry binding
//!
//! Binds a declared telemetry channel to an owner and creates its counters.
//! Counters are reachable by declaration index or by name. After
//! [`TelemetryBinding::on_application_quit`] every counter refuses samples.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use p7_core::{CounterId, CounterSettings, Telemetry};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{ChannelDeclaration, TimeType};
use crate::error::{HostError, HostResult};
use crate::owner::Owner;

/// One counter of a bound channel
#[derive(Clone)]
pub struct Counter {
    settings: CounterSettings,
    id: CounterId,
    telemetry: Arc<Telemetry>,
    disposed: Arc<AtomicBool>,
}

impl Counter {
    pub fn settings(&self) -> &CounterSettings {
        &self.settings
    }

    pub fn id(&self) -> CounterId {
        self.id
    }

    /// Append a sample; false once the binding is disposed or the channel
    /// released.
    pub fn add(&self, value: f64) -> bool {
        if self.disposed.load(Ordering::Acquire) {
            return false;
        }
        self.telemetry.add(self.id, value).unwrap_or(false)
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("name", &self.settings.name)
            .field("id", &self.id)
            .finish()
    }
}

#[derive(Default)]
struct Bound {
    owner: Option<Arc<Owner>>,
    telemetry: Option<Arc<Telemetry>>,
    counters: Vec<Counter>,
    by_name: HashMap<String, usize>,
}

/// A declared telemetry channel attached to an owner
pub struct TelemetryBinding {
    declaration: ChannelDeclaration,
    bound: Mutex<Bound>,
    disposed: Arc<AtomicBool>,
}

impl TelemetryBinding {
    /// An unbound binding; attach it with [`set_owner`](Self::set_owner).
    pub fn new(declaration: ChannelDeclaration) -> Self {
        Self {
            declaration,
            bound: Mutex::new(Bound::default()),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn bind(declaration: ChannelDeclaration, owner: &Arc<Owner>) -> HostResult<Self> {
        let binding = Self::new(declaration);
        binding.set_owner(Some(owner.clone()))?;
        Ok(binding)
    }

    pub fn id(&self) -> &str {
        &self.declaration.id
    }

    pub fn time_type(&self) -> TimeType {
        self.declaration.time_type
    }

    pub fn owner(&self) -> Option<Arc<Owner>> {
        self.bound.lock().owner.clone()
    }

    pub fn telemetry(&self) -> Option<Arc<Telemetry>> {
        self.bound.lock().telemetry.clone()
    }

    /// Move the channel to another owner, or detach it with `None`.
    ///
    /// Counters of the old channel are dropped and the channel deleted from
    /// its owner before the new one is created with the declared counters.
    pub fn set_owner(&self, owner: Option<Arc<Owner>>) -> HostResult<()> {
        let mut bound = self.bound.lock();

        let previous = std::mem::take(&mut *bound);
        if let (Some(old_owner), Some(old_telemetry)) = (previous.owner, previous.telemetry) {
            old_owner.telemetry_del(&old_telemetry)?;
            debug!(id = %self.declaration.id, "Telemetry unbound from previous owner");
        }

        let Some(owner) = owner else {
            return Ok(());
        };

        let telemetry = owner.telemetry_add(&self.declaration.id, self.declaration.time_type)?;
        bound.owner = Some(owner);
        bound.telemetry = Some(telemetry.clone());

        for settings in &self.declaration.counters {
            Self::push_counter(&mut bound, &telemetry, &self.disposed, settings);
        }
        debug!(
            id = %self.declaration.id,
            counters = bound.counters.len(),
            "Telemetry bound"
        );
        Ok(())
    }

    /// Create one more counter; its index, or `None` if refused or unbound.
    pub fn counter_add(&self, settings: &CounterSettings) -> Option<usize> {
        let mut bound = self.bound.lock();
        let telemetry = bound.telemetry.clone()?;
        Self::push_counter(&mut bound, &telemetry, &self.disposed, settings)
    }

    fn push_counter(
        bound: &mut Bound,
        telemetry: &Arc<Telemetry>,
        disposed: &Arc<AtomicBool>,
        settings: &CounterSettings,
    ) -> Option<usize> {
        let id = match telemetry.create_counter(settings) {
            Ok(Some(id)) => id,
            Ok(None) => return None,
            Err(err) => {
                warn!(counter = %settings.name, error = %err, "Can't create counter");
                return None;
            }
        };

        let index = bound.counters.len();
        bound.counters.push(Counter {
            settings: settings.clone(),
            id,
            telemetry: telemetry.clone(),
            disposed: disposed.clone(),
        });
        bound.by_name.insert(settings.name.clone(), index);
        Some(index)
    }

    pub fn counter(&self, index: usize) -> Option<Counter> {
        self.bound.lock().counters.get(index).cloned()
    }

    pub fn counter_by_name(&self, name: &str) -> Option<Counter> {
        let bound = self.bound.lock();
        let index = *bound.by_name.get(name)?;
        bound.counters.get(index).cloned()
    }

    /// Number of counters created on the current channel
    pub fn count(&self) -> usize {
        self.bound.lock().counters.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Delete the channel from its owner and refuse further samples.
    pub fn on_application_quit(&self) -> HostResult<()> {
        let (owner, telemetry) = {
            let mut bound = self.bound.lock();
            (bound.owner.clone(), bound.telemetry.take())
        };

        let result = match (owner, telemetry) {
            (Some(owner), Some(telemetry)) => owner.telemetry_del(&telemetry).map(|_| ()),
            _ => Ok(()),
        };
        self.disposed.store(true, Ordering::Release);
        result
    }

    /// Channel of a bound binding, or [`HostError::Unbound`]
    pub fn require_telemetry(&self) -> HostResult<Arc<Telemetry>> {
        self.telemetry()
            .ok_or_else(|| HostError::Unbound(self.declaration.id.clone()))
    }
}

impl fmt::Debug for TelemetryBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryBinding")
            .field("id", &self.declaration.id)
            .field("counters", &self.count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use p7_core::{InitParams, MemoryEngine, Sink};

    fn owner(engine: &Arc<MemoryEngine>) -> Arc<Owner> {
        let config = HostConfig {
            init: InitParams::new().sink(Sink::Null),
            ..HostConfig::default()
        };
        Arc::new(Owner::start(engine.clone(), &config).unwrap())
    }

    fn position() -> ChannelDeclaration {
        ChannelDeclaration::new("Position")
            .counter(CounterSettings::new("x"))
            .counter(CounterSettings::new("y"))
            .counter(CounterSettings::new("z"))
    }

    #[test]
    fn test_counters_by_index_and_name() {
        let engine = Arc::new(MemoryEngine::new());
        let owner = owner(&engine);
        let binding = TelemetryBinding::bind(position(), &owner).unwrap();

        assert_eq!(binding.count(), 3);
        assert!(binding.counter(0).unwrap().add(1.0));
        assert_eq!(binding.counter_by_name("y").unwrap().settings().name, "y");
        assert!(binding.counter(3).is_none());
        assert!(binding.counter_by_name("w").is_none());
    }

    #[test]
    fn test_unbound_binding() {
        let binding = TelemetryBinding::new(position());
        assert_eq!(binding.count(), 0);
        assert!(binding.counter_add(&CounterSettings::new("w")).is_none());
        assert!(matches!(binding.require_telemetry(), Err(HostError::Unbound(_))));
        binding.on_application_quit().unwrap();
        assert!(binding.is_disposed());
    }

    #[test]
    fn test_quit_disposes_counters() {
        let engine = Arc::new(MemoryEngine::new());
        let owner = owner(&engine);
        let binding = TelemetryBinding::bind(position(), &owner).unwrap();
        let x = binding.counter(0).unwrap();
        let handle = binding.telemetry().unwrap().handle().unwrap();

        binding.on_application_quit().unwrap();
        assert!(binding.is_disposed());
        assert!(!x.add(1.0));
        assert!(!engine.is_alive(handle));
        assert_eq!(owner.dependent_count(), 0);
    }

    #[test]
    fn test_refused_counter_is_skipped() {
        let engine = Arc::new(MemoryEngine::new());
        let owner = owner(&engine);
        let declaration = position().counter(CounterSettings::new("x"));
        let binding = TelemetryBinding::bind(declaration, &owner).unwrap();
        assert_eq!(binding.count(), 3);
    }
}
