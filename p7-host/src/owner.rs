//! Owner component
//!
//! The owner holds one client, the default trace channel and every telemetry
//! channel minted through it. Teardown releases them in dependency order:
//! telemetry channels first, then the trace channel, then the client.
//!
//! The dependent list is guarded by one lock that is never held across an
//! engine call. Closing the list (`None`) is how teardown keeps late
//! `telemetry_add` calls from slipping in.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use p7_core::{
    install_panic_flush, Client, Engine, Level, P7Error, SourceLocation, Telemetry,
    TelemetryConfig, Trace,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::bridge::HostLogType;
use crate::config::{HostConfig, TimeType};
use crate::error::{HostError, HostResult};

/// Host clock used for [`TimeType::Host`] channels
pub type HostClock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Client component coordinating its dependents' lifetimes
pub struct Owner {
    client: Client,
    trace: Trace,
    /// `None` once teardown has started
    dependents: Mutex<Option<Vec<Arc<Telemetry>>>>,
    torn_down: AtomicBool,
    bridge_log: bool,
    host_clock: Option<(u64, HostClock)>,
}

impl Owner {
    /// Create the client and the default trace channel.
    pub fn start(engine: Arc<dyn Engine>, config: &HostConfig) -> HostResult<Self> {
        let client = Client::with_params(engine, &config.init)?;
        let trace = Trace::create(&client, &config.trace_name)?;
        if config.flush_on_panic {
            install_panic_flush(client.engine());
        }

        let owner = Self {
            client,
            trace,
            dependents: Mutex::new(Some(Vec::new())),
            torn_down: AtomicBool::new(false),
            bridge_log: config.bridge_log,
            host_clock: None,
        };
        info!(init = %config.init, trace = %config.trace_name, "P7 owner started");
        owner.handle_log("Hello from P7 logger", HostLogType::Log);
        Ok(owner)
    }

    /// Stamp [`TimeType::Host`] channels with `clock` ticking at `frequency` Hz
    pub fn with_host_clock<F>(mut self, frequency: u64, clock: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.host_clock = Some((frequency, Arc::new(clock)));
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Number of telemetry channels currently tracked
    pub fn dependent_count(&self) -> usize {
        self.dependents.lock().as_ref().map_or(0, Vec::len)
    }

    /// Mint a telemetry channel stamped by the clock `time_type` selects.
    ///
    /// Without a host clock, [`TimeType::Host`] falls back to the engine's.
    pub fn telemetry_add(&self, name: &str, time_type: TimeType) -> HostResult<Arc<Telemetry>> {
        let config = match (time_type, &self.host_clock) {
            (TimeType::System, _) => TelemetryConfig::default(),
            (TimeType::Host, Some((frequency, clock))) => {
                let clock = clock.clone();
                TelemetryConfig::new().with_clock(*frequency, move || clock())
            }
            (TimeType::Host, None) => {
                warn!(name, "No host clock configured, using the system clock");
                TelemetryConfig::default()
            }
        };
        self.telemetry_add_with(name, &config)
    }

    pub fn telemetry_add_with(
        &self,
        name: &str,
        config: &TelemetryConfig,
    ) -> HostResult<Arc<Telemetry>> {
        if self.dependents.lock().is_none() {
            return Err(Self::torn_down("telemetry_add"));
        }

        let telemetry = match Telemetry::create_with(&self.client, name, config) {
            Ok(telemetry) => Arc::new(telemetry),
            // Teardown may have released the client since the check above
            Err(_) if self.dependents.lock().is_none() => {
                return Err(Self::torn_down("telemetry_add"));
            }
            Err(err) => return Err(err.into()),
        };

        let mut dependents = self.dependents.lock();
        match dependents.as_mut() {
            Some(list) => {
                list.push(telemetry.clone());
                debug!(name, tracked = list.len(), "Telemetry dependent added");
                Ok(telemetry)
            }
            None => {
                // Teardown started while the channel was being created
                drop(dependents);
                drop(telemetry);
                Err(Self::torn_down("telemetry_add"))
            }
        }
    }

    fn torn_down(operation: &'static str) -> HostError {
        P7Error::TornDown { operation }.into()
    }

    /// Stop tracking `telemetry` and release it.
    ///
    /// Returns false if the channel is not tracked here (already deleted, or
    /// released by teardown).
    pub fn telemetry_del(&self, telemetry: &Arc<Telemetry>) -> HostResult<bool> {
        let removed = {
            let mut dependents = self.dependents.lock();
            dependents.as_mut().and_then(|list| {
                let index = list.iter().position(|t| Arc::ptr_eq(t, telemetry))?;
                Some(list.swap_remove(index))
            })
        };

        match removed {
            Some(telemetry) => {
                telemetry.release()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Forward a message to the default trace channel at `level`.
    ///
    /// Returns false once torn down or when bridging is disabled.
    pub fn log(&self, level: Level, message: &str) -> bool {
        if !self.bridge_log || self.is_torn_down() {
            return false;
        }
        self.trace
            .add(0, level, None, &SourceLocation::unknown(), message)
            .unwrap_or(false)
    }

    /// Forward a host log message, mapping its severity.
    pub fn handle_log(&self, message: &str, log_type: HostLogType) -> bool {
        self.log(log_type.level(), message)
    }

    pub fn flush(&self) -> HostResult<bool> {
        Ok(self.client.flush()?)
    }

    /// Release every dependent, then the trace channel, then the client.
    ///
    /// Idempotent. Keeps going after a failed release and returns the first
    /// error.
    pub fn teardown(&self) -> HostResult<()> {
        let Some(dependents) = self.dependents.lock().take() else {
            return Ok(());
        };

        let mut first_error: Option<P7Error> = None;
        let mut keep = |result: p7_core::Result<i32>| {
            if let Err(err) = result {
                if !err.is_lifecycle_violation() {
                    error!(error = %err, "Release failed during teardown");
                }
                first_error.get_or_insert(err);
            }
        };

        let released = dependents.len();
        for telemetry in dependents {
            // Bindings may have released theirs already
            if telemetry.is_live() {
                keep(telemetry.release());
            }
        }
        keep(self.trace.release());
        keep(self.client.release());

        self.torn_down.store(true, Ordering::Release);
        info!(dependents = released, "P7 owner torn down");

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

impl Drop for Owner {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            error!(error = %err, "Owner teardown on drop failed");
        }
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("client", &self.client.handle())
            .field("trace", &self.trace.handle())
            .field("dependents", &self.dependent_count())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
