//! Counter definitions and telemetry channel configuration

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a counter inside one telemetry channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterId(pub u16);

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declaration of one counter.
///
/// `min`/`max` only guide visualization. Samples outside
/// `[a_min, a_max]` are highlighted as alarms. Infinite alarm bounds are
/// written as `null` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSettings {
    /// Unique per channel, case sensitive, at most 64 characters
    pub name: String,

    #[serde(default)]
    pub min: f64,

    #[serde(
        default = "default_alarm_min",
        serialize_with = "alarm_bound::serialize",
        deserialize_with = "alarm_bound::lower"
    )]
    pub a_min: f64,

    #[serde(default = "default_max")]
    pub max: f64,

    #[serde(
        default = "default_alarm_max",
        serialize_with = "alarm_bound::serialize",
        deserialize_with = "alarm_bound::upper"
    )]
    pub a_max: f64,

    /// Initial state; the engine may toggle it at runtime
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_alarm_min() -> f64 { f64::NEG_INFINITY }
fn default_max() -> f64 { 1.0 }
fn default_alarm_max() -> f64 { f64::INFINITY }
fn default_true() -> bool { true }

impl CounterSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min: 0.0,
            a_min: default_alarm_min(),
            max: default_max(),
            a_max: default_alarm_max(),
            enabled: true,
        }
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn alarm(mut self, a_min: f64, a_max: f64) -> Self {
        self.a_min = a_min;
        self.a_max = a_max;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// True when `value` falls outside the alarm range
    pub fn is_alarm(&self, value: f64) -> bool {
        value < self.a_min || value > self.a_max
    }
}

mod alarm_bound {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn lower<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
    }

    pub fn upper<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

/// Host clock returning ticks at `TelemetryConfig::timestamp_frequency`
pub type TimestampSource = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Called by the engine when a counter is switched on or off remotely
pub type EnableCallback = Arc<dyn Fn(CounterId, bool) + Send + Sync>;

/// Options for a telemetry channel
#[derive(Clone, Default)]
pub struct TelemetryConfig {
    /// Ticks per second of `timestamp`; 0 lets the engine use its own clock
    pub timestamp_frequency: u64,
    pub timestamp: Option<TimestampSource>,
    pub on_enable: Option<EnableCallback>,
}

impl TelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock<F>(mut self, frequency: u64, clock: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.timestamp_frequency = frequency;
        self.timestamp = Some(Arc::new(clock));
        self
    }

    pub fn on_enable<F>(mut self, callback: F) -> Self
    where
        F: Fn(CounterId, bool) + Send + Sync + 'static,
    {
        self.on_enable = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("timestamp_frequency", &self.timestamp_frequency)
            .field("host_clock", &self.timestamp.is_some())
            .field("on_enable", &self.on_enable.is_some())
            .finish()
    }
}
