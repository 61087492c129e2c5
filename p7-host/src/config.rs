//! Configuration for P7 Host

use std::collections::HashSet;
use std::path::Path;

use p7_core::{CounterSettings, InitParams};
use serde::{Deserialize, Serialize};

use crate::error::{HostError, HostResult};

/// Longest counter name the engine accepts
pub const MAX_COUNTER_NAME: usize = 64;

/// Main host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Client initialization string
    #[serde(default)]
    pub init: InitParams,

    /// Name of the owner's default trace channel
    #[serde(default = "default_trace_name")]
    pub trace_name: String,

    /// Forward host log messages into the default trace channel
    #[serde(default = "default_true")]
    pub bridge_log: bool,

    /// Ask the engine for an exceptional flush when the process panics
    #[serde(default)]
    pub flush_on_panic: bool,

    /// Telemetry channels to bind at startup
    #[serde(default)]
    pub telemetry: Vec<ChannelDeclaration>,
}

fn default_trace_name() -> String { "Debug".to_string() }
fn default_true() -> bool { true }

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            init: InitParams::default(),
            trace_name: default_trace_name(),
            bridge_log: true,
            flush_on_panic: false,
            telemetry: Vec::new(),
        }
    }
}

impl HostConfig {
    pub fn from_json(json: &str) -> HostResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> HostResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject what the engine would refuse later, with a readable message.
    pub fn validate(&self) -> HostResult<()> {
        if self.trace_name.is_empty() {
            return Err(HostError::Config("trace_name must not be empty".into()));
        }

        let mut ids = HashSet::new();
        for channel in &self.telemetry {
            if !ids.insert(channel.id.as_str()) {
                return Err(HostError::Config(format!(
                    "telemetry channel '{}' declared twice",
                    channel.id
                )));
            }
            channel.validate()?;
        }
        Ok(())
    }
}

/// Which clock stamps telemetry samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeType {
    /// Engine's own clock
    #[default]
    System,
    /// Clock supplied by the host application
    Host,
}

/// A telemetry channel and its counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDeclaration {
    /// Channel name
    #[serde(default = "default_channel_id")]
    pub id: String,

    #[serde(default)]
    pub time_type: TimeType,

    #[serde(default)]
    pub counters: Vec<CounterSettings>,
}

fn default_channel_id() -> String { "Telemetry 1".to_string() }

impl Default for ChannelDeclaration {
    fn default() -> Self {
        Self {
            id: default_channel_id(),
            time_type: TimeType::System,
            counters: Vec::new(),
        }
    }
}

impl ChannelDeclaration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn time_type(mut self, time_type: TimeType) -> Self {
        self.time_type = time_type;
        self
    }

    pub fn counter(mut self, settings: CounterSettings) -> Self {
        self.counters.push(settings);
        self
    }

    pub fn validate(&self) -> HostResult<()> {
        let mut names = HashSet::new();
        for counter in &self.counters {
            let len = counter.name.chars().count();
            if len == 0 || len > MAX_COUNTER_NAME {
                return Err(HostError::Config(format!(
                    "counter name '{}' in '{}' must be 1..={} characters",
                    counter.name, self.id, MAX_COUNTER_NAME
                )));
            }
            if !names.insert(counter.name.as_str()) {
                return Err(HostError::Config(format!(
                    "counter '{}' declared twice in '{}'",
                    counter.name, self.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p7_core::Sink;

    #[test]
    fn test_defaults() {
        let config = HostConfig::from_json("{}").unwrap();
        assert_eq!(config.init.to_string(), "/P7.Sink=Baical /P7.Addr=localhost");
        assert_eq!(config.trace_name, "Debug");
        assert!(config.bridge_log);
        assert!(!config.flush_on_panic);
        assert!(config.telemetry.is_empty());
    }

    #[test]
    fn test_full_document() {
        let config = HostConfig::from_json(
            r#"{
                "init": "/P7.Sink=FileTxt /P7.Dir=logs",
                "telemetry": [
                    {
                        "id": "Position",
                        "time_type": "host",
                        "counters": [
                            {"name": "x", "min": -5, "max": 5},
                            {"name": "hp", "a_min": 10, "a_max": null, "enabled": false}
                        ]
                    },
                    {}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.init.sink_kind(), Some(Sink::FileTxt));
        let position = &config.telemetry[0];
        assert_eq!(position.time_type, TimeType::Host);
        assert_eq!(position.counters[0].min, -5.0);
        assert_eq!(position.counters[1].a_max, f64::INFINITY);
        assert!(!position.counters[1].enabled);
        assert_eq!(config.telemetry[1].id, "Telemetry 1");
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let err = HostConfig::from_json(r#"{"telemetry": [{"id": "a"}, {"id": "a"}]}"#).unwrap_err();
        assert!(matches!(err, HostError::Config(_)));
    }

    #[test]
    fn test_bad_counter_names_rejected() {
        let long = ChannelDeclaration::new("t").counter(CounterSettings::new("n".repeat(65)));
        assert!(long.validate().is_err());

        let dup = ChannelDeclaration::new("t")
            .counter(CounterSettings::new("x"))
            .counter(CounterSettings::new("x"));
        assert!(dup.validate().is_err());

        // Names are case sensitive
        let ok = ChannelDeclaration::new("t")
            .counter(CounterSettings::new("x"))
            .counter(CounterSettings::new("X"));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            HostConfig::from_json("{"),
            Err(HostError::Serialization(_))
        ));
    }
}
