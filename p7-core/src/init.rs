//! Client initialization string
//!
//! The engine takes a single free-form string of `/P7.Key=Value` options,
//! separated by whitespace. [`InitParams`] builds and parses that string;
//! unknown keys are carried through untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::trace::Level;

/// Initialization string used when the host configures nothing
pub const DEFAULT_INIT: &str = "/P7.Sink=Baical /P7.Addr=localhost";

const PREFIX: &str = "/P7.";

/// Where a client delivers its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sink {
    /// Network, to a Baical server
    #[default]
    Baical,
    FileTxt,
    FileBin,
    Console,
    Syslog,
    /// Network when a server answers, binary file otherwise
    Auto,
    /// Discard everything
    Null,
}

impl Sink {
    pub const ALL: [Sink; 7] = [
        Sink::Baical,
        Sink::FileTxt,
        Sink::FileBin,
        Sink::Console,
        Sink::Syslog,
        Sink::Auto,
        Sink::Null,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sink::Baical => "Baical",
            Sink::FileTxt => "FileTxt",
            Sink::FileBin => "FileBin",
            Sink::Console => "Console",
            Sink::Syslog => "Syslog",
            Sink::Auto => "Auto",
            Sink::Null => "Null",
        }
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sink {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sink::ALL
            .iter()
            .find(|sink| sink.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown sink '{}'", s))
    }
}

/// Builder for the client initialization string
///
/// ```rust
/// use p7_core::{InitParams, Sink};
///
/// let params = InitParams::new().sink(Sink::FileTxt).dir("/tmp/logs");
/// assert_eq!(params.to_string(), "/P7.Sink=FileTxt /P7.Dir=/tmp/logs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct InitParams {
    options: Vec<(String, String)>,
}

impl InitParams {
    /// No options at all; the engine applies its own defaults
    pub fn new() -> Self {
        Self {
            options: Vec::new(),
        }
    }

    /// Parse an initialization string.
    ///
    /// Tokens that are not `/P7.Key=Value` are skipped. A repeated key keeps
    /// the last value.
    pub fn parse(args: &str) -> Self {
        let mut params = Self::new();
        for token in args.split_whitespace() {
            let Some(option) = token.strip_prefix(PREFIX) else {
                tracing::debug!(token, "Ignoring init token without /P7. prefix");
                continue;
            };
            match option.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    params = params.option(key, value);
                }
                _ => tracing::debug!(token, "Ignoring malformed init option"),
            }
        }
        params
    }

    /// Set an arbitrary option, replacing an earlier value of the same key
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self
            .options
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(slot) => slot.1 = value,
            None => self.options.push((key, value)),
        }
        self
    }

    pub fn sink(self, sink: Sink) -> Self {
        self.option("Sink", sink.as_str())
    }

    /// Server address for network sinks
    pub fn addr(self, addr: impl Into<String>) -> Self {
        self.option("Addr", addr)
    }

    pub fn port(self, port: u16) -> Self {
        self.option("Port", port.to_string())
    }

    /// Process name shown by the viewer
    pub fn name(self, name: impl Into<String>) -> Self {
        self.option("Name", name)
    }

    /// Output directory for file sinks
    pub fn dir(self, dir: impl Into<String>) -> Self {
        self.option("Dir", dir)
    }

    /// Buffer pool size in kilobytes
    pub fn pool(self, kilobytes: u32) -> Self {
        self.option("Pool", kilobytes.to_string())
    }

    /// Initial verbosity of every trace channel of the client
    pub fn verbosity(self, level: Level) -> Self {
        self.option("Verb", level.as_u32().to_string())
    }

    /// Value of `key`, compared case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Configured sink, `None` when absent or unknown
    pub fn sink_kind(&self) -> Option<Sink> {
        self.get("Sink").and_then(|s| s.parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

impl Default for InitParams {
    fn default() -> Self {
        Self::parse(DEFAULT_INIT)
    }
}

impl fmt::Display for InitParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.options.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}{}={}", PREFIX, key, value)?;
        }
        Ok(())
    }
}

impl From<String> for InitParams {
    fn from(args: String) -> Self {
        Self::parse(&args)
    }
}

impl From<&str> for InitParams {
    fn from(args: &str) -> Self {
        Self::parse(args)
    }
}

impl From<InitParams> for String {
    fn from(params: InitParams) -> Self {
        params.to_string()
    }
}
