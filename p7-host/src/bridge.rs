//! Log bridge
//!
//! Two ways host log messages reach the owner's trace channel:
//!
//! - [`HostLogType`] for hosts with their own severity scale, passed to
//!   [`Owner::handle_log`].
//! - [`TraceLayer`], a `tracing_subscriber` layer forwarding the `tracing`
//!   event stream. Events from this workspace's crates are skipped so the
//!   wrapper's own diagnostics never loop back into the engine.

use std::fmt::{self, Write as _};
use std::sync::{Arc, Weak};

use p7_core::Level;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::owner::Owner;

/// Targets never forwarded
const OWN_TARGETS: [&str; 2] = ["p7_core", "p7_host"];

/// Host log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostLogType {
    Log,
    Warning,
    Error,
    Exception,
    Assert,
}

impl HostLogType {
    pub fn level(self) -> Level {
        match self {
            HostLogType::Log => Level::Info,
            HostLogType::Warning => Level::Warning,
            HostLogType::Error => Level::Error,
            HostLogType::Exception => Level::Critical,
            _ => Level::Debug,
        }
    }
}

/// Forwards `tracing` events to an owner's trace channel.
///
/// Cloning shares the attachment, so a layer can be installed before the
/// owner exists and attached once it does.
#[derive(Clone, Default)]
pub struct TraceLayer {
    owner: Arc<RwLock<Weak<Owner>>>,
}

impl TraceLayer {
    /// A layer that drops everything until [`attach`](Self::attach)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached(owner: &Arc<Owner>) -> Self {
        let layer = Self::new();
        layer.attach(owner);
        layer
    }

    pub fn attach(&self, owner: &Arc<Owner>) {
        *self.owner.write() = Arc::downgrade(owner);
    }

    pub fn detach(&self) {
        *self.owner.write() = Weak::new();
    }

    pub fn is_attached(&self) -> bool {
        self.owner.read().strong_count() > 0
    }
}

fn is_own_target(target: &str) -> bool {
    OWN_TARGETS.iter().any(|own| {
        target
            .strip_prefix(own)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// Collects the message and fields of one event
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(mut self) -> String {
        if !self.fields.is_empty() {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message.push_str(self.fields.trim_start());
        }
        self.message
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for TraceLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_own_target(metadata.target()) {
            return;
        }
        let Some(owner) = self.owner.read().upgrade() else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        owner.log(Level::from_tracing(metadata.level()), &visitor.finish());
    }
}

impl fmt::Debug for TraceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceLayer")
            .field("attached", &self.is_attached())
            .finish()
    }
}
