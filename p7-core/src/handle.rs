//! Opaque handles to engine-side objects.
//!
//! A handle is a pointer-sized value handed out by the engine. Zero means
//! "no object", so every handle type wraps a `NonZeroUsize` and the null
//! case is spelled `Option<Handle>`.

use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Kind of engine object a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Connection to a sink, parent of every channel
    Client,
    /// Trace (log) channel
    Trace,
    /// Telemetry (counter) channel
    Telemetry,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Client => "client",
            ResourceKind::Trace => "trace",
            ResourceKind::Telemetry => "telemetry",
        }
    }

    /// True for the kinds that hang off a client
    pub fn is_channel(&self) -> bool {
        !matches!(self, ResourceKind::Client)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NonZeroUsize);

        impl $name {
            /// Wrap a raw engine value, `None` for the null handle.
            #[inline]
            pub const fn from_raw(raw: usize) -> Option<Self> {
                match NonZeroUsize::new(raw) {
                    Some(value) => Some(Self(value)),
                    None => None,
                }
            }

            #[inline]
            pub const fn as_raw(self) -> usize {
                self.0.get()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0.get())
            }
        }
    };
}

define_handle!(
    /// Opaque handle to a client, trace or telemetry object.
    Handle
);

define_handle!(
    /// Opaque handle to a trace module, used to scope verbosity.
    ModuleHandle
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_no_handle() {
        assert!(Handle::from_raw(0).is_none());
        assert!(ModuleHandle::from_raw(0).is_none());
    }

    #[test]
    fn test_equality_is_identity() {
        let a = Handle::from_raw(0x10).unwrap();
        let b = Handle::from_raw(0x10).unwrap();
        let c = Handle::from_raw(0x20).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_raw(), 0x10);
        assert_eq!(format!("{:?}", a), "Handle(0x10)");
    }

    #[test]
    fn test_resource_kind_display() {
        assert_eq!(ResourceKind::Telemetry.to_string(), "telemetry");
        assert!(ResourceKind::Trace.is_channel());
        assert!(!ResourceKind::Client.is_channel());
    }
}
