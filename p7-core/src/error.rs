//! Error types for P7 operations
//!
//! Construction failures and misuse of released handles are raised as
//! [`P7Error`]. Runtime operations that the engine may legitimately refuse
//! (sharing a name, creating a counter, adding a sample, registering a
//! thread or module) are NOT errors: they come back as `bool`/`Option`
//! values so callers can degrade gracefully.
//!
//! # Error Codes
//!
//! Each variant has a stable error code (e.g. `ALLOCATION_FAILED`) that hosts
//! can switch on or aggregate in their own logs.
//!
//! # Example
//!
//! ```rust
//! use p7_core::error::{ErrorCategory, P7Error};
//! use p7_core::ResourceKind;
//!
//! fn handle_error(err: P7Error) {
//!     match err.category() {
//!         ErrorCategory::Allocation => println!("engine refused: {}", err),
//!         ErrorCategory::State => println!("handle already released"),
//!         _ => println!("other error"),
//!     }
//!
//!     if err.is_recoverable() {
//!         println!("retry may succeed");
//!     }
//! }
//!
//! handle_error(P7Error::InvalidState {
//!     kind: ResourceKind::Client,
//!     operation: "share",
//! });
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handle::ResourceKind;

/// Result type alias for P7 operations
pub type Result<T> = std::result::Result<T, P7Error>;

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The engine refused to allocate an object
    Allocation,
    /// The caller passed a released or otherwise unusable dependency
    Validation,
    /// Operation on a released resource or torn-down owner
    State,
    /// A shared lookup found nothing under the requested name
    NotFound,
    /// The engine-side reference count is inconsistent
    Integrity,
}

/// Errors that can occur in P7 operations
#[derive(Error, Debug)]
pub enum P7Error {
    // ═══════════════════════════════════════════════════════════════════════
    // Construction errors
    // ═══════════════════════════════════════════════════════════════════════

    /// The engine returned a null handle on creation
    #[error("Can't create P7 {kind}: {reason}")]
    AllocationFailed { kind: ResourceKind, reason: String },

    /// A dependency passed by the caller is null or already released
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Operation attempted on a resource whose handle was cleared
    #[error("P7 {kind} handle already released, '{operation}' is not allowed")]
    InvalidState {
        kind: ResourceKind,
        operation: &'static str,
    },

    /// Operation attempted on an owner after teardown
    #[error("Owner already torn down, '{operation}' is not allowed")]
    TornDown { operation: &'static str },

    /// Nothing was shared under the requested name
    #[error("No shared P7 {kind} named '{name}'")]
    NotFound { kind: ResourceKind, name: String },

    /// The engine reported a reference count this wrapper cannot account for
    #[error("P7 {kind} reference counter is damaged: engine reported {reported}, wrapper still holds {held}")]
    DamagedRefCount {
        kind: ResourceKind,
        reported: i32,
        held: u32,
    },
}

impl P7Error {
    /// Returns true if this error might succeed on retry
    ///
    /// Allocation failures are usually capacity limits that free up once
    /// other channels are released. A missing shared name may appear later.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            P7Error::AllocationFailed { .. } | P7Error::NotFound { .. }
        )
    }

    /// Returns true if this error is caused by misuse of a released object
    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(
            self,
            P7Error::InvalidState { .. } | P7Error::TornDown { .. }
        )
    }

    /// Returns the error category for grouping
    pub fn category(&self) -> ErrorCategory {
        match self {
            P7Error::AllocationFailed { .. } => ErrorCategory::Allocation,
            P7Error::InvalidArgument { .. } => ErrorCategory::Validation,
            P7Error::InvalidState { .. } | P7Error::TornDown { .. } => ErrorCategory::State,
            P7Error::NotFound { .. } => ErrorCategory::NotFound,
            P7Error::DamagedRefCount { .. } => ErrorCategory::Integrity,
        }
    }

    /// Returns the stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            P7Error::AllocationFailed { .. } => "ALLOCATION_FAILED",
            P7Error::InvalidArgument { .. } => "INVALID_ARGUMENT",
            P7Error::InvalidState { .. } => "INVALID_STATE",
            P7Error::TornDown { .. } => "OWNER_TORN_DOWN",
            P7Error::NotFound { .. } => "NOT_FOUND",
            P7Error::DamagedRefCount { .. } => "DAMAGED_REF_COUNT",
        }
    }

    /// Converts this error to a JSON-serializable response object
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                category: self.category(),
                recoverable: self.is_recoverable(),
            },
        }
    }
}

/// JSON-serializable error response for hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail for JSON responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable error code (e.g., "INVALID_STATE")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Error category
    pub category: ErrorCategory,
    /// Whether retry might succeed
    pub recoverable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            P7Error::AllocationFailed {
                kind: ResourceKind::Trace,
                reason: "too many channels".to_string()
            }
            .category(),
            ErrorCategory::Allocation
        );
        assert_eq!(
            P7Error::InvalidState {
                kind: ResourceKind::Client,
                operation: "flush"
            }
            .category(),
            ErrorCategory::State
        );
        assert_eq!(
            P7Error::TornDown { operation: "add telemetry" }.category(),
            ErrorCategory::State
        );
        assert_eq!(
            P7Error::DamagedRefCount {
                kind: ResourceKind::Telemetry,
                reported: -1,
                held: 0
            }
            .category(),
            ErrorCategory::Integrity
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            P7Error::NotFound {
                kind: ResourceKind::Trace,
                name: "Debug".to_string()
            }
            .error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            P7Error::InvalidArgument {
                reason: "client released".to_string()
            }
            .error_code(),
            "INVALID_ARGUMENT"
        );
    }

    #[test]
    fn test_recoverable_and_lifecycle() {
        let alloc = P7Error::AllocationFailed {
            kind: ResourceKind::Client,
            reason: "bad config".to_string(),
        };
        assert!(alloc.is_recoverable());
        assert!(!alloc.is_lifecycle_violation());

        let state = P7Error::InvalidState {
            kind: ResourceKind::Client,
            operation: "add_ref",
        };
        assert!(!state.is_recoverable());
        assert!(state.is_lifecycle_violation());
    }

    #[test]
    fn test_error_response_serialization() {
        let err = P7Error::InvalidState {
            kind: ResourceKind::Telemetry,
            operation: "add",
        };
        let response = err.to_error_response();

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("INVALID_STATE"));
        assert!(json.contains("telemetry"));
        assert!(json.contains("\"state\""));

        let parsed: ErrorResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.error.code, "INVALID_STATE");
        assert!(!parsed.error.recoverable);
    }

    #[test]
    fn test_error_messages_name_the_operation() {
        let msg = P7Error::InvalidState {
            kind: ResourceKind::Trace,
            operation: "register_module",
        }
        .to_string();
        assert!(msg.contains("trace"));
        assert!(msg.contains("register_module"));
    }
}
