//! Reference-counted engine resources
//!
//! A [`Resource`] owns one or more engine-side references to a single
//! object. It is either `Live` or `Released`; every operation on a released
//! resource fails with [`P7Error::InvalidState`] before reaching the engine.
//!
//! ## Locking
//!
//! The local state sits behind a read-write lock. Ordinary operations take
//! it shared for the duration of their engine call, so a concurrent
//! `release` cannot free the handle underneath them. `add_ref` and
//! `release` take it exclusively.
//!
//! ## Ownership accounting
//!
//! `held` counts the references this wrapper owns, not the engine's total.
//! Other wrappers (or other processes' components) may hold more, so the
//! engine count is always `>= held` while the object is healthy. A release
//! that reports fewer references than the wrapper still holds means someone
//! released a reference they did not own.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::engine::Engine;
use crate::error::{P7Error, Result};
use crate::handle::{Handle, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceState {
    Live { handle: Handle, held: u32 },
    Released,
}

/// One engine object plus the references this wrapper holds on it
pub struct Resource {
    kind: ResourceKind,
    engine: Arc<dyn Engine>,
    state: RwLock<ResourceState>,
}

impl Resource {
    /// Take ownership of one reference the engine already handed out.
    pub(crate) fn adopt(engine: Arc<dyn Engine>, kind: ResourceKind, handle: Handle) -> Self {
        Self {
            kind,
            engine,
            state: RwLock::new(ResourceState::Live { handle, held: 1 }),
        }
    }

    /// Look up a shared object; the result owns the reference the lookup took.
    pub(crate) fn get_shared(
        engine: Arc<dyn Engine>,
        kind: ResourceKind,
        name: &str,
    ) -> Option<Self> {
        let handle = engine.get_shared(kind, name)?;
        debug!(%kind, name, ?handle, "Acquired shared reference");
        Some(Self::adopt(engine, kind, handle))
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Current handle, `None` once released
    pub fn handle(&self) -> Option<Handle> {
        match *self.state.read() {
            ResourceState::Live { handle, .. } => Some(handle),
            ResourceState::Released => None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.handle().is_some()
    }

    /// References this wrapper still owns
    pub fn held(&self) -> u32 {
        match *self.state.read() {
            ResourceState::Live { held, .. } => held,
            ResourceState::Released => 0,
        }
    }

    /// Run `f` with the live handle while holding the state lock shared.
    pub fn with_handle<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn Engine, Handle) -> T,
    ) -> Result<T> {
        let state = self.state.read();
        match *state {
            ResourceState::Live { handle, .. } => Ok(f(self.engine.as_ref(), handle)),
            ResourceState::Released => Err(P7Error::InvalidState {
                kind: self.kind,
                operation,
            }),
        }
    }

    /// Publish this object under `name` for other components to look up.
    ///
    /// Returns `Ok(false)` when the engine refuses the name.
    pub fn share(&self, name: &str) -> Result<bool> {
        let kind = self.kind;
        let shared = self.with_handle("share", |engine, handle| engine.share(kind, handle, name))?;
        if !shared {
            warn!(%kind, name, "Engine refused to share object");
        }
        Ok(shared)
    }

    /// A second wrapper owning one new reference on the same object
    pub fn try_clone(&self) -> Result<Self> {
        let kind = self.kind;
        let handle = self.with_handle("clone", |engine, handle| {
            let count = engine.add_ref(kind, handle);
            (count >= 2).then_some(handle).ok_or(count)
        })?;
        match handle {
            Ok(handle) => Ok(Self::adopt(self.engine.clone(), kind, handle)),
            Err(count) => {
                error!(%kind, count, "P7 reference counter is damaged on clone");
                Err(P7Error::DamagedRefCount {
                    kind,
                    reported: count,
                    held: self.held(),
                })
            }
        }
    }

    /// Take one more reference, returning the engine's new count.
    pub fn add_ref(&self) -> Result<i32> {
        let mut state = self.state.write();
        let ResourceState::Live { handle, held } = *state else {
            return Err(P7Error::InvalidState {
                kind: self.kind,
                operation: "add_ref",
            });
        };

        let count = self.engine.add_ref(self.kind, handle);
        let expected = held.saturating_add(1);
        if count < 0 || (count as u32) < expected {
            error!(kind = %self.kind, ?handle, count, held, "P7 reference counter is damaged");
            *state = ResourceState::Released;
            return Err(P7Error::DamagedRefCount {
                kind: self.kind,
                reported: count,
                held,
            });
        }

        *state = ResourceState::Live {
            handle,
            held: expected,
        };
        Ok(count)
    }

    /// Give back one reference, returning the engine's new count.
    ///
    /// When the engine reaches zero, or this wrapper holds nothing more, the
    /// handle is cleared and later operations fail fast.
    pub fn release(&self) -> Result<i32> {
        let mut state = self.state.write();
        let ResourceState::Live { handle, held } = *state else {
            return Err(P7Error::InvalidState {
                kind: self.kind,
                operation: "release",
            });
        };

        let count = self.engine.release(self.kind, handle);
        let held_after = held.saturating_sub(1);
        if count < 0 || (count as u32) < held_after {
            error!(kind = %self.kind, ?handle, count, held = held_after, "P7 reference counter is damaged");
            *state = ResourceState::Released;
            return Err(P7Error::DamagedRefCount {
                kind: self.kind,
                reported: count,
                held: held_after,
            });
        }

        if count == 0 || held_after == 0 {
            debug!(kind = %self.kind, ?handle, count, "Released");
            *state = ResourceState::Released;
        } else {
            *state = ResourceState::Live {
                handle,
                held: held_after,
            };
        }
        Ok(count)
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        let state = std::mem::replace(self.state.get_mut(), ResourceState::Released);
        let ResourceState::Live { handle, held } = state else {
            return;
        };

        for remaining in (0..held).rev() {
            let count = self.engine.release(self.kind, handle);
            if count < 0 || (count as u32) < remaining {
                error!(kind = %self.kind, ?handle, count, held = remaining, "P7 reference counter is damaged on drop");
                break;
            }
        }
        debug!(kind = %self.kind, ?handle, released = held, "Dropped");
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &self.kind)
            .field("engine", &self.engine.name())
            .field("state", &*self.state.read())
            .finish()
    }
}
