//! Crash-path flush
//!
//! Buffered trace and telemetry data is lost if the process dies before the
//! engine delivers it. One panic hook is installed per process; it asks every
//! registered engine for an exceptional flush and then hands over to the
//! hook that was installed before it.
//!
//! Engines are registered by weak reference, so registration never keeps an
//! engine alive and registering the same engine twice flushes it once.

use std::panic;
use std::sync::{Arc, Once, Weak};

use parking_lot::{const_mutex, Mutex};
use tracing::debug;

use crate::engine::Engine;

static HOOK: Once = Once::new();
static TARGETS: Mutex<Vec<Weak<dyn Engine>>> = const_mutex(Vec::new());

/// Flush `engine` on panic, ahead of the previously installed hook.
///
/// Returns false if `engine` was already registered.
pub fn install_panic_flush(engine: &Arc<dyn Engine>) -> bool {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            flush_registered();
            previous(info);
        }));
    });

    let weak = Arc::downgrade(engine);
    let mut targets = TARGETS.lock();
    targets.retain(|target| target.strong_count() > 0);
    if targets.iter().any(|target| Weak::ptr_eq(target, &weak)) {
        return false;
    }
    targets.push(weak);
    debug!(engine = engine.name(), registered = targets.len(), "Panic flush registered");
    true
}

/// Engines currently registered for the crash-path flush
pub fn panic_flush_targets() -> usize {
    TARGETS
        .lock()
        .iter()
        .filter(|target| target.strong_count() > 0)
        .count()
}

fn flush_registered() {
    // A panic while the list is being edited must not deadlock the hook.
    let Some(targets) = TARGETS.try_lock() else {
        return;
    };
    let live: Vec<Arc<dyn Engine>> = targets.iter().filter_map(Weak::upgrade).collect();
    drop(targets);
    for engine in live {
        engine.exceptional_flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    #[test]
    fn test_panic_flush_registers_once_and_holds_no_reference() {
        let memory = Arc::new(MemoryEngine::new());
        let engine: Arc<dyn Engine> = memory.clone();

        assert!(install_panic_flush(&engine));
        assert!(!install_panic_flush(&engine));
        assert!(!install_panic_flush(&engine));
        drop(engine);
        assert_eq!(Arc::strong_count(&memory), 1);

        let result = std::thread::spawn(|| panic!("boom")).join();
        assert!(result.is_err());
        // Other tests may panic while the hook is installed
        assert!(memory.stats().exceptional_flushes >= 1);
    }

    #[test]
    fn test_dropped_engine_is_forgotten() {
        let memory = Arc::new(MemoryEngine::new());
        let engine: Arc<dyn Engine> = memory.clone();
        install_panic_flush(&engine);
        let weak = Arc::downgrade(&engine);

        drop(engine);
        drop(memory);
        assert!(weak.upgrade().is_none());

        // Registering again prunes the dead entry
        let other: Arc<dyn Engine> = Arc::new(MemoryEngine::new());
        assert!(install_panic_flush(&other));
        assert!(!TARGETS.lock().iter().any(|t| Weak::ptr_eq(t, &weak)));
    }
}
