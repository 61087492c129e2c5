//! In-process engine
//!
//! Keeps every object in memory, enforces the same limits as the native
//! engine and records each lifecycle call. Tests inspect the recorded calls
//! to check ordering without a real sink behind the wrappers.
//!
//! Trace records and samples are retained up to
//! [`EngineLimits::max_retained_entries`] per channel or counter; older
//! entries are evicted first. Totals in [`EngineStats`] keep counting.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::Engine;
use crate::handle::{Handle, ModuleHandle, ResourceKind};
use crate::init::{InitParams, Sink};
use crate::telemetry::{CounterId, CounterSettings, TelemetryConfig};
use crate::trace::{Level, TraceRecord};

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static THREAD_ID: Cell<u32> = const { Cell::new(0) };
}

/// Engine-side id of the calling thread (never 0)
pub fn current_thread_id() -> u32 {
    THREAD_ID.with(|id| {
        if id.get() == 0 {
            id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        }
        id.get()
    })
}

/// Capacity limits of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLimits {
    pub max_channels_per_client: usize,
    pub max_counters_per_channel: usize,
    pub max_counter_name_len: usize,
    /// Records kept per trace channel and samples kept per counter
    pub max_retained_entries: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_channels_per_client: 32,
            max_counters_per_channel: 256,
            max_counter_name_len: 64,
            max_retained_entries: 65_536,
        }
    }
}

/// Lifecycle call observed by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Create { kind: ResourceKind, handle: Handle, name: String },
    CreateRefused { kind: ResourceKind, name: String },
    Share { kind: ResourceKind, handle: Handle, name: String, accepted: bool },
    GetShared { kind: ResourceKind, name: String, found: Option<Handle> },
    AddRef { kind: ResourceKind, handle: Handle, count: i32 },
    Release { kind: ResourceKind, handle: Handle, count: i32 },
    /// Count reached zero and the object was freed
    Destroyed { kind: ResourceKind, handle: Handle },
    ClientFlush { handle: Handle },
    Flush,
    ExceptionalFlush,
}

/// A trace record as stored by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedTrace {
    pub trace_id: u16,
    pub level: Level,
    pub module: Option<usize>,
    pub line: u16,
    pub file: String,
    pub function: String,
    pub message: String,
    pub thread_id: u32,
}

/// One telemetry sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: u64,
    pub value: f64,
    /// Outside the counter's alarm range
    pub alarm: bool,
}

/// Snapshot of engine activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub live_clients: usize,
    pub live_traces: usize,
    pub live_telemetry: usize,
    pub shared_names: usize,
    pub trace_records: u64,
    pub dropped_records: u64,
    pub samples: u64,
    pub dropped_samples: u64,
    pub flushes: u64,
    pub exceptional_flushes: u64,
}

struct ModuleEntry {
    name: String,
    verbosity: Option<Level>,
}

struct TraceChannel {
    verbosity: Level,
    modules: HashMap<ModuleHandle, ModuleEntry>,
    threads: HashMap<u32, String>,
    records: VecDeque<RecordedTrace>,
}

struct CounterState {
    settings: CounterSettings,
    enabled: bool,
    samples: VecDeque<Sample>,
    /// Accepted samples, including evicted ones
    accepted: u64,
}

struct TelemetryChannel {
    config: TelemetryConfig,
    counters: Vec<CounterState>,
}

enum Body {
    Client { flushes: u64 },
    Trace(TraceChannel),
    Telemetry(TelemetryChannel),
}

struct EngineObject {
    kind: ResourceKind,
    refs: i32,
    /// Client a channel keeps alive
    parent: Option<Handle>,
    body: Body,
}

#[derive(Default)]
struct State {
    next_handle: usize,
    next_module: usize,
    objects: HashMap<Handle, EngineObject>,
    shared: HashMap<(ResourceKind, String), Handle>,
    calls: Vec<EngineCall>,
    trace_records: u64,
    dropped_records: u64,
    samples: u64,
    dropped_samples: u64,
    flushes: u64,
    exceptional_flushes: u64,
}

impl State {
    fn alloc_handle(&mut self) -> Option<Handle> {
        self.next_handle += 0x10;
        Handle::from_raw(self.next_handle)
    }

    fn alive(&self, kind: ResourceKind, handle: Handle) -> Option<&EngineObject> {
        self.objects.get(&handle).filter(|o| o.kind == kind)
    }

    fn alive_mut(&mut self, kind: ResourceKind, handle: Handle) -> Option<&mut EngineObject> {
        self.objects.get_mut(&handle).filter(|o| o.kind == kind)
    }

    fn trace_mut(&mut self, handle: Handle) -> Option<&mut TraceChannel> {
        match self.alive_mut(ResourceKind::Trace, handle) {
            Some(EngineObject { body: Body::Trace(channel), .. }) => Some(channel),
            _ => None,
        }
    }

    fn telemetry(&self, handle: Handle) -> Option<&TelemetryChannel> {
        match self.alive(ResourceKind::Telemetry, handle) {
            Some(EngineObject { body: Body::Telemetry(channel), .. }) => Some(channel),
            _ => None,
        }
    }

    fn telemetry_mut(&mut self, handle: Handle) -> Option<&mut TelemetryChannel> {
        match self.alive_mut(ResourceKind::Telemetry, handle) {
            Some(EngineObject { body: Body::Telemetry(channel), .. }) => Some(channel),
            _ => None,
        }
    }

    fn channel_count(&self, client: Handle) -> usize {
        self.objects
            .values()
            .filter(|o| o.parent == Some(client))
            .count()
    }

    fn create_channel(
        &mut self,
        limits: &EngineLimits,
        kind: ResourceKind,
        client: Handle,
        name: &str,
        body: Body,
    ) -> Option<Handle> {
        let accepted = self.alive(ResourceKind::Client, client).is_some()
            && self.channel_count(client) < limits.max_channels_per_client;
        let handle = if accepted { self.alloc_handle() } else { None };

        let Some(handle) = handle else {
            self.calls.push(EngineCall::CreateRefused {
                kind,
                name: name.to_string(),
            });
            return None;
        };

        if let Some(parent) = self.alive_mut(ResourceKind::Client, client) {
            parent.refs += 1;
        }
        self.objects.insert(
            handle,
            EngineObject {
                kind,
                refs: 1,
                parent: Some(client),
                body,
            },
        );
        self.calls.push(EngineCall::Create {
            kind,
            handle,
            name: name.to_string(),
        });
        Some(handle)
    }

    /// Free an object whose count reached zero, then drop the reference it
    /// held on its client.
    fn destroy(&mut self, handle: Handle) {
        let mut next = Some(handle);
        while let Some(handle) = next.take() {
            let Some(object) = self.objects.remove(&handle) else {
                break;
            };
            self.shared.retain(|_, shared| *shared != handle);
            self.calls.push(EngineCall::Destroyed {
                kind: object.kind,
                handle,
            });

            if let Some(parent) = object.parent {
                if let Some(client) = self.objects.get_mut(&parent) {
                    client.refs -= 1;
                    if client.refs <= 0 {
                        next = Some(parent);
                    }
                }
            }
        }
    }
}

fn system_ticks() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or(0)
}

/// In-process engine with call recording
pub struct MemoryEngine {
    limits: EngineLimits,
    state: Mutex<State>,
}

impl MemoryEngine {
    /// Create an engine with the default limits
    pub fn new() -> Self {
        Self::with_limits(EngineLimits::default())
    }

    pub fn with_limits(limits: EngineLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(State::default()),
        }
    }

    pub fn limits(&self) -> EngineLimits {
        self.limits
    }

    /// All recorded lifecycle calls, oldest first
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Handles released, in call order
    pub fn released_handles(&self) -> Vec<Handle> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::Release { handle, .. } => Some(*handle),
                _ => None,
            })
            .collect()
    }

    /// Number of release calls made on `handle`
    pub fn release_count(&self, handle: Handle) -> usize {
        self.released_handles()
            .into_iter()
            .filter(|h| *h == handle)
            .count()
    }

    /// Engine-side reference count, `None` once destroyed
    pub fn ref_count(&self, handle: Handle) -> Option<i32> {
        self.state.lock().objects.get(&handle).map(|o| o.refs)
    }

    pub fn is_alive(&self, handle: Handle) -> bool {
        self.state.lock().objects.contains_key(&handle)
    }

    pub fn live_objects(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn records(&self, trace: Handle) -> Vec<RecordedTrace> {
        match self.state.lock().trace_mut(trace) {
            Some(channel) => channel.records.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn thread_name(&self, trace: Handle, thread_id: u32) -> Option<String> {
        let id = resolve_thread(thread_id);
        self.state
            .lock()
            .trace_mut(trace)
            .and_then(|channel| channel.threads.get(&id).cloned())
    }

    pub fn module_name(&self, trace: Handle, module: ModuleHandle) -> Option<String> {
        self.state
            .lock()
            .trace_mut(trace)
            .and_then(|channel| channel.modules.get(&module).map(|m| m.name.clone()))
    }

    pub fn samples(&self, telemetry: Handle, counter: CounterId) -> Vec<Sample> {
        let state = self.state.lock();
        state
            .telemetry(telemetry)
            .and_then(|channel| channel.counters.get(counter.0 as usize))
            .map(|c| c.samples.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Samples accepted by a counter since creation, evicted ones included
    pub fn sample_count(&self, telemetry: Handle, counter: CounterId) -> u64 {
        let state = self.state.lock();
        state
            .telemetry(telemetry)
            .and_then(|channel| channel.counters.get(counter.0 as usize))
            .map_or(0, |c| c.accepted)
    }

    pub fn counter_names(&self, telemetry: Handle) -> Vec<String> {
        let state = self.state.lock();
        state
            .telemetry(telemetry)
            .map(|channel| channel.counters.iter().map(|c| c.settings.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn counter_enabled(&self, telemetry: Handle, counter: CounterId) -> Option<bool> {
        let state = self.state.lock();
        state
            .telemetry(telemetry)
            .and_then(|channel| channel.counters.get(counter.0 as usize))
            .map(|c| c.enabled)
    }

    /// Switch a counter on or off the way a remote viewer would.
    ///
    /// Invokes the channel's enable callback when the state changes.
    pub fn set_counter_enabled(&self, telemetry: Handle, counter: CounterId, enabled: bool) -> bool {
        let callback = {
            let mut state = self.state.lock();
            let Some(channel) = state.telemetry_mut(telemetry) else {
                return false;
            };
            let callback = channel.config.on_enable.clone();
            let Some(slot) = channel.counters.get_mut(counter.0 as usize) else {
                return false;
            };
            if slot.enabled == enabled {
                return true;
            }
            slot.enabled = enabled;
            callback
        };

        if let Some(callback) = callback {
            callback(counter, enabled);
        }
        true
    }

    pub fn client_flush_count(&self, client: Handle) -> u64 {
        match self.state.lock().alive(ResourceKind::Client, client) {
            Some(EngineObject { body: Body::Client { flushes }, .. }) => *flushes,
            _ => 0,
        }
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.state.lock();
        let live = |kind| state.objects.values().filter(|o| o.kind == kind).count();
        EngineStats {
            live_clients: live(ResourceKind::Client),
            live_traces: live(ResourceKind::Trace),
            live_telemetry: live(ResourceKind::Telemetry),
            shared_names: state.shared.len(),
            trace_records: state.trace_records,
            dropped_records: state.dropped_records,
            samples: state.samples,
            dropped_samples: state.dropped_samples,
            flushes: state.flushes,
            exceptional_flushes: state.exceptional_flushes,
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_thread(thread_id: u32) -> u32 {
    if thread_id == 0 {
        current_thread_id()
    } else {
        thread_id
    }
}

impl Engine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn client_create(&self, args: &str) -> Option<Handle> {
        let params = InitParams::parse(args);
        let sink_ok = params
            .get("Sink")
            .map(|sink| sink.parse::<Sink>().is_ok())
            .unwrap_or(true);

        let mut state = self.state.lock();
        let handle = if sink_ok { state.alloc_handle() } else { None };
        let Some(handle) = handle else {
            state.calls.push(EngineCall::CreateRefused {
                kind: ResourceKind::Client,
                name: args.to_string(),
            });
            return None;
        };

        state.objects.insert(
            handle,
            EngineObject {
                kind: ResourceKind::Client,
                refs: 1,
                parent: None,
                body: Body::Client { flushes: 0 },
            },
        );
        state.calls.push(EngineCall::Create {
            kind: ResourceKind::Client,
            handle,
            name: args.to_string(),
        });
        Some(handle)
    }

    fn client_flush(&self, client: Handle) -> bool {
        let mut state = self.state.lock();
        match state.alive_mut(ResourceKind::Client, client) {
            Some(EngineObject { body: Body::Client { flushes }, .. }) => {
                *flushes += 1;
                state.calls.push(EngineCall::ClientFlush { handle: client });
                true
            }
            _ => false,
        }
    }

    fn trace_create(&self, client: Handle, name: &str) -> Option<Handle> {
        let body = Body::Trace(TraceChannel {
            verbosity: Level::Trace,
            modules: HashMap::new(),
            threads: HashMap::new(),
            records: VecDeque::new(),
        });
        self.state
            .lock()
            .create_channel(&self.limits, ResourceKind::Trace, client, name, body)
    }

    fn trace_register_thread(&self, trace: Handle, name: &str, thread_id: u32) -> bool {
        let id = resolve_thread(thread_id);
        match self.state.lock().trace_mut(trace) {
            Some(channel) => {
                channel.threads.insert(id, name.to_string());
                true
            }
            None => false,
        }
    }

    fn trace_unregister_thread(&self, trace: Handle, thread_id: u32) -> bool {
        let id = resolve_thread(thread_id);
        self.state
            .lock()
            .trace_mut(trace)
            .map(|channel| channel.threads.remove(&id).is_some())
            .unwrap_or(false)
    }

    fn trace_register_module(&self, trace: Handle, name: &str) -> Option<ModuleHandle> {
        let mut state = self.state.lock();
        state.next_module += 1;
        let candidate = ModuleHandle::from_raw(state.next_module)?;
        let channel = state.trace_mut(trace)?;

        if let Some((existing, _)) = channel.modules.iter().find(|(_, m)| m.name == name) {
            return Some(*existing);
        }
        channel.modules.insert(
            candidate,
            ModuleEntry {
                name: name.to_string(),
                verbosity: None,
            },
        );
        Some(candidate)
    }

    fn trace_set_verbosity(&self, trace: Handle, module: Option<ModuleHandle>, level: Level) {
        let mut state = self.state.lock();
        let Some(channel) = state.trace_mut(trace) else {
            return;
        };
        match module {
            None => channel.verbosity = level,
            Some(module) => {
                if let Some(entry) = channel.modules.get_mut(&module) {
                    entry.verbosity = Some(level);
                }
            }
        }
    }

    fn trace_get_verbosity(&self, trace: Handle, module: Option<ModuleHandle>) -> Level {
        let mut state = self.state.lock();
        let Some(channel) = state.trace_mut(trace) else {
            return Level::default();
        };
        module
            .and_then(|m| channel.modules.get(&m))
            .and_then(|entry| entry.verbosity)
            .unwrap_or(channel.verbosity)
    }

    fn trace_emit(&self, trace: Handle, record: &TraceRecord<'_>) -> bool {
        let thread_id = current_thread_id();
        let mut state = self.state.lock();
        let Some(channel) = state.trace_mut(trace) else {
            return false;
        };

        let threshold = record
            .module
            .and_then(|m| channel.modules.get(&m))
            .and_then(|entry| entry.verbosity)
            .unwrap_or(channel.verbosity);

        if record.level < threshold {
            state.dropped_records += 1;
            return true;
        }

        if channel.records.len() >= self.limits.max_retained_entries {
            channel.records.pop_front();
        }
        channel.records.push_back(RecordedTrace {
            trace_id: record.trace_id,
            level: record.level,
            module: record.module.map(|m| m.as_raw()),
            line: record.line,
            file: record.file.to_string(),
            function: record.function.to_string(),
            message: record.message.to_string(),
            thread_id,
        });
        state.trace_records += 1;
        true
    }

    fn telemetry_create(
        &self,
        client: Handle,
        name: &str,
        config: &TelemetryConfig,
    ) -> Option<Handle> {
        let body = Body::Telemetry(TelemetryChannel {
            config: config.clone(),
            counters: Vec::new(),
        });
        self.state
            .lock()
            .create_channel(&self.limits, ResourceKind::Telemetry, client, name, body)
    }

    fn telemetry_create_counter(
        &self,
        telemetry: Handle,
        settings: &CounterSettings,
    ) -> Option<CounterId> {
        let max_counters = self.limits.max_counters_per_channel.min(u16::MAX as usize + 1);
        let name_len = settings.name.chars().count();
        if name_len == 0 || name_len > self.limits.max_counter_name_len {
            return None;
        }

        let mut state = self.state.lock();
        let channel = state.telemetry_mut(telemetry)?;
        if channel.counters.len() >= max_counters
            || channel.counters.iter().any(|c| c.settings.name == settings.name)
        {
            return None;
        }

        let id = CounterId(u16::try_from(channel.counters.len()).ok()?);
        channel.counters.push(CounterState {
            settings: settings.clone(),
            enabled: settings.enabled,
            samples: VecDeque::new(),
            accepted: 0,
        });
        Some(id)
    }

    fn telemetry_put_value(&self, telemetry: Handle, counter: CounterId, value: f64) -> bool {
        // The host clock runs outside the lock, it may call back into us.
        let clock = match self.state.lock().telemetry(telemetry) {
            Some(channel) => channel.config.timestamp.clone(),
            None => return false,
        };
        let timestamp = match clock {
            Some(clock) => clock(),
            None => system_ticks(),
        };

        let mut state = self.state.lock();
        let Some(channel) = state.telemetry_mut(telemetry) else {
            return false;
        };
        let Some(counter) = channel.counters.get_mut(counter.0 as usize) else {
            return false;
        };

        if !counter.enabled {
            state.dropped_samples += 1;
            return true;
        }
        let alarm = counter.settings.is_alarm(value);
        if counter.samples.len() >= self.limits.max_retained_entries {
            counter.samples.pop_front();
        }
        counter.accepted += 1;
        counter.samples.push_back(Sample {
            timestamp,
            value,
            alarm,
        });
        state.samples += 1;
        true
    }

    fn telemetry_find_counter(&self, telemetry: Handle, name: &str) -> Option<CounterId> {
        let state = self.state.lock();
        let channel = state.telemetry(telemetry)?;
        let index = channel
            .counters
            .iter()
            .position(|c| c.settings.name == name)?;
        u16::try_from(index).ok().map(CounterId)
    }

    fn share(&self, kind: ResourceKind, handle: Handle, name: &str) -> bool {
        let mut state = self.state.lock();
        let key = (kind, name.to_string());
        let accepted = !name.is_empty()
            && state.alive(kind, handle).is_some()
            && state.shared.get(&key).map_or(true, |bound| *bound == handle);

        if accepted {
            state.shared.insert(key, handle);
        }
        state.calls.push(EngineCall::Share {
            kind,
            handle,
            name: name.to_string(),
            accepted,
        });
        accepted
    }

    fn get_shared(&self, kind: ResourceKind, name: &str) -> Option<Handle> {
        let mut state = self.state.lock();
        let found = state.shared.get(&(kind, name.to_string())).copied();
        if let Some(handle) = found {
            if let Some(object) = state.alive_mut(kind, handle) {
                object.refs += 1;
            }
        }
        state.calls.push(EngineCall::GetShared {
            kind,
            name: name.to_string(),
            found,
        });
        found
    }

    fn add_ref(&self, kind: ResourceKind, handle: Handle) -> i32 {
        let mut state = self.state.lock();
        let count = match state.alive_mut(kind, handle) {
            Some(object) => {
                object.refs += 1;
                object.refs
            }
            None => -1,
        };
        state.calls.push(EngineCall::AddRef {
            kind,
            handle,
            count,
        });
        count
    }

    fn release(&self, kind: ResourceKind, handle: Handle) -> i32 {
        let mut state = self.state.lock();
        let count = match state.alive_mut(kind, handle) {
            Some(object) => {
                object.refs -= 1;
                object.refs
            }
            None => -1,
        };
        state.calls.push(EngineCall::Release {
            kind,
            handle,
            count,
        });
        if count == 0 {
            state.destroy(handle);
        }
        count
    }

    fn flush(&self) {
        let mut state = self.state.lock();
        state.flushes += 1;
        state.calls.push(EngineCall::Flush);
    }

    fn exceptional_flush(&self) {
        // Called from panic hooks; never block on a lock held by the
        // panicking thread.
        if let Some(mut state) = self.state.try_lock() {
            state.exceptional_flushes += 1;
            state.calls.push(EngineCall::ExceptionalFlush);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(engine: &MemoryEngine) -> Handle {
        engine.client_create("/P7.Sink=Null").unwrap()
    }

    #[test]
    fn test_client_create_and_release() {
        let engine = MemoryEngine::new();
        let handle = client(&engine);

        assert_eq!(engine.ref_count(handle), Some(1));
        assert_eq!(engine.release(ResourceKind::Client, handle), 0);
        assert!(!engine.is_alive(handle));
        assert_eq!(engine.live_objects(), 0);
    }

    #[test]
    fn test_unknown_sink_is_refused() {
        let engine = MemoryEngine::new();
        assert!(engine.client_create("/P7.Sink=Carrier-Pigeon").is_none());
        assert!(matches!(
            engine.calls().last(),
            Some(EngineCall::CreateRefused { kind: ResourceKind::Client, .. })
        ));
    }

    #[test]
    fn test_release_of_dead_handle_is_negative() {
        let engine = MemoryEngine::new();
        let handle = client(&engine);
        engine.release(ResourceKind::Client, handle);
        assert_eq!(engine.release(ResourceKind::Client, handle), -1);
        assert_eq!(engine.add_ref(ResourceKind::Client, handle), -1);
    }

    #[test]
    fn test_kind_mismatch_is_not_alive() {
        let engine = MemoryEngine::new();
        let handle = client(&engine);
        assert_eq!(engine.add_ref(ResourceKind::Trace, handle), -1);
        assert_eq!(engine.ref_count(handle), Some(1));
    }

    #[test]
    fn test_channel_keeps_client_alive() {
        let engine = MemoryEngine::new();
        let c = client(&engine);
        let t = engine.trace_create(c, "Debug").unwrap();

        assert_eq!(engine.ref_count(c), Some(2));
        assert_eq!(engine.release(ResourceKind::Client, c), 1);
        assert!(engine.is_alive(c));

        assert_eq!(engine.release(ResourceKind::Trace, t), 0);
        assert!(!engine.is_alive(c));
        assert_eq!(engine.live_objects(), 0);
    }

    #[test]
    fn test_channel_limit_per_client() {
        let engine = MemoryEngine::with_limits(EngineLimits {
            max_channels_per_client: 2,
            ..EngineLimits::default()
        });
        let c = client(&engine);
        assert!(engine.trace_create(c, "a").is_some());
        assert!(engine
            .telemetry_create(c, "b", &TelemetryConfig::default())
            .is_some());
        assert!(engine.trace_create(c, "c").is_none());
    }

    #[test]
    fn test_share_and_get_shared() {
        let engine = MemoryEngine::new();
        let c = client(&engine);

        assert!(engine.get_shared(ResourceKind::Client, "main").is_none());
        assert!(engine.share(ResourceKind::Client, c, "main"));
        assert_eq!(engine.get_shared(ResourceKind::Client, "main"), Some(c));
        assert_eq!(engine.ref_count(c), Some(2));

        // Names are scoped by kind and case sensitive
        assert!(engine.get_shared(ResourceKind::Trace, "main").is_none());
        assert!(engine.get_shared(ResourceKind::Client, "Main").is_none());
    }

    #[test]
    fn test_share_name_bound_to_other_handle_is_refused() {
        let engine = MemoryEngine::new();
        let a = client(&engine);
        let b = client(&engine);
        assert!(engine.share(ResourceKind::Client, a, "main"));
        assert!(engine.share(ResourceKind::Client, a, "main"));
        assert!(!engine.share(ResourceKind::Client, b, "main"));
    }

    #[test]
    fn test_destroy_unpublishes_name() {
        let engine = MemoryEngine::new();
        let c = client(&engine);
        engine.share(ResourceKind::Client, c, "main");
        engine.release(ResourceKind::Client, c);
        assert!(engine.get_shared(ResourceKind::Client, "main").is_none());
        assert_eq!(engine.stats().shared_names, 0);
    }

    #[test]
    fn test_verbosity_filters_records() {
        let engine = MemoryEngine::new();
        let c = client(&engine);
        let t = engine.trace_create(c, "Debug").unwrap();
        let module = engine.trace_register_module(t, "render").unwrap();

        engine.trace_set_verbosity(t, Some(module), Level::Error);
        assert_eq!(engine.trace_get_verbosity(t, Some(module)), Level::Error);
        assert_eq!(engine.trace_get_verbosity(t, None), Level::Trace);

        let location = crate::trace::SourceLocation::unknown();
        let low = TraceRecord::new(0, Level::Info, Some(module), &location, "dropped");
        let high = TraceRecord::new(0, Level::Error, Some(module), &location, "kept");
        let plain = TraceRecord::new(0, Level::Info, None, &location, "channel");

        assert!(engine.trace_emit(t, &low));
        assert!(engine.trace_emit(t, &high));
        assert!(engine.trace_emit(t, &plain));

        let messages: Vec<_> = engine.records(t).into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["kept", "channel"]);
        assert_eq!(engine.stats().dropped_records, 1);
    }

    #[test]
    fn test_register_module_is_idempotent_by_name() {
        let engine = MemoryEngine::new();
        let c = client(&engine);
        let t = engine.trace_create(c, "Debug").unwrap();
        let a = engine.trace_register_module(t, "audio").unwrap();
        let b = engine.trace_register_module(t, "audio").unwrap();
        assert_eq!(a, b);
        assert_eq!(engine.module_name(t, a).as_deref(), Some("audio"));
    }

    #[test]
    fn test_thread_registration() {
        let engine = MemoryEngine::new();
        let c = client(&engine);
        let t = engine.trace_create(c, "Debug").unwrap();

        assert!(engine.trace_register_thread(t, "main", 0));
        assert_eq!(engine.thread_name(t, 0).as_deref(), Some("main"));
        assert!(engine.trace_unregister_thread(t, 0));
        assert!(!engine.trace_unregister_thread(t, 0));
    }

    #[test]
    fn test_counter_limits() {
        let engine = MemoryEngine::with_limits(EngineLimits {
            max_counters_per_channel: 2,
            ..EngineLimits::default()
        });
        let c = client(&engine);
        let t = engine
            .telemetry_create(c, "stats", &TelemetryConfig::default())
            .unwrap();

        let long_name = "x".repeat(65);
        assert!(engine
            .telemetry_create_counter(t, &CounterSettings::new(long_name))
            .is_none());
        assert!(engine
            .telemetry_create_counter(t, &CounterSettings::new(""))
            .is_none());

        let a = engine.telemetry_create_counter(t, &CounterSettings::new("a")).unwrap();
        assert!(engine
            .telemetry_create_counter(t, &CounterSettings::new("a"))
            .is_none());
        let b = engine.telemetry_create_counter(t, &CounterSettings::new("b")).unwrap();
        assert!(engine
            .telemetry_create_counter(t, &CounterSettings::new("c"))
            .is_none());

        assert_eq!(engine.telemetry_find_counter(t, "a"), Some(a));
        assert_eq!(engine.telemetry_find_counter(t, "b"), Some(b));
        assert_eq!(engine.telemetry_find_counter(t, "c"), None);
    }

    #[test]
    fn test_disabled_counter_drops_samples() {
        let engine = MemoryEngine::new();
        let c = client(&engine);
        let t = engine
            .telemetry_create(c, "stats", &TelemetryConfig::default())
            .unwrap();
        let id = engine
            .telemetry_create_counter(t, &CounterSettings::new("x").enabled(false))
            .unwrap();

        assert!(engine.telemetry_put_value(t, id, 1.0));
        assert!(engine.samples(t, id).is_empty());
        assert_eq!(engine.stats().dropped_samples, 1);
        assert!(!engine.telemetry_put_value(t, CounterId(9), 1.0));
    }

    #[test]
    fn test_host_clock_and_alarm() {
        let engine = MemoryEngine::new();
        let c = client(&engine);
        let config = TelemetryConfig::new().with_clock(1_000, || 1234);
        let t = engine.telemetry_create(c, "stats", &config).unwrap();
        let id = engine
            .telemetry_create_counter(t, &CounterSettings::new("hp").alarm(0.0, 100.0))
            .unwrap();

        engine.telemetry_put_value(t, id, 50.0);
        engine.telemetry_put_value(t, id, 150.0);

        let samples = engine.samples(t, id);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, 1234);
        assert!(!samples[0].alarm);
        assert!(samples[1].alarm);
    }

    #[test]
    fn test_retention_evicts_oldest() {
        let engine = MemoryEngine::with_limits(EngineLimits {
            max_retained_entries: 3,
            ..EngineLimits::default()
        });
        let c = client(&engine);

        let trace = engine.trace_create(c, "Debug").unwrap();
        let location = crate::trace::SourceLocation::unknown();
        for message in ["a", "b", "c", "d", "e"] {
            let record = TraceRecord::new(0, Level::Info, None, &location, message);
            assert!(engine.trace_emit(trace, &record));
        }
        let messages: Vec<_> = engine.records(trace).into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["c", "d", "e"]);
        assert_eq!(engine.stats().trace_records, 5);

        let t = engine
            .telemetry_create(c, "stats", &TelemetryConfig::default())
            .unwrap();
        let id = engine
            .telemetry_create_counter(t, &CounterSettings::new("x"))
            .unwrap();
        for i in 0..10 {
            assert!(engine.telemetry_put_value(t, id, f64::from(i)));
        }
        let values: Vec<f64> = engine.samples(t, id).iter().map(|s| s.value).collect();
        assert_eq!(values, vec![7.0, 8.0, 9.0]);
        assert_eq!(engine.sample_count(t, id), 10);
        assert_eq!(engine.stats().samples, 10);
    }

    #[test]
    fn test_flush_counters() {
        let engine = MemoryEngine::new();
        let c = client(&engine);
        assert!(engine.client_flush(c));
        engine.flush();
        engine.exceptional_flush();

        assert_eq!(engine.client_flush_count(c), 1);
        let stats = engine.stats();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.exceptional_flushes, 1);
    }
}
