//! Engine backed by the prebuilt p7 shared library
//!
//! Booleans come back as `u32` (zero is failure), handles are raw pointers
//! and strings are wide on Windows, UTF-8 everywhere else.

use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use parking_lot::Mutex;

use super::Engine;
use crate::handle::{Handle, ModuleHandle, ResourceKind};
use crate::telemetry::{CounterId, CounterSettings, TelemetryConfig};
use crate::trace::{Level, TraceRecord};

type RawHandle = *mut c_void;

#[cfg(windows)]
type RawStr = *const u16;
#[cfg(not(windows))]
type RawStr = *const std::os::raw::c_char;

type TimestampFn = unsafe extern "C" fn(context: *mut c_void) -> u64;
type EnableFn = unsafe extern "C" fn(context: *mut c_void, id: u16, enable: i32);
type ConnectFn = unsafe extern "C" fn(context: *mut c_void, connected: i32);

#[repr(C)]
struct RawTelemetryConf {
    context: *mut c_void,
    timestamp_frequency: u64,
    timestamp: Option<TimestampFn>,
    enable: Option<EnableFn>,
    connect: Option<ConnectFn>,
}

#[link(name = "p7-shared")]
extern "C" {
    fn P7_Flush();
    fn P7_Exceptional_Flush();

    fn P7_Client_Create(args: RawStr) -> RawHandle;
    fn P7_Client_Get_Shared(name: RawStr) -> RawHandle;
    fn P7_Client_Share(client: RawHandle, name: RawStr) -> u32;
    fn P7_Client_Flush(client: RawHandle) -> u32;
    fn P7_Client_Add_Ref(client: RawHandle) -> i32;
    fn P7_Client_Release(client: RawHandle) -> i32;

    fn P7_Trace_Create(client: RawHandle, name: RawStr, options: *const c_void) -> RawHandle;
    fn P7_Trace_Get_Shared(name: RawStr) -> RawHandle;
    fn P7_Trace_Share(trace: RawHandle, name: RawStr) -> u32;
    fn P7_Trace_Set_Verbosity(trace: RawHandle, module: RawHandle, verbosity: u32);
    fn P7_Trace_Get_Verbosity(trace: RawHandle, module: RawHandle) -> u32;
    fn P7_Trace_Register_Thread(trace: RawHandle, name: RawStr, thread_id: u32) -> u32;
    fn P7_Trace_Unregister_Thread(trace: RawHandle, thread_id: u32) -> u32;
    fn P7_Trace_Register_Module(trace: RawHandle, name: RawStr) -> RawHandle;
    fn P7_Trace_Managed(
        trace: RawHandle,
        trace_id: u16,
        level: u32,
        module: RawHandle,
        line: u16,
        file: RawStr,
        function: RawStr,
        message: RawStr,
    ) -> u32;
    fn P7_Trace_Add_Ref(trace: RawHandle) -> i32;
    fn P7_Trace_Release(trace: RawHandle) -> i32;

    fn P7_Telemetry_Create(
        client: RawHandle,
        name: RawStr,
        conf: *const RawTelemetryConf,
    ) -> RawHandle;
    fn P7_Telemetry_Get_Shared(name: RawStr) -> RawHandle;
    fn P7_Telemetry_Share(telemetry: RawHandle, name: RawStr) -> u32;
    fn P7_Telemetry_Create_Counter(
        telemetry: RawHandle,
        name: RawStr,
        min: f64,
        alarm_min: f64,
        max: f64,
        alarm_max: f64,
        on: i32,
        id: *mut u16,
    ) -> u32;
    fn P7_Telemetry_Put_Value(telemetry: RawHandle, id: u16, value: f64) -> u32;
    fn P7_Telemetry_Find_Counter(telemetry: RawHandle, name: RawStr, id: *mut u16) -> u32;
    fn P7_Telemetry_Add_Ref(telemetry: RawHandle) -> i32;
    fn P7_Telemetry_Release(telemetry: RawHandle) -> i32;
}

/// Null-terminated string in the library's platform encoding
struct NativeStr {
    #[cfg(windows)]
    buf: Vec<u16>,
    #[cfg(not(windows))]
    buf: std::ffi::CString,
}

impl NativeStr {
    #[cfg(windows)]
    fn new(value: &str) -> Self {
        let buf = value
            .encode_utf16()
            .filter(|unit| *unit != 0)
            .chain(std::iter::once(0))
            .collect();
        Self { buf }
    }

    #[cfg(not(windows))]
    fn new(value: &str) -> Self {
        let bytes: Vec<u8> = value.bytes().filter(|b| *b != 0).collect();
        // Interior NULs were filtered out above.
        let buf = std::ffi::CString::new(bytes).unwrap_or_default();
        Self { buf }
    }

    fn as_ptr(&self) -> RawStr {
        self.buf.as_ptr()
    }
}

fn to_handle(raw: RawHandle) -> Option<Handle> {
    Handle::from_raw(raw as usize)
}

fn to_raw(handle: Handle) -> RawHandle {
    handle.as_raw() as RawHandle
}

fn module_raw(module: Option<ModuleHandle>) -> RawHandle {
    module.map_or(ptr::null_mut(), |m| m.as_raw() as RawHandle)
}

unsafe extern "C" fn timestamp_trampoline(context: *mut c_void) -> u64 {
    // SAFETY: context points at a config boxed in `NativeEngine::configs`,
    // which lives until the channel is destroyed.
    let config = unsafe { &*(context as *const TelemetryConfig) };
    catch_unwind(AssertUnwindSafe(|| config.timestamp.as_ref().map_or(0, |clock| clock())))
        .unwrap_or(0)
}

unsafe extern "C" fn enable_trampoline(context: *mut c_void, id: u16, enable: i32) {
    // SAFETY: see `timestamp_trampoline`.
    let config = unsafe { &*(context as *const TelemetryConfig) };
    if let Some(callback) = config.on_enable.as_ref() {
        let _ = catch_unwind(AssertUnwindSafe(|| callback(CounterId(id), enable != 0)));
    }
}

/// Engine calling into the p7 shared library
pub struct NativeEngine {
    /// Callback contexts of telemetry channels created here, by handle
    configs: Mutex<HashMap<Handle, Box<TelemetryConfig>>>,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self {
            configs: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for NativeEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    fn client_create(&self, args: &str) -> Option<Handle> {
        let args = NativeStr::new(args);
        to_handle(unsafe { P7_Client_Create(args.as_ptr()) })
    }

    fn client_flush(&self, client: Handle) -> bool {
        unsafe { P7_Client_Flush(to_raw(client)) != 0 }
    }

    fn trace_create(&self, client: Handle, name: &str) -> Option<Handle> {
        let name = NativeStr::new(name);
        to_handle(unsafe { P7_Trace_Create(to_raw(client), name.as_ptr(), ptr::null()) })
    }

    fn trace_register_thread(&self, trace: Handle, name: &str, thread_id: u32) -> bool {
        let name = NativeStr::new(name);
        unsafe { P7_Trace_Register_Thread(to_raw(trace), name.as_ptr(), thread_id) != 0 }
    }

    fn trace_unregister_thread(&self, trace: Handle, thread_id: u32) -> bool {
        unsafe { P7_Trace_Unregister_Thread(to_raw(trace), thread_id) != 0 }
    }

    fn trace_register_module(&self, trace: Handle, name: &str) -> Option<ModuleHandle> {
        let name = NativeStr::new(name);
        let raw = unsafe { P7_Trace_Register_Module(to_raw(trace), name.as_ptr()) };
        ModuleHandle::from_raw(raw as usize)
    }

    fn trace_set_verbosity(&self, trace: Handle, module: Option<ModuleHandle>, level: Level) {
        unsafe { P7_Trace_Set_Verbosity(to_raw(trace), module_raw(module), level.as_u32()) }
    }

    fn trace_get_verbosity(&self, trace: Handle, module: Option<ModuleHandle>) -> Level {
        let raw = unsafe { P7_Trace_Get_Verbosity(to_raw(trace), module_raw(module)) };
        Level::from_u32(raw).unwrap_or_default()
    }

    fn trace_emit(&self, trace: Handle, record: &TraceRecord<'_>) -> bool {
        let file = NativeStr::new(record.file);
        let function = NativeStr::new(record.function);
        let message = NativeStr::new(record.message);
        unsafe {
            P7_Trace_Managed(
                to_raw(trace),
                record.trace_id,
                record.level.as_u32(),
                module_raw(record.module),
                record.line,
                file.as_ptr(),
                function.as_ptr(),
                message.as_ptr(),
            ) != 0
        }
    }

    fn telemetry_create(
        &self,
        client: Handle,
        name: &str,
        config: &TelemetryConfig,
    ) -> Option<Handle> {
        let context = Box::new(config.clone());
        let conf = RawTelemetryConf {
            context: &*context as *const TelemetryConfig as *mut c_void,
            timestamp_frequency: config.timestamp_frequency,
            timestamp: config
                .timestamp
                .as_ref()
                .map(|_| timestamp_trampoline as TimestampFn),
            enable: config.on_enable.as_ref().map(|_| enable_trampoline as EnableFn),
            connect: None,
        };
        let name = NativeStr::new(name);
        let handle = to_handle(unsafe { P7_Telemetry_Create(to_raw(client), name.as_ptr(), &conf) })?;
        self.configs.lock().insert(handle, context);
        Some(handle)
    }

    fn telemetry_create_counter(
        &self,
        telemetry: Handle,
        settings: &CounterSettings,
    ) -> Option<CounterId> {
        let name = NativeStr::new(&settings.name);
        let mut id = 0u16;
        let ok = unsafe {
            P7_Telemetry_Create_Counter(
                to_raw(telemetry),
                name.as_ptr(),
                settings.min,
                settings.a_min,
                settings.max,
                settings.a_max,
                i32::from(settings.enabled),
                &mut id,
            )
        };
        (ok != 0).then_some(CounterId(id))
    }

    fn telemetry_put_value(&self, telemetry: Handle, counter: CounterId, value: f64) -> bool {
        unsafe { P7_Telemetry_Put_Value(to_raw(telemetry), counter.0, value) != 0 }
    }

    fn telemetry_find_counter(&self, telemetry: Handle, name: &str) -> Option<CounterId> {
        let name = NativeStr::new(name);
        let mut id = 0u16;
        let ok = unsafe { P7_Telemetry_Find_Counter(to_raw(telemetry), name.as_ptr(), &mut id) };
        (ok != 0).then_some(CounterId(id))
    }

    fn share(&self, kind: ResourceKind, handle: Handle, name: &str) -> bool {
        let name = NativeStr::new(name);
        let raw = to_raw(handle);
        let ok = unsafe {
            match kind {
                ResourceKind::Client => P7_Client_Share(raw, name.as_ptr()),
                ResourceKind::Trace => P7_Trace_Share(raw, name.as_ptr()),
                ResourceKind::Telemetry => P7_Telemetry_Share(raw, name.as_ptr()),
            }
        };
        ok != 0
    }

    fn get_shared(&self, kind: ResourceKind, name: &str) -> Option<Handle> {
        let name = NativeStr::new(name);
        let raw = unsafe {
            match kind {
                ResourceKind::Client => P7_Client_Get_Shared(name.as_ptr()),
                ResourceKind::Trace => P7_Trace_Get_Shared(name.as_ptr()),
                ResourceKind::Telemetry => P7_Telemetry_Get_Shared(name.as_ptr()),
            }
        };
        to_handle(raw)
    }

    fn add_ref(&self, kind: ResourceKind, handle: Handle) -> i32 {
        let raw = to_raw(handle);
        unsafe {
            match kind {
                ResourceKind::Client => P7_Client_Add_Ref(raw),
                ResourceKind::Trace => P7_Trace_Add_Ref(raw),
                ResourceKind::Telemetry => P7_Telemetry_Add_Ref(raw),
            }
        }
    }

    fn release(&self, kind: ResourceKind, handle: Handle) -> i32 {
        let raw = to_raw(handle);
        let count = unsafe {
            match kind {
                ResourceKind::Client => P7_Client_Release(raw),
                ResourceKind::Trace => P7_Trace_Release(raw),
                ResourceKind::Telemetry => P7_Telemetry_Release(raw),
            }
        };
        if count <= 0 && kind == ResourceKind::Telemetry {
            self.configs.lock().remove(&handle);
        }
        count
    }

    fn flush(&self) {
        unsafe { P7_Flush() }
    }

    fn exceptional_flush(&self) {
        unsafe { P7_Exceptional_Flush() }
    }
}
