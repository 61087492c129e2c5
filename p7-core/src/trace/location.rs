//! Source location attached to every trace record

use crate::handle::ModuleHandle;
use crate::trace::Level;

/// Placeholder sent when the file or function of a record is unknown.
pub const UNKNOWN_LOCATION: &str = "<optimized>";

/// Where a trace message was emitted from.
///
/// Any part may be missing; [`TraceRecord`] fills the gaps with
/// [`UNKNOWN_LOCATION`] so consumers never see an empty field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceLocation<'a> {
    pub file: Option<&'a str>,
    pub line: u32,
    pub function: Option<&'a str>,
}

impl<'a> SourceLocation<'a> {
    pub fn new(file: &'a str, line: u32, function: &'a str) -> Self {
        Self {
            file: Some(file),
            line,
            function: Some(function),
        }
    }

    /// A location nothing is known about
    pub fn unknown() -> Self {
        Self::default()
    }

    /// File and line of the caller, function unknown.
    #[track_caller]
    pub fn caller() -> SourceLocation<'static> {
        let caller = std::panic::Location::caller();
        SourceLocation {
            file: Some(caller.file()),
            line: caller.line(),
            function: None,
        }
    }

    pub fn file_or_sentinel(&self) -> &'a str {
        non_empty(self.file)
    }

    pub fn function_or_sentinel(&self) -> &'a str {
        non_empty(self.function)
    }

    /// Line as carried by the engine (16 bits, saturating)
    pub fn engine_line(&self) -> u16 {
        u16::try_from(self.line).unwrap_or(u16::MAX)
    }
}

fn non_empty(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => UNKNOWN_LOCATION,
    }
}

/// One message as it crosses the engine boundary.
///
/// File and function are always non-empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceRecord<'a> {
    pub trace_id: u16,
    pub level: Level,
    pub module: Option<ModuleHandle>,
    pub line: u16,
    pub file: &'a str,
    pub function: &'a str,
    pub message: &'a str,
}

impl<'a> TraceRecord<'a> {
    pub fn new(
        trace_id: u16,
        level: Level,
        module: Option<ModuleHandle>,
        location: &SourceLocation<'a>,
        message: &'a str,
    ) -> Self {
        Self {
            trace_id,
            level,
            module,
            line: location.engine_line(),
            file: location.file_or_sentinel(),
            function: location.function_or_sentinel(),
            message,
        }
    }
}

/// Name of the enclosing function, as a `&'static str`.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        match name.strip_suffix("::f") {
            Some(stripped) => stripped,
            None => name,
        }
    }};
}

/// Emit a formatted message on a trace channel with full source location.
///
/// ```rust
/// use p7_core::{p7_trace, Client, Level, MemoryEngine, Trace};
/// use std::sync::Arc;
///
/// let engine = Arc::new(MemoryEngine::new());
/// let client = Client::create(engine, "/P7.Sink=Null").unwrap();
/// let trace = Trace::create(&client, "Debug").unwrap();
/// p7_trace!(trace, Level::Info, "frame {} done", 42).unwrap();
/// ```
#[macro_export]
macro_rules! p7_trace {
    ($trace:expr, module = $module:expr, $level:expr, $($arg:tt)+) => {
        $trace.add(
            0,
            $level,
            $module,
            &$crate::trace::SourceLocation::new(file!(), line!(), $crate::function_name!()),
            &format!($($arg)+),
        )
    };
    ($trace:expr, $level:expr, $($arg:tt)+) => {
        $crate::p7_trace!($trace, module = None, $level, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_location_uses_sentinel() {
        let location = SourceLocation::unknown();
        let record = TraceRecord::new(0, Level::Info, None, &location, "hello");
        assert_eq!(record.file, UNKNOWN_LOCATION);
        assert_eq!(record.function, UNKNOWN_LOCATION);
        assert_eq!(record.line, 0);
    }

    #[test]
    fn test_empty_strings_use_sentinel() {
        let location = SourceLocation::new("", 7, "");
        let record = TraceRecord::new(0, Level::Info, None, &location, "hello");
        assert_eq!(record.file, UNKNOWN_LOCATION);
        assert_eq!(record.function, UNKNOWN_LOCATION);
        assert_eq!(record.line, 7);
    }

    #[test]
    fn test_caller_has_file_but_no_function() {
        let location = SourceLocation::caller();
        assert!(location.file_or_sentinel().ends_with("location.rs"));
        assert_eq!(location.function_or_sentinel(), UNKNOWN_LOCATION);
    }

    #[test]
    fn test_line_saturates() {
        let location = SourceLocation::new("big.rs", 100_000, "f");
        assert_eq!(location.engine_line(), u16::MAX);
    }

    #[test]
    fn test_function_name_macro() {
        let name = crate::function_name!();
        assert!(name.ends_with("test_function_name_macro"));
    }
}
