//! Named-flag trace output.
//!
//! Components and the simulation driver can emit trace lines guarded by named
//! flags. A line is only produced if its flag is enabled, and it always has
//! the form:
//!
//! ```text
//! <tick>: <component>: <message>
//! ```
//!
//! Lines are produced in the exact order in which events fire. They are
//! emitted as [`tracing`] events with target `ticksim::trace` at the `INFO`
//! level and, if a [`TraceBuffer`] was configured, appended to that buffer.
//! Tracing never has any effect on scheduling.
//!
//! Flags are enabled with
//! [`SimInit::enable_trace_flag()`](crate::simulation::SimInit::enable_trace_flag)
//! or parsed from a comma-separated list, for instance from the
//! `TICKSIM_TRACE` environment variable:
//!
//! ```text
//! $ TICKSIM_TRACE="Event,HelloExample" cargo run --example hello_goodbye
//! ```
//!
//! # Examples
//!
//! ```
//! use ticksim::simulation::SimInit;
//! use ticksim::time::Delay;
//! use ticksim::trace::TraceBuffer;
//!
//! let buffer = TraceBuffer::new();
//! let mut simu = SimInit::new()
//!     .enable_trace_flag("Demo")
//!     .set_trace_buffer(buffer.clone())
//!     .init()
//!     .unwrap();
//!
//! let scheduler = simu.scheduler();
//! scheduler
//!     .schedule_once(Delay(10), "demo", |s| {
//!         ticksim::sim_trace!(s, "Demo", "demo", "fired with {} pending", s.pending_count());
//!     })
//!     .unwrap();
//! simu.run().unwrap();
//!
//! assert_eq!(buffer.lines(), vec!["10: demo: fired with 0 pending".to_string()]);
//! ```

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::time::Tick;

/// Flag under which the simulation driver traces event execution.
pub const EVENT_FLAG: &str = "Event";

/// Pseudo-flag enabling every flag.
pub const ALL_FLAGS: &str = "All";

/// Environment variable read by [`TraceFlags::from_env()`].
pub const TRACE_ENV_VAR: &str = "TICKSIM_TRACE";

/// A set of enabled trace flags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceFlags {
    flags: BTreeSet<String>,
    all: bool,
}

impl TraceFlags {
    /// Creates an empty set of flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a comma-separated list of flags.
    ///
    /// Whitespace around flag names is ignored, as are empty entries. The
    /// special flag `All` enables every flag.
    pub fn parse(spec: &str) -> Self {
        let mut flags = Self::new();
        for flag in spec.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            flags.enable(flag);
        }

        flags
    }

    /// Parses the flags listed in the `TICKSIM_TRACE` environment variable.
    ///
    /// An empty set is returned if the variable is not set.
    pub fn from_env() -> Self {
        std::env::var(TRACE_ENV_VAR)
            .map(|spec| Self::parse(&spec))
            .unwrap_or_default()
    }

    /// Enables a flag.
    pub fn enable(&mut self, flag: &str) {
        if flag == ALL_FLAGS {
            self.all = true;
        } else {
            self.flags.insert(flag.to_string());
        }
    }

    /// Disables a flag.
    ///
    /// Disabling `All` only clears the catch-all; individually enabled flags
    /// remain enabled.
    pub fn disable(&mut self, flag: &str) {
        if flag == ALL_FLAGS {
            self.all = false;
        } else {
            self.flags.remove(flag);
        }
    }

    /// Returns `true` if the flag is enabled.
    pub fn is_enabled(&self, flag: &str) -> bool {
        self.all || self.flags.contains(flag)
    }

    /// Returns `true` if no flag is enabled.
    pub fn is_empty(&self) -> bool {
        !self.all && self.flags.is_empty()
    }
}

/// An in-memory sink collecting trace lines.
///
/// The buffer is a shared handle: clones refer to the same lines.
#[derive(Clone, Debug, Default)]
pub struct TraceBuffer {
    lines: Rc<RefCell<Vec<String>>>,
}

impl TraceBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all lines collected so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    /// Removes and returns all lines collected so far.
    pub fn take(&self) -> Vec<String> {
        self.lines.take()
    }

    /// Number of lines collected.
    pub fn len(&self) -> usize {
        self.lines.borrow().len()
    }

    /// Returns `true` if no line was collected.
    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }

    fn push(&self, line: String) {
        self.lines.borrow_mut().push(line);
    }
}

/// Trace state of a simulation.
#[derive(Debug, Default)]
pub(crate) struct Tracer {
    pub(crate) flags: TraceFlags,
    pub(crate) buffer: Option<TraceBuffer>,
}

impl Tracer {
    pub(crate) fn is_enabled(&self, flag: &str) -> bool {
        self.flags.is_enabled(flag)
    }

    /// Emits a line if the flag is enabled.
    pub(crate) fn emit(&self, tick: Tick, flag: &str, component: &str, message: fmt::Arguments<'_>) {
        if !self.is_enabled(flag) {
            return;
        }
        let line = format!("{}: {}: {}", tick, component, message);
        tracing::info!(target: "ticksim::trace", flag, "{}", line);
        if let Some(buffer) = &self.buffer {
            buffer.push(line);
        }
    }
}

/// Emits a trace line under a named flag.
///
/// In its plain form, the first argument is a
/// [`Scheduler`](crate::simulation::Scheduler) and the line is attributed to
/// the component named by the third argument. Within a component, the
/// `@component` form takes a [`Context`](crate::component::Context) and
/// attributes the line to the component itself. The message is only
/// formatted if the flag is enabled.
///
/// ```
/// # use ticksim::simulation::SimInit;
/// # let simu = SimInit::new().init().unwrap();
/// # let scheduler = simu.scheduler();
/// ticksim::sim_trace!(scheduler, "Cache", "l1d", "miss on {:#x}", 0x80u32);
/// ```
///
/// ```
/// # use ticksim::component::{Component, Context};
/// struct Cache;
///
/// impl Component for Cache {
///     fn startup(&mut self, cx: &Context<Self>) {
///         ticksim::sim_trace!(@component cx, "Cache", "warming up {} lines", 64);
///     }
/// }
/// ```
#[macro_export]
macro_rules! sim_trace {
    (@component $cx:expr, $flag:expr, $($arg:tt)+) => {
        $cx.trace($flag, ::std::format_args!($($arg)+))
    };
    ($scheduler:expr, $flag:expr, $component:expr, $($arg:tt)+) => {
        $scheduler.trace($flag, $component, ::std::format_args!($($arg)+))
    };
}
