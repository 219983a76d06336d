//! Support for structured logging.
//!
//! # Overview
//!
//! The simulation driver emits [`tracing`] events when it is initialized,
//! started up, drained or restored, when its main loop exits and when a fatal
//! error aborts a run. Trace lines produced by enabled trace flags (see the
//! [`trace`](crate::trace) module) are emitted as `INFO` events with target
//! `ticksim::trace`.
//!
//! Using the `tracing-subscriber` crate, these events can be logged to
//! standard output by placing the following call anywhere before
//! [`SimInit::init`](crate::simulation::SimInit::init):
//!
//! ```
//! tracing_subscriber::fmt::init();
//! ```
//!
//! This will however stamp events with the system time rather than the
//! simulated tick. To use the tick instead, a dedicated timer can be
//! configured:
//!
//! ```
//! use ticksim::tracing::SimulationTime;
//!
//! tracing_subscriber::fmt()
//!     .with_timer(SimulationTime::with_system_timer())
//!     .init();
//! ```
//!
//! This timer automatically reverts to system time stamping for tracing
//! events generated outside of event actions, e.g.:
//!
//! ```text
//! [tick 1000]  INFO ticksim::trace: 1000: hello: Hello world! Processing 5 of 10
//! 2024-09-10T14:39:24.670921Z  INFO ticksim::simulation: simulation loop exited
//! ```
//!
//! # Event filtering examples
//!
//! Filtering based on the `RUST_LOG` environment variable requires the
//! `env-filter` feature of the [`tracing-subscriber`][tracing_subscriber]
//! crate. The following directive only keeps the trace lines:
//!
//! ```text
//! $ RUST_LOG="ticksim::trace=info" TICKSIM_TRACE="HelloExample" cargo run --example hello_goodbye
//! ```

use std::fmt;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};

use crate::simulation::active_tick;

/// A timer that can be used in conjunction with the
/// [`tracing-subscriber`][tracing_subscriber] crate to log events using the
/// simulated tick instead of (or on top of) the wall clock time.
///
/// See the [module-level documentation][crate::tracing] for more details.
#[derive(Default, Debug)]
pub struct SimulationTime<const VERBOSE: bool, T> {
    sys_timer: T,
}

impl SimulationTime<false, SystemTime> {
    /// Constructs a new simulation timer which falls back to the [`SystemTime`]
    /// timer for events generated outside event actions.
    pub fn with_system_timer() -> Self {
        Self::default()
    }
}

impl SimulationTime<true, SystemTime> {
    /// Constructs a new simulation timer which prepends a [`SystemTime`]
    /// timestamp to all tracing events, as well as the simulated tick for
    /// events generated by event actions.
    pub fn with_system_timer_always() -> Self {
        Self::default()
    }
}

impl<T: FormatTime> SimulationTime<false, T> {
    /// Constructs a new simulation timer which falls back to the provided
    /// timer for events generated outside event actions.
    pub fn with_custom_timer(sys_timer: T) -> Self {
        Self { sys_timer }
    }
}

impl<T: FormatTime> SimulationTime<true, T> {
    /// Constructs a new simulation timer which prepends a timestamp generated
    /// with the provided timer to all tracing events, as well as the simulated
    /// tick for events generated by event actions.
    pub fn with_custom_timer_always(sys_timer: T) -> Self {
        Self { sys_timer }
    }
}

impl<const VERBOSE: bool, T: FormatTime> FormatTime for SimulationTime<VERBOSE, T> {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        match active_tick() {
            Some(tick) => {
                if VERBOSE {
                    self.sys_timer.format_time(w)?;
                    w.write_char(' ')?;
                }
                write!(w, "[tick {}]", tick)
            }
            None => self.sys_timer.format_time(w),
        }
    }
}
