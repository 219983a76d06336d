//! Run-wide clock state.

use std::cell::Cell;
use std::fmt;

use crate::time::Tick;

/// Lifecycle phase of a simulation run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Components are being added and initialized.
    Uninitialized,
    /// The component graph is complete; the run has not started yet.
    Ready,
    /// Events are being processed.
    Running,
    /// The main loop has stopped at a safe point.
    Draining,
    /// The run is over.
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };

        f.write_str(name)
    }
}

/// Clock state of a single simulation run.
///
/// The clock is only ever advanced by the simulation driver.
#[derive(Debug)]
pub(crate) struct Clock {
    tick: Tick,
    pub(crate) phase: Phase,
    pub(crate) exit_request: Option<String>,
    pub(crate) started: bool,
    pub(crate) restored: bool,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Self {
            tick: Tick::ZERO,
            phase: Phase::Uninitialized,
            exit_request: None,
            started: false,
            restored: false,
        }
    }

    pub(crate) fn tick(&self) -> Tick {
        self.tick
    }

    /// Moves the clock forward.
    ///
    /// Returns `false` and leaves the clock untouched if `tick` lies in the
    /// past.
    pub(crate) fn advance_to(&mut self, tick: Tick) -> bool {
        if tick < self.tick {
            return false;
        }
        self.tick = tick;

        true
    }

    /// Sets the clock to the tick of a restored checkpoint.
    pub(crate) fn restore_to(&mut self, tick: Tick) {
        self.tick = tick;
        self.restored = true;
    }

    /// Returns `true` if events may be scheduled in the current phase.
    ///
    /// A draining simulation sits at a safe point between two runs, so the
    /// harness may still inject events before resuming.
    pub(crate) fn accepts_scheduling(&self) -> bool {
        matches!(self.phase, Phase::Ready | Phase::Running | Phase::Draining)
    }
}

thread_local! {
    static ACTIVE_TICK: Cell<Option<Tick>> = const { Cell::new(None) };
}

/// Returns the tick of the batch being executed on this thread, if any.
#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
pub(crate) fn active_tick() -> Option<Tick> {
    ACTIVE_TICK.with(|t| t.get())
}

/// Marks the current thread as executing a batch at a given tick until the
/// guard is dropped.
pub(crate) struct ActiveTickGuard {
    prev: Option<Tick>,
}

impl ActiveTickGuard {
    pub(crate) fn enter(tick: Tick) -> Self {
        let prev = ACTIVE_TICK.with(|t| t.replace(Some(tick)));

        Self { prev }
    }
}

impl Drop for ActiveTickGuard {
    fn drop(&mut self) {
        ACTIVE_TICK.with(|t| t.set(self.prev));
    }
}
