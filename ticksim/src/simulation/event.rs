//! Events and their metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::Tick;

use super::Scheduler;

/// Handle to an event registered with a simulation.
///
/// An `EventId` is a cheap, copyable reference to an event record owned by the
/// simulation. The handle stays valid until the event is released, either
/// explicitly with [`Scheduler::release()`] or automatically after an
/// auto-release event has fired. Using a released handle is reported as
/// [`SchedulingError::UnknownEvent`](super::SchedulingError::UnknownEvent),
/// even if its storage slot was meanwhile reused by another event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventId {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E#{}.{}", self.index, self.generation)
    }
}

/// Tie-break priority of events scheduled for the same tick.
///
/// Events with a numerically lower priority fire first.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Priority(pub i8);

impl Priority {
    /// The lowest priority value, firing before anything else in a tick.
    pub const MINIMUM: Self = Self(i8::MIN);
    /// Events that enable debugging output before the tick's work starts.
    pub const DEBUG_ENABLE: Self = Self(-101);
    /// The priority used when none is specified.
    pub const DEFAULT: Self = Self(0);
    /// Priority of processor-like components' clock edges.
    pub const CPU_TICK: Self = Self(50);
    /// Statistics dumps, which should see the effects of the whole tick.
    pub const STATS: Self = Self(90);
    /// Simulation exit requests, processed after regular work of the tick.
    pub const SIM_EXIT: Self = Self(100);
    /// The highest priority value, firing after anything else in a tick.
    pub const MAXIMUM: Self = Self(i8::MAX);
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle flags of an event.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct EventFlags(u8);

impl EventFlags {
    const PENDING: u8 = 1 << 0;
    const SQUASHED: u8 = 1 << 1;
    const AUTO_RELEASE: u8 = 1 << 2;

    /// The event is in the queue and will fire at its target tick.
    pub fn is_pending(self) -> bool {
        self.0 & Self::PENDING != 0
    }

    /// The last scheduling occurrence of the event was cancelled before it
    /// fired.
    pub fn is_squashed(self) -> bool {
        self.0 & Self::SQUASHED != 0
    }

    /// The event is released automatically after it fires.
    pub fn is_auto_release(self) -> bool {
        self.0 & Self::AUTO_RELEASE != 0
    }

    pub(crate) fn auto_release() -> Self {
        Self(Self::AUTO_RELEASE)
    }

    pub(crate) fn set_pending(&mut self) {
        self.0 = (self.0 | Self::PENDING) & !Self::SQUASHED;
    }

    pub(crate) fn set_squashed(&mut self) {
        self.0 = (self.0 | Self::SQUASHED) & !Self::PENDING;
    }

    pub(crate) fn set_fired(&mut self) {
        self.0 &= !(Self::PENDING | Self::SQUASHED);
    }
}

impl fmt::Debug for EventFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFlags")
            .field("pending", &self.is_pending())
            .field("squashed", &self.is_squashed())
            .field("auto_release", &self.is_auto_release())
            .finish()
    }
}

/// A snapshot of the metadata of a registered event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventInfo {
    /// Name of the event.
    pub name: String,
    /// Name of the component owning the event, if any.
    pub owner: Option<String>,
    /// Target tick of the current or last scheduling occurrence.
    pub tick: Tick,
    /// Priority of the current or last scheduling occurrence.
    pub priority: Priority,
    /// Lifecycle flags.
    pub flags: EventFlags,
    /// Number of times the event has fired.
    pub fire_count: u64,
}

/// The action performed when an event fires.
pub(crate) struct Action(Box<dyn FnMut(&Scheduler)>);

impl Action {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: FnMut(&Scheduler) + 'static,
    {
        Self(Box::new(f))
    }

    pub(crate) fn call(&mut self, scheduler: &Scheduler) {
        (self.0)(scheduler)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").finish_non_exhaustive()
    }
}

/// An event record stored in the event table.
#[derive(Debug)]
pub(crate) struct EventRecord {
    pub(crate) name: String,
    pub(crate) owner: Option<String>,
    // `None` while the action is being executed.
    pub(crate) action: Option<Action>,
    pub(crate) generation: u64,
    pub(crate) tick: Tick,
    pub(crate) priority: Priority,
    pub(crate) flags: EventFlags,
    // Sequence number of the live queue entry, if pending.
    pub(crate) seq: Option<u64>,
    pub(crate) fire_count: u64,
}

impl EventRecord {
    /// Name used in diagnostics, qualified by the owner if any.
    pub(crate) fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}", owner, self.name),
            None => self.name.clone(),
        }
    }

    pub(crate) fn info(&self) -> EventInfo {
        EventInfo {
            name: self.name.clone(),
            owner: self.owner.clone(),
            tick: self.tick,
            priority: self.priority,
            flags: self.flags,
            fire_count: self.fire_count,
        }
    }
}
