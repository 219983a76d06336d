//! Checkpoints of the simulation state.
//!
//! A [`Checkpoint`] is taken by
//! [`Simulation::drain()`](super::Simulation::drain) once the run loop has
//! stopped at a safe point. It records the current tick and the metadata of
//! every pending event. Events are identified by their owner and name, so a
//! checkpoint can be restored into a freshly built simulation with
//! [`Simulation::restore()`](super::Simulation::restore) provided the same
//! component graph registers the same events. Actions are never serialized.
//!
//! Checkpoints implement `serde`'s `Serialize` and `Deserialize` and can be
//! encoded to and decoded from CBOR.

use std::collections::HashSet;
use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::Tick;

use super::event::Priority;
use super::scheduler::{LifecycleError, SchedulingError};

/// Version of the checkpoint format.
pub const CHECKPOINT_VERSION: u32 = 1;

/// The metadata of a pending event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEvent {
    /// Name of the event.
    pub name: String,
    /// Name of the component owning the event, if any.
    pub owner: Option<String>,
    /// Target tick.
    pub tick: Tick,
    /// Priority.
    pub priority: Priority,
}

impl PendingEvent {
    /// Name qualified by the owner, if any.
    pub fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}", owner, self.name),
            None => self.name.clone(),
        }
    }
}

/// A snapshot of the clock and of the pending events of a simulation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    version: u32,
    tick: Tick,
    events: Vec<PendingEvent>,
}

impl Checkpoint {
    /// Creates a checkpoint, checking that each event is uniquely identified
    /// by its owner and name.
    pub(crate) fn new(tick: Tick, events: Vec<PendingEvent>) -> Result<Self, CheckpointError> {
        let mut seen = HashSet::new();
        for event in &events {
            if !seen.insert((event.owner.as_deref(), event.name.as_str())) {
                return Err(CheckpointError::DuplicateEvent(event.qualified_name()));
            }
        }

        Ok(Self {
            version: CHECKPOINT_VERSION,
            tick,
            events,
        })
    }

    /// Tick at which the checkpoint was taken.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Pending events, in firing order.
    pub fn events(&self) -> &[PendingEvent] {
        &self.events
    }

    /// Encodes the checkpoint as CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>, CheckpointError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| CheckpointError::Encode(e.to_string()))?;

        Ok(bytes)
    }

    /// Decodes a checkpoint from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self =
            ciborium::from_reader(bytes).map_err(|e| CheckpointError::Decode(e.to_string()))?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion(checkpoint.version));
        }

        Self::new(checkpoint.tick, checkpoint.events)
    }
}

/// Error returned when a checkpoint cannot be created, encoded or decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointError {
    /// Several pending events share the same owner and name.
    DuplicateEvent(String),
    /// The checkpoint could not be encoded.
    Encode(String),
    /// The checkpoint could not be decoded.
    Decode(String),
    /// The checkpoint format version is not supported.
    UnsupportedVersion(u32),
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateEvent(name) => write!(
                fmt,
                "several pending events are named '{}' and cannot be told apart",
                name
            ),
            Self::Encode(e) => write!(fmt, "the checkpoint could not be encoded: {}", e),
            Self::Decode(e) => write!(fmt, "the checkpoint could not be decoded: {}", e),
            Self::UnsupportedVersion(v) => {
                write!(fmt, "unsupported checkpoint format version {}", v)
            }
        }
    }
}

impl Error for CheckpointError {}

/// Error returned when a checkpoint cannot be restored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestoreError {
    /// The simulation is not in a phase where it can be restored.
    Lifecycle(LifecycleError),
    /// Events were scheduled before the restore.
    QueueNotEmpty,
    /// No registered event matches a checkpointed event.
    UnknownEvent(String),
    /// Several registered events match a checkpointed event.
    AmbiguousEvent(String),
    /// A checkpointed event could not be scheduled.
    Scheduling {
        /// Qualified name of the event.
        event: String,
        /// Cause of the failure.
        error: SchedulingError,
    },
}

impl fmt::Display for RestoreError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lifecycle(e) => e.fmt(fmt),
            Self::QueueNotEmpty => write!(
                fmt,
                "a checkpoint can only be restored into a simulation with no pending events"
            ),
            Self::UnknownEvent(name) => write!(fmt, "no registered event matches '{}'", name),
            Self::AmbiguousEvent(name) => {
                write!(fmt, "several registered events match '{}'", name)
            }
            Self::Scheduling { event, error } => {
                write!(fmt, "event '{}' could not be restored: {}", event, error)
            }
        }
    }
}

impl Error for RestoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Lifecycle(e) => Some(e),
            Self::Scheduling { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<LifecycleError> for RestoreError {
    fn from(e: LifecycleError) -> Self {
        Self::Lifecycle(e)
    }
}
