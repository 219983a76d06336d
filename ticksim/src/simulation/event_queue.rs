//! The ordered queue of pending events.

use std::error::Error;
use std::fmt;

use slab::Slab;

use crate::time::Tick;
use crate::util::priority_queue::PriorityQueue;

use super::checkpoint::PendingEvent;
use super::event::{Action, EventFlags, EventId, EventInfo, EventRecord, Priority};
use super::SchedulingError;

/// An event extracted from the queue and committed for execution.
#[derive(Debug)]
pub(crate) struct ReadyEvent {
    pub(crate) id: EventId,
    pub(crate) name: String,
    pub(crate) owner: Option<String>,
    pub(crate) action: Action,
}

/// Event table and tick-ordered queue of a simulation.
///
/// Registered events live in a slab-allocated table and are referred to by
/// [`EventId`]s. The queue itself is a binary heap keyed by `(tick, priority)`
/// which breaks ties with a monotonically increasing insertion sequence
/// number, making extraction order fully deterministic.
///
/// Cancellation is lazy: a cancelled event is merely flagged as squashed in the
/// table and its heap entry is discarded when it reaches the top of the heap.
/// A heap entry is live only if the sequence number recorded in the table for
/// that event matches the entry's own, which also covers entries left behind
/// by re-scheduling.
pub(crate) struct EventQueue {
    events: Slab<EventRecord>,
    heap: PriorityQueue<(Tick, Priority), EventId>,
    next_generation: u64,
    pending_count: usize,
    squashed_count: u64,
}

impl EventQueue {
    /// Creates an empty queue with an empty event table.
    pub(crate) fn new() -> Self {
        Self {
            events: Slab::new(),
            heap: PriorityQueue::new(),
            next_generation: 0,
            pending_count: 0,
            squashed_count: 0,
        }
    }

    /// Registers a new event and returns its handle.
    pub(crate) fn register(
        &mut self,
        name: String,
        owner: Option<String>,
        flags: EventFlags,
        action: Action,
    ) -> EventId {
        let generation = self.next_generation;
        self.next_generation += 1;

        let entry = self.events.vacant_entry();
        let id = EventId {
            index: entry.key(),
            generation,
        };
        entry.insert(EventRecord {
            name,
            owner,
            action: Some(action),
            generation,
            tick: Tick::ZERO,
            priority: Priority::DEFAULT,
            flags,
            seq: None,
            fire_count: 0,
        });

        id
    }

    /// Removes a non-pending event from the table.
    pub(crate) fn release(&mut self, id: EventId) -> Result<(), SchedulingError> {
        let record = self.record(id)?;
        if record.flags.is_pending() {
            return Err(SchedulingError::AlreadyPending);
        }
        self.events.remove(id.index);

        Ok(())
    }

    /// Inserts a registered event in the queue.
    ///
    /// Fails if the handle is stale, if the target tick is not strictly in the
    /// future of `now` or if the event is already pending.
    pub(crate) fn insert(
        &mut self,
        id: EventId,
        tick: Tick,
        priority: Priority,
        now: Tick,
    ) -> Result<(), SchedulingError> {
        let record = self.record(id)?;
        if tick <= now {
            return Err(SchedulingError::InvalidTick {
                requested: tick,
                current: now,
            });
        }
        if record.flags.is_pending() {
            return Err(SchedulingError::AlreadyPending);
        }

        self.insert_unchecked(id, tick, priority);

        Ok(())
    }

    /// Cancels a pending event.
    ///
    /// Returns `true` if the event was pending and `false` if it was not, in
    /// which case this is a no-op.
    pub(crate) fn cancel(&mut self, id: EventId) -> Result<bool, SchedulingError> {
        let record = self.record_mut(id)?;
        if !record.flags.is_pending() {
            return Ok(false);
        }
        record.flags.set_squashed();
        record.seq = None;
        self.pending_count -= 1;

        Ok(true)
    }

    /// Moves an event to a new tick and priority, whether or not it is
    /// currently pending.
    ///
    /// All arguments are validated before the queue is modified so the
    /// previous scheduling occurrence, if any, is left intact on error.
    pub(crate) fn reschedule(
        &mut self,
        id: EventId,
        tick: Tick,
        priority: Priority,
        now: Tick,
    ) -> Result<(), SchedulingError> {
        let record = self.record_mut(id)?;
        if tick <= now {
            return Err(SchedulingError::InvalidTick {
                requested: tick,
                current: now,
            });
        }
        if record.flags.is_pending() {
            record.seq = None;
            self.pending_count -= 1;
        }
        self.insert_unchecked(id, tick, priority);

        Ok(())
    }

    /// Returns the smallest tick among live pending events, discarding any
    /// squashed entry found at the top of the heap.
    pub(crate) fn peek_next_tick(&mut self) -> Option<Tick> {
        while let Some(((tick, _), seq, id)) = self.heap.peek() {
            if self.is_live(id, seq) {
                return Some(tick);
            }
            self.heap.pull();
            self.squashed_count += 1;
        }

        None
    }

    /// Removes all live events targeting `tick` and returns them in priority
    /// then sequence order.
    ///
    /// Extracted events are no longer pending: they are committed to execute
    /// and their actions are moved to the returned batch. Squashed entries are
    /// discarded silently.
    pub(crate) fn pop_ready(&mut self, tick: Tick) -> Result<Vec<ReadyEvent>, QueueInvariantViolation> {
        let mut batch = Vec::new();
        let mut last_key: Option<(Priority, u64)> = None;

        while let Some(&(entry_tick, _)) = self.heap.peek_key() {
            if entry_tick > tick {
                break;
            }
            let Some(((entry_tick, priority), seq, id)) = self.heap.pull() else {
                break;
            };
            if !self.is_live(id, seq) {
                self.squashed_count += 1;
                continue;
            }

            let record = &mut self.events[id.index];
            if entry_tick < tick {
                return Err(QueueInvariantViolation::TimeTravel {
                    event: record.qualified_name(),
                    scheduled: entry_tick,
                    current: tick,
                });
            }
            if let Some(last_key) = last_key {
                if (priority, seq) < last_key {
                    return Err(QueueInvariantViolation::OutOfOrder {
                        event: record.qualified_name(),
                        tick,
                    });
                }
            }
            last_key = Some((priority, seq));

            if record.flags.is_squashed() {
                return Err(QueueInvariantViolation::SquashedExecuted {
                    event: record.qualified_name(),
                });
            }
            let Some(action) = record.action.take() else {
                return Err(QueueInvariantViolation::MissingAction {
                    event: record.qualified_name(),
                });
            };
            record.flags.set_fired();
            record.seq = None;
            let ready = ReadyEvent {
                id,
                name: record.name.clone(),
                owner: record.owner.clone(),
                action,
            };
            self.pending_count -= 1;
            batch.push(ready);
        }

        Ok(batch)
    }

    /// Hands the action of an executed event back to its record.
    ///
    /// Auto-release events that were not re-scheduled by their own action are
    /// removed from the table, as are actions of events released while they
    /// were executing.
    pub(crate) fn complete(&mut self, id: EventId, action: Action) {
        let Ok(record) = self.record_mut(id) else {
            return;
        };
        record.fire_count += 1;
        if record.flags.is_auto_release() && !record.flags.is_pending() {
            self.events.remove(id.index);
        } else {
            record.action = Some(action);
        }
    }

    /// Returns the metadata of all pending events, in firing order.
    pub(crate) fn pending(&self) -> Vec<PendingEvent> {
        let mut pending: Vec<_> = self
            .events
            .iter()
            .filter_map(|(_, record)| record.seq.map(|seq| (record, seq)))
            .collect();
        pending.sort_by_key(|(record, seq)| (record.tick, record.priority, *seq));

        pending
            .into_iter()
            .map(|(record, _)| PendingEvent {
                name: record.name.clone(),
                owner: record.owner.clone(),
                tick: record.tick,
                priority: record.priority,
            })
            .collect()
    }

    /// Returns the handles of all registered events matching the owner and
    /// name, in registration order.
    pub(crate) fn find(&self, owner: Option<&str>, name: &str) -> Vec<EventId> {
        let mut ids: Vec<_> = self
            .events
            .iter()
            .filter(|(_, record)| record.name == name && record.owner.as_deref() == owner)
            .map(|(index, record)| EventId {
                index,
                generation: record.generation,
            })
            .collect();
        ids.sort_by_key(|id| id.generation);

        ids
    }

    /// Returns a snapshot of an event's metadata.
    pub(crate) fn info(&self, id: EventId) -> Result<EventInfo, SchedulingError> {
        self.record(id).map(EventRecord::info)
    }

    /// Returns whether an event is pending.
    pub(crate) fn is_pending(&self, id: EventId) -> Result<bool, SchedulingError> {
        self.record(id).map(|record| record.flags.is_pending())
    }

    /// Number of pending events.
    pub(crate) fn pending_count(&self) -> usize {
        self.pending_count
    }

    /// Number of heap entries, including squashed entries not yet discarded.
    #[cfg(test)]
    pub(crate) fn entry_count(&self) -> usize {
        self.heap.len()
    }

    /// Total number of squashed entries discarded so far.
    pub(crate) fn squashed_count(&self) -> u64 {
        self.squashed_count
    }

    /// Number of registered events.
    pub(crate) fn registered_count(&self) -> usize {
        self.events.len()
    }

    fn insert_unchecked(&mut self, id: EventId, tick: Tick, priority: Priority) {
        let seq = self.heap.insert((tick, priority), id);
        let record = &mut self.events[id.index];
        record.tick = tick;
        record.priority = priority;
        record.flags.set_pending();
        record.seq = Some(seq);
        self.pending_count += 1;
    }

    fn is_live(&self, id: EventId, seq: u64) -> bool {
        self.events.get(id.index).is_some_and(|record| {
            record.generation == id.generation
                && record.seq == Some(seq)
                && record.flags.is_pending()
        })
    }

    fn record(&self, id: EventId) -> Result<&EventRecord, SchedulingError> {
        self.events
            .get(id.index)
            .filter(|record| record.generation == id.generation)
            .ok_or(SchedulingError::UnknownEvent)
    }

    fn record_mut(&mut self, id: EventId) -> Result<&mut EventRecord, SchedulingError> {
        self.events
            .get_mut(id.index)
            .filter(|record| record.generation == id.generation)
            .ok_or(SchedulingError::UnknownEvent)
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("registered", &self.events.len())
            .field("pending", &self.pending_count)
            .field("entries", &self.heap.len())
            .finish_non_exhaustive()
    }
}

/// An internal inconsistency of the event queue.
///
/// Such violations are fatal: once the causal order of events cannot be
/// trusted, the simulation run is aborted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueInvariantViolation {
    /// An event was extracted after an event with a larger ordering key.
    OutOfOrder {
        /// Qualified name of the event.
        event: String,
        /// Tick being processed.
        tick: Tick,
    },
    /// A pending event was found at a tick earlier than the current tick.
    TimeTravel {
        /// Qualified name of the event.
        event: String,
        /// Target tick of the event.
        scheduled: Tick,
        /// Tick being processed.
        current: Tick,
    },
    /// A squashed event was about to be executed.
    SquashedExecuted {
        /// Qualified name of the event.
        event: String,
    },
    /// A pending event had no action to execute.
    MissingAction {
        /// Qualified name of the event.
        event: String,
    },
    /// The earliest pending event does not lie in the future of the clock.
    NonCausal {
        /// Tick of the earliest pending event.
        next: Tick,
        /// Current tick.
        current: Tick,
    },
}

impl fmt::Display for QueueInvariantViolation {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrder { event, tick } => write!(
                fmt,
                "event '{}' was extracted out of order at tick {}",
                event, tick
            ),
            Self::TimeTravel {
                event,
                scheduled,
                current,
            } => write!(
                fmt,
                "event '{}' scheduled at tick {} was found at tick {}",
                event, scheduled, current
            ),
            Self::SquashedExecuted { event } => {
                write!(fmt, "squashed event '{}' was about to be executed", event)
            }
            Self::MissingAction { event } => {
                write!(fmt, "pending event '{}' has no action", event)
            }
            Self::NonCausal { next, current } => write!(
                fmt,
                "a pending event targets tick {} while the clock is at tick {}",
                next, current
            ),
        }
    }
}

impl Error for QueueInvariantViolation {}
