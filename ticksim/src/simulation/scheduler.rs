//! Scheduling functions and types.

use std::cell::{Cell, RefCell};
use std::error::Error;
use std::fmt;
use std::rc::Rc;

use crate::time::{Deadline, Tick};
use crate::trace::Tracer;

use super::clock::{Clock, Phase};
use super::event::{Action, EventFlags, EventId, EventInfo, Priority};
use super::event_queue::EventQueue;

/// State shared by the simulation driver and all scheduler handles.
#[derive(Debug)]
pub(crate) struct SimState {
    pub(crate) clock: Clock,
    pub(crate) queue: EventQueue,
    pub(crate) tracer: Tracer,
}

impl SimState {
    pub(crate) fn new(tracer: Tracer) -> Self {
        Self {
            clock: Clock::new(),
            queue: EventQueue::new(),
            tracer,
        }
    }
}

/// A handle to the event queue and clock of a simulation.
///
/// A `Scheduler` is passed by reference to every event action and can be
/// obtained from [`Simulation::scheduler()`](super::Simulation::scheduler) or
/// from a component's [`Context`](crate::component::Context). All clones of a
/// scheduler refer to the same simulation.
///
/// Actions must not store a clone of the scheduler they are handed since the
/// event table owns the actions: use the `&Scheduler` argument instead.
///
/// # Examples
///
/// A self-rescheduling event.
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use ticksim::simulation::SimInit;
/// use ticksim::time::{Delay, Tick};
///
/// let mut simu = SimInit::new().init().unwrap();
/// let scheduler = simu.scheduler();
///
/// let remaining = Rc::new(Cell::new(3));
/// let counter = remaining.clone();
/// let tick_event = scheduler
///     .create_event("tick", move |s| {
///         counter.set(counter.get() - 1);
///         if counter.get() > 0 {
///             // The event is no longer pending while it fires.
///             s.schedule(s.current_event().unwrap(), Delay(10)).unwrap();
///         }
///     })
///     .unwrap();
/// scheduler.schedule(tick_event, Tick::new(5)).unwrap();
///
/// simu.run().unwrap();
/// assert_eq!(remaining.get(), 0);
/// assert_eq!(simu.cur_tick(), Tick::new(25));
/// ```
#[derive(Clone)]
pub struct Scheduler {
    state: Rc<RefCell<SimState>>,
    current: Rc<Cell<Option<EventId>>>,
}

impl Scheduler {
    pub(crate) fn new(state: Rc<RefCell<SimState>>) -> Self {
        Self {
            state,
            current: Rc::new(Cell::new(None)),
        }
    }

    pub(crate) fn state(&self) -> &Rc<RefCell<SimState>> {
        &self.state
    }

    pub(crate) fn set_current_event(&self, event: Option<EventId>) {
        self.current.set(event);
    }

    /// Returns the current simulated tick.
    pub fn cur_tick(&self) -> Tick {
        self.state.borrow().clock.tick()
    }

    /// Returns the lifecycle phase of the simulation.
    pub fn phase(&self) -> Phase {
        self.state.borrow().clock.phase
    }

    /// Returns the handle of the event being executed, if any.
    pub fn current_event(&self) -> Option<EventId> {
        self.current.get()
    }

    /// Registers a new event with no owner.
    ///
    /// The event is not scheduled. Its action is executed each time the event
    /// fires.
    pub fn create_event<F>(&self, name: impl Into<String>, action: F) -> Result<EventId, SchedulingError>
    where
        F: FnMut(&Scheduler) + 'static,
    {
        self.register(name.into(), None, EventFlags::default(), Action::new(action))
    }

    /// Registers a new event with no owner which is released automatically
    /// after it fires, unless its action scheduled it again.
    pub fn create_auto_event<F>(
        &self,
        name: impl Into<String>,
        action: F,
    ) -> Result<EventId, SchedulingError>
    where
        F: FnMut(&Scheduler) + 'static,
    {
        self.register(
            name.into(),
            None,
            EventFlags::auto_release(),
            Action::new(action),
        )
    }

    /// Registers and schedules a one-shot event at the default priority.
    ///
    /// The event is released automatically after it fires.
    pub fn schedule_once<F>(
        &self,
        deadline: impl Deadline,
        name: impl Into<String>,
        action: F,
    ) -> Result<EventId, SchedulingError>
    where
        F: FnOnce(&Scheduler) + 'static,
    {
        let mut action = Some(action);
        let action = Action::new(move |scheduler| {
            if let Some(action) = action.take() {
                action(scheduler)
            }
        });

        self.register_once(name.into(), None, deadline, Priority::DEFAULT, action)
    }

    /// Inserts a registered event in the queue at the default priority.
    ///
    /// The target tick must lie strictly in the future of the current tick
    /// and the event must not already be pending.
    pub fn schedule(&self, event: EventId, deadline: impl Deadline) -> Result<(), SchedulingError> {
        self.schedule_with_priority(event, deadline, Priority::DEFAULT)
    }

    /// Inserts a registered event in the queue at the specified priority.
    pub fn schedule_with_priority(
        &self,
        event: EventId,
        deadline: impl Deadline,
        priority: Priority,
    ) -> Result<(), SchedulingError> {
        let mut state = self.state.borrow_mut();
        check_phase(&state.clock, "schedule")?;
        let now = state.clock.tick();
        let tick = deadline
            .into_tick(now)
            .ok_or(SchedulingError::TickOverflow)?;

        state.queue.insert(event, tick, priority, now)
    }

    /// Cancels a pending event.
    ///
    /// Returns `true` if the event was pending. Cancelling an event which is
    /// not pending, including an event already extracted for execution in the
    /// current tick, is a no-op that returns `false`.
    pub fn deschedule(&self, event: EventId) -> Result<bool, SchedulingError> {
        let mut state = self.state.borrow_mut();
        check_phase(&state.clock, "deschedule")?;

        state.queue.cancel(event)
    }

    /// Moves an event to a new tick at the default priority, whether or not it
    /// is currently pending.
    pub fn reschedule(&self, event: EventId, deadline: impl Deadline) -> Result<(), SchedulingError> {
        self.reschedule_with_priority(event, deadline, Priority::DEFAULT)
    }

    /// Moves an event to a new tick and priority, whether or not it is
    /// currently pending.
    ///
    /// On error, the previous scheduling occurrence is left untouched.
    pub fn reschedule_with_priority(
        &self,
        event: EventId,
        deadline: impl Deadline,
        priority: Priority,
    ) -> Result<(), SchedulingError> {
        let mut state = self.state.borrow_mut();
        check_phase(&state.clock, "reschedule")?;
        let now = state.clock.tick();
        let tick = deadline
            .into_tick(now)
            .ok_or(SchedulingError::TickOverflow)?;

        state.queue.reschedule(event, tick, priority, now)
    }

    /// Releases a registered event which is not pending.
    ///
    /// The handle becomes invalid.
    pub fn release(&self, event: EventId) -> Result<(), SchedulingError> {
        self.state.borrow_mut().queue.release(event)
    }

    /// Returns whether an event is pending.
    pub fn is_pending(&self, event: EventId) -> Result<bool, SchedulingError> {
        self.state.borrow().queue.is_pending(event)
    }

    /// Returns a snapshot of the metadata of an event.
    pub fn event_info(&self, event: EventId) -> Result<EventInfo, SchedulingError> {
        self.state.borrow().queue.info(event)
    }

    /// Returns the number of pending events.
    pub fn pending_count(&self) -> usize {
        self.state.borrow().queue.pending_count()
    }

    /// Asks the simulation to stop at the next safe point.
    ///
    /// The current batch of events completes and the run loop then returns
    /// with [`ExitReason::ExitRequested`](super::ExitReason::ExitRequested).
    /// If several exits are requested before the loop stops, the first reason
    /// is kept.
    pub fn request_exit(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state.borrow_mut();
        tracing::debug!(tick = %state.clock.tick(), reason = %reason, "exit requested");
        state.clock.exit_request.get_or_insert(reason);
    }

    /// Returns `true` if the trace flag is enabled.
    pub fn trace_enabled(&self, flag: &str) -> bool {
        self.state.borrow().tracer.is_enabled(flag)
    }

    /// Emits a trace line under a named flag.
    ///
    /// See also the [`sim_trace!`](crate::sim_trace) macro.
    pub fn trace(&self, flag: &str, component: &str, message: fmt::Arguments<'_>) {
        let state = self.state.borrow();
        state
            .tracer
            .emit(state.clock.tick(), flag, component, message);
    }

    /// Registers an event.
    pub(crate) fn register(
        &self,
        name: String,
        owner: Option<String>,
        flags: EventFlags,
        action: Action,
    ) -> Result<EventId, SchedulingError> {
        let mut state = self.state.borrow_mut();
        if state.clock.phase == Phase::Stopped {
            return Err(LifecycleError::InvalidPhase {
                operation: "create event",
                phase: Phase::Stopped,
            }
            .into());
        }

        Ok(state.queue.register(name, owner, flags, action))
    }

    /// Registers and schedules an auto-release event, releasing it again if it
    /// cannot be scheduled.
    pub(crate) fn register_once(
        &self,
        name: String,
        owner: Option<String>,
        deadline: impl Deadline,
        priority: Priority,
        action: Action,
    ) -> Result<EventId, SchedulingError> {
        let event = self.register(name, owner, EventFlags::auto_release(), action)?;
        if let Err(e) = self.schedule_with_priority(event, deadline, priority) {
            // The record is not pending so it can always be released.
            let _ = self.release(event);

            return Err(e);
        }

        Ok(event)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tick", &self.cur_tick())
            .finish_non_exhaustive()
    }
}

fn check_phase(clock: &Clock, operation: &'static str) -> Result<(), LifecycleError> {
    if clock.accepts_scheduling() {
        Ok(())
    } else {
        Err(LifecycleError::InvalidPhase {
            operation,
            phase: clock.phase,
        })
    }
}

/// Error returned when an operation is not permitted in the current lifecycle
/// phase.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LifecycleError {
    /// The operation cannot be performed in this phase.
    InvalidPhase {
        /// Operation that was attempted.
        operation: &'static str,
        /// Phase of the simulation.
        phase: Phase,
    },
    /// The startup hooks were already executed.
    StartupRepeated,
    /// The operation is only permitted before the first event is processed.
    AlreadyStarted,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPhase { operation, phase } => write!(
                fmt,
                "cannot {} while the simulation is {}",
                operation, phase
            ),
            Self::StartupRepeated => write!(fmt, "the simulation was already started up"),
            Self::AlreadyStarted => write!(
                fmt,
                "the operation is only permitted before the simulation is started"
            ),
        }
    }
}

impl Error for LifecycleError {}

/// Error returned when an event cannot be scheduled or looked up.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SchedulingError {
    /// The target tick does not lie strictly in the future of the current
    /// tick.
    InvalidTick {
        /// Requested target tick.
        requested: Tick,
        /// Current tick.
        current: Tick,
    },
    /// The target tick cannot be represented.
    TickOverflow,
    /// The event is already pending.
    AlreadyPending,
    /// The event handle does not refer to a registered event.
    UnknownEvent,
    /// The operation is not permitted in the current lifecycle phase.
    Lifecycle(LifecycleError),
}

impl fmt::Display for SchedulingError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTick { requested, current } => write!(
                fmt,
                "the target tick {} should be in the future of the current tick {}",
                requested, current
            ),
            Self::TickOverflow => write!(fmt, "the target tick overflows the tick range"),
            Self::AlreadyPending => write!(fmt, "the event is already pending"),
            Self::UnknownEvent => write!(fmt, "the event handle is invalid or was released"),
            Self::Lifecycle(e) => e.fmt(fmt),
        }
    }
}

impl Error for SchedulingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Lifecycle(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LifecycleError> for SchedulingError {
    fn from(e: LifecycleError) -> Self {
        Self::Lifecycle(e)
    }
}
