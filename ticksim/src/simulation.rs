//! Discrete-event simulation management.
//!
//! This module contains most notably the [`Simulation`] driver, the
//! [`SimInit`] simulation builder, the [`Scheduler`] handle used to manage
//! events, as well as the types related to checkpointing.
//!
//! # Simulation lifecycle
//!
//! A simulation goes through the following [`Phase`]s:
//!
//! 1. *uninitialized*: components are added to a [`SimInit`] builder and
//!    their [`init()`](crate::component::Component::init) hooks run when
//!    [`SimInit::init()`] is called. Events can be registered but not
//!    scheduled,
//! 2. *ready*: the simulation is built and the clock is at tick zero. Events
//!    can be scheduled and a [`Checkpoint`] can be restored,
//! 3. *running*: the first call to [`Simulation::run()`],
//!    [`Simulation::run_until()`] or [`Simulation::step()`] executes the
//!    [`startup()`](crate::component::Component::startup) hooks, unless
//!    [`Simulation::startup()`] was called explicitly, and then processes
//!    events in tick order,
//! 4. *draining*: the main loop has returned at a safe point, between two
//!    batches of events. The run can be resumed or drained with
//!    [`Simulation::drain()`], which yields a [`Checkpoint`],
//! 5. *stopped*: the run is over, either because it was drained or stopped,
//!    or because a fatal error occurred.
//!
//! # Event processing
//!
//! All events targeting the same tick form a batch. The clock is advanced to
//! the tick of the batch, then all its events are extracted from the queue at
//! once and executed in order of priority and, for equal priorities, in
//! scheduling order. Events scheduled by an action always target a later tick
//! and thus never join the batch being executed. Conversely, the events of a
//! batch are committed: cancelling one of them from an earlier event of the
//! same batch has no effect.
//!
//! A panic raised by an event action, or a violation of the queue ordering
//! invariants, aborts the run with an [`ExecutionError`]. A regular exit
//! requested with [`Scheduler::request_exit()`] is instead reported in the
//! [`RunOutcome`].
//!
//! # Examples
//!
//! ```
//! use ticksim::simulation::{ExitReason, SimInit};
//! use ticksim::time::{Delay, Tick};
//!
//! let mut simu = SimInit::new().init().unwrap();
//! let scheduler = simu.scheduler();
//!
//! scheduler
//!     .schedule_once(Delay(100), "stop", |s| s.request_exit("done"))
//!     .unwrap();
//! scheduler.schedule_once(Tick::new(500), "later", |_| {}).unwrap();
//!
//! let outcome = simu.run().unwrap();
//! assert_eq!(outcome.reason, ExitReason::ExitRequested("done".to_string()));
//! assert_eq!(outcome.tick, Tick::new(100));
//!
//! // The run can be resumed.
//! let outcome = simu.run().unwrap();
//! assert_eq!(outcome.reason, ExitReason::QueueEmpty);
//! assert_eq!(outcome.tick, Tick::new(500));
//! ```
mod checkpoint;
mod clock;
mod event;
mod event_queue;
mod scheduler;
mod sim_init;

pub use checkpoint::{Checkpoint, CheckpointError, PendingEvent, RestoreError, CHECKPOINT_VERSION};
pub use clock::Phase;
pub use event::{EventFlags, EventId, EventInfo, Priority};
pub use event_queue::QueueInvariantViolation;
pub use scheduler::{LifecycleError, Scheduler, SchedulingError};
pub use sim_init::{SimConfig, SimInit};

#[cfg(feature = "tracing")]
pub(crate) use clock::active_tick;
pub(crate) use event::Action;

use std::any::Any;
use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::component::ComponentHooks;
use crate::time::{Deadline, Tick};
use crate::trace::EVENT_FLAG;

pub(crate) use clock::ActiveTickGuard;
use event_queue::ReadyEvent;
use scheduler::SimState;

/// Component name used in traces of events with no owner.
pub const GLOBAL_OWNER: &str = "global";

/// Simulation environment.
///
/// A `Simulation` is created by calling [`SimInit::init()`] on a simulation
/// initializer. It owns the components and the event queue, and drives the
/// clock forward by processing events in tick order.
pub struct Simulation {
    scheduler: Scheduler,
    components: Vec<Box<dyn ComponentHooks>>,
    tick_limit: Option<Tick>,
    event_limit: Option<u64>,
    events_processed: u64,
}

impl Simulation {
    /// Creates a new `Simulation`.
    pub(crate) fn new(
        scheduler: Scheduler,
        components: Vec<Box<dyn ComponentHooks>>,
        tick_limit: Option<Tick>,
        event_limit: Option<u64>,
    ) -> Self {
        Self {
            scheduler,
            components,
            tick_limit,
            event_limit,
            events_processed: 0,
        }
    }

    /// Returns the current simulated tick.
    pub fn cur_tick(&self) -> Tick {
        self.scheduler.cur_tick()
    }

    /// Returns the lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    /// Returns a scheduler handle.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// Total number of events executed so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Total number of cancelled queue entries discarded so far.
    pub fn events_squashed(&self) -> u64 {
        self.state().borrow().queue.squashed_count()
    }

    /// Number of pending events.
    pub fn pending_count(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// Returns the metadata of all pending events, in firing order.
    pub fn pending_events(&self) -> Vec<PendingEvent> {
        self.state().borrow().queue.pending()
    }

    /// Executes the [`startup()`](crate::component::Component::startup) hooks
    /// of all components, in the order in which they were added.
    ///
    /// This is done automatically when the simulation is first run, but
    /// calling it explicitly makes it possible to inspect or complement the
    /// events scheduled by the components before the first event fires.
    pub fn startup(&mut self) -> Result<(), ExecutionError> {
        {
            let mut state = self.state().borrow_mut();
            if state.clock.started {
                return Err(LifecycleError::StartupRepeated.into());
            }
            if !matches!(state.clock.phase, Phase::Ready | Phase::Draining) {
                return Err(LifecycleError::InvalidPhase {
                    operation: "start up",
                    phase: state.clock.phase,
                }
                .into());
            }
            state.clock.started = true;
        }

        for component in &self.components {
            catch_hook(&self.scheduler, component.as_ref(), "startup", |c, s| {
                c.startup(s)
            })?;
        }

        tracing::debug!(
            tick = %self.cur_tick(),
            pending = self.pending_count(),
            "simulation started up"
        );

        Ok(())
    }

    /// Processes the next batch of events, if any, and returns its tick.
    ///
    /// Tick and event limits are not checked, and exit requests are not
    /// acted upon.
    pub fn step(&mut self) -> Result<Option<Tick>, ExecutionError> {
        self.enter_running()?;

        let result = match self.next_tick() {
            Ok(Some(tick)) => self.process_batch(tick).map(|()| Some(tick)),
            other => other,
        };

        result.map_err(|e| self.abort(e))
    }

    /// Runs the main loop until the queue is empty, an exit is requested, or
    /// the configured tick or event limit is reached.
    ///
    /// When the tick limit is reached, the clock is set to the limit.
    pub fn run(&mut self) -> Result<RunOutcome, ExecutionError> {
        self.run_bounded(self.tick_limit, false)
    }

    /// Runs the main loop until all events up to the target tick were
    /// processed, an exit is requested, or the configured limits are reached.
    ///
    /// Unless the loop stopped early, the clock is set to the target tick, or
    /// to the configured tick limit if it is lower.
    pub fn run_until(&mut self, deadline: impl Deadline) -> Result<RunOutcome, ExecutionError> {
        let now = self.cur_tick();
        let target = deadline
            .into_tick(now)
            .ok_or(SchedulingError::TickOverflow)?;
        if target < now {
            return Err(SchedulingError::InvalidTick {
                requested: target,
                current: now,
            }
            .into());
        }
        let bound = self.tick_limit.map_or(target, |limit| limit.min(target));

        self.run_bounded(Some(bound), true)
    }

    /// Stops the simulation at the current safe point, executes the
    /// [`drain()`](crate::component::Component::drain) hooks of all
    /// components and returns a checkpoint of the pending events.
    ///
    /// The simulation is stopped once the checkpoint was taken. If the
    /// checkpoint cannot be taken, the simulation returns to the phase it
    /// was in and can be resumed.
    pub fn drain(&mut self) -> Result<Checkpoint, ExecutionError> {
        let phase = self.phase();
        if !matches!(phase, Phase::Ready | Phase::Running | Phase::Draining) {
            return Err(LifecycleError::InvalidPhase {
                operation: "drain",
                phase,
            }
            .into());
        }
        self.state().borrow_mut().clock.phase = Phase::Draining;

        for component in &self.components {
            catch_hook(&self.scheduler, component.as_ref(), "drain", |c, s| {
                c.drain(s)
            })?;
        }

        let checkpoint = {
            let mut state = self.state().borrow_mut();
            match Checkpoint::new(state.clock.tick(), state.queue.pending()) {
                Ok(checkpoint) => {
                    state.clock.phase = Phase::Stopped;
                    checkpoint
                }
                Err(e) => {
                    state.clock.phase = phase;
                    return Err(e.into());
                }
            }
        };

        tracing::info!(
            tick = %checkpoint.tick(),
            pending = checkpoint.events().len(),
            "simulation drained"
        );

        Ok(checkpoint)
    }

    /// Stops the simulation without taking a checkpoint.
    pub fn stop(&mut self) {
        self.state().borrow_mut().clock.phase = Phase::Stopped;
    }

    /// Restores a checkpoint into a simulation which has not been started.
    ///
    /// The clock is set to the tick of the checkpoint and each checkpointed
    /// event is matched by owner and name against the registered events,
    /// then scheduled at its checkpointed tick and priority. Either all events
    /// are restored or none is.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<(), RestoreError> {
        let mut state = self.state().borrow_mut();
        if state.clock.phase != Phase::Ready {
            return Err(LifecycleError::InvalidPhase {
                operation: "restore",
                phase: state.clock.phase,
            }
            .into());
        }
        if state.clock.started {
            return Err(LifecycleError::AlreadyStarted.into());
        }
        if state.queue.pending_count() != 0 {
            return Err(RestoreError::QueueNotEmpty);
        }

        let now = checkpoint.tick();
        let mut resolved = Vec::with_capacity(checkpoint.events().len());
        for event in checkpoint.events() {
            let id = match state.queue.find(event.owner.as_deref(), &event.name)[..] {
                [id] => id,
                [] => return Err(RestoreError::UnknownEvent(event.qualified_name())),
                _ => return Err(RestoreError::AmbiguousEvent(event.qualified_name())),
            };
            if event.tick <= now {
                return Err(RestoreError::Scheduling {
                    event: event.qualified_name(),
                    error: SchedulingError::InvalidTick {
                        requested: event.tick,
                        current: now,
                    },
                });
            }
            resolved.push((id, event));
        }

        state.clock.restore_to(now);
        for (id, event) in resolved {
            state
                .queue
                .insert(id, event.tick, event.priority, now)
                .map_err(|error| RestoreError::Scheduling {
                    event: event.qualified_name(),
                    error,
                })?;
        }

        tracing::info!(
            tick = %now,
            pending = checkpoint.events().len(),
            "checkpoint restored"
        );

        Ok(())
    }

    fn state(&self) -> &Rc<RefCell<SimState>> {
        self.scheduler.state()
    }

    /// Moves to the running phase, starting up the components first if
    /// needed.
    fn enter_running(&mut self) -> Result<(), ExecutionError> {
        let (phase, started) = {
            let state = self.state().borrow();
            (state.clock.phase, state.clock.started)
        };
        match phase {
            Phase::Ready | Phase::Draining if !started => self.startup()?,
            Phase::Ready | Phase::Running | Phase::Draining => {}
            phase => {
                return Err(LifecycleError::InvalidPhase {
                    operation: "run",
                    phase,
                }
                .into())
            }
        }
        self.state().borrow_mut().clock.phase = Phase::Running;

        Ok(())
    }

    /// Runs the main loop and moves to the draining phase when it returns.
    fn run_bounded(&mut self, limit: Option<Tick>, settle: bool) -> Result<RunOutcome, ExecutionError> {
        self.enter_running()?;

        let start_count = self.events_processed;
        let reason = self
            .process_until(limit, settle)
            .map_err(|e| self.abort(e))?;

        let tick = {
            let mut state = self.state().borrow_mut();
            state.clock.phase = Phase::Draining;
            state.clock.tick()
        };
        let outcome = RunOutcome {
            reason,
            tick,
            events_processed: self.events_processed - start_count,
        };

        tracing::info!(
            tick = %outcome.tick,
            reason = %outcome.reason,
            events = outcome.events_processed,
            "simulation loop exited"
        );

        Ok(outcome)
    }

    fn process_until(&mut self, limit: Option<Tick>, settle: bool) -> Result<ExitReason, ExecutionError> {
        loop {
            if let Some(reason) = self.state().borrow_mut().clock.exit_request.take() {
                return Ok(ExitReason::ExitRequested(reason));
            }
            if self
                .event_limit
                .is_some_and(|max| self.events_processed >= max)
            {
                return Ok(ExitReason::EventLimit);
            }

            match self.next_tick()? {
                Some(tick) if limit.map_or(true, |limit| tick <= limit) => {
                    self.process_batch(tick)?;
                }
                next => {
                    if let Some(limit) = limit {
                        if next.is_some() || settle {
                            self.state().borrow_mut().clock.advance_to(limit);
                        }
                        if next.is_some() {
                            return Ok(ExitReason::TickLimit);
                        }
                    }

                    return Ok(ExitReason::QueueEmpty);
                }
            }
        }
    }

    /// Returns the tick of the earliest pending event.
    fn next_tick(&self) -> Result<Option<Tick>, ExecutionError> {
        let mut state = self.state().borrow_mut();
        let current = state.clock.tick();
        match state.queue.peek_next_tick() {
            Some(next) if next <= current => {
                Err(QueueInvariantViolation::NonCausal { next, current }.into())
            }
            next => Ok(next),
        }
    }

    /// Advances the clock and executes all events targeting `tick`.
    fn process_batch(&mut self, tick: Tick) -> Result<(), ExecutionError> {
        let batch = {
            let mut state = self.state().borrow_mut();
            let current = state.clock.tick();
            if !state.clock.advance_to(tick) {
                return Err(QueueInvariantViolation::NonCausal {
                    next: tick,
                    current,
                }
                .into());
            }
            state.queue.pop_ready(tick)?
        };

        let _active = ActiveTickGuard::enter(tick);
        tracing::trace!(tick = %tick, events = batch.len(), "processing batch");

        for ReadyEvent {
            id,
            name,
            owner,
            mut action,
        } in batch
        {
            let component = owner.as_deref().unwrap_or(GLOBAL_OWNER);
            self.scheduler
                .trace(EVENT_FLAG, component, format_args!("executing event '{}'", name));

            self.scheduler.set_current_event(Some(id));
            let result = panic::catch_unwind(AssertUnwindSafe(|| action.call(&self.scheduler)));
            self.scheduler.set_current_event(None);

            if let Err(payload) = result {
                return Err(ExecutionError::Panic {
                    origin: format!("{}.{}", component, name),
                    payload,
                });
            }

            self.state().borrow_mut().queue.complete(id, action);
            self.events_processed += 1;
        }

        Ok(())
    }

    /// Stops the simulation after a fatal error.
    fn abort(&self, error: ExecutionError) -> ExecutionError {
        self.state().borrow_mut().clock.phase = Phase::Stopped;
        tracing::error!(tick = %self.cur_tick(), error = %error, "simulation aborted");

        error
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.cur_tick())
            .field("phase", &self.phase())
            .field("events_processed", &self.events_processed)
            .finish_non_exhaustive()
    }
}

/// Executes a lifecycle hook, stopping the simulation if it panics.
fn catch_hook(
    scheduler: &Scheduler,
    component: &dyn ComponentHooks,
    hook: &str,
    f: impl FnOnce(&dyn ComponentHooks, &Scheduler),
) -> Result<(), ExecutionError> {
    panic::catch_unwind(AssertUnwindSafe(|| f(component, scheduler))).map_err(|payload| {
        scheduler.state().borrow_mut().clock.phase = Phase::Stopped;

        ExecutionError::Panic {
            origin: format!("{}.{}", component.name(), hook),
            payload,
        }
    })
}

/// The reason why the main loop returned.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExitReason {
    /// No event is pending.
    QueueEmpty,
    /// An exit was requested with the provided reason.
    ExitRequested(String),
    /// The next pending event lies past the tick limit.
    TickLimit,
    /// The event limit was reached.
    EventLimit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueEmpty => f.write_str("no more events are pending"),
            Self::ExitRequested(reason) => write!(f, "exit requested: {}", reason),
            Self::TickLimit => f.write_str("tick limit reached"),
            Self::EventLimit => f.write_str("event limit reached"),
        }
    }
}

/// The outcome of a call to the main loop.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RunOutcome {
    /// Why the loop returned.
    pub reason: ExitReason,
    /// Current tick when the loop returned.
    pub tick: Tick,
    /// Number of events executed during this call.
    pub events_processed: u64,
}

/// A fatal error that aborted a simulation operation.
#[derive(Debug)]
pub enum ExecutionError {
    /// The event queue ordering invariants were violated.
    Queue(QueueInvariantViolation),
    /// The operation is not permitted in the current lifecycle phase.
    Lifecycle(LifecycleError),
    /// The run target could not be computed.
    Scheduling(SchedulingError),
    /// A checkpoint could not be taken.
    Checkpoint(CheckpointError),
    /// An event action or a lifecycle hook panicked.
    Panic {
        /// Qualified name of the event or hook.
        origin: String,
        /// Payload of the panic.
        payload: Box<dyn Any + Send + 'static>,
    },
}

impl ExecutionError {
    /// Returns the panic message, if this is a panic with a string payload.
    pub fn panic_message(&self) -> Option<&str> {
        match self {
            Self::Panic { payload, .. } => payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str)),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue(e) => write!(fmt, "event queue invariant violated: {}", e),
            Self::Lifecycle(e) => e.fmt(fmt),
            Self::Scheduling(e) => e.fmt(fmt),
            Self::Checkpoint(e) => e.fmt(fmt),
            Self::Panic { origin, .. } => match self.panic_message() {
                Some(message) => write!(fmt, "'{}' panicked: {}", origin, message),
                None => write!(fmt, "'{}' panicked", origin),
            },
        }
    }
}

impl Error for ExecutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Queue(e) => Some(e),
            Self::Lifecycle(e) => Some(e),
            Self::Scheduling(e) => Some(e),
            Self::Checkpoint(e) => Some(e),
            Self::Panic { .. } => None,
        }
    }
}

impl From<QueueInvariantViolation> for ExecutionError {
    fn from(e: QueueInvariantViolation) -> Self {
        Self::Queue(e)
    }
}

impl From<LifecycleError> for ExecutionError {
    fn from(e: LifecycleError) -> Self {
        Self::Lifecycle(e)
    }
}

impl From<SchedulingError> for ExecutionError {
    fn from(e: SchedulingError) -> Self {
        Self::Scheduling(e)
    }
}

impl From<CheckpointError> for ExecutionError {
    fn from(e: CheckpointError) -> Self {
        Self::Checkpoint(e)
    }
}
