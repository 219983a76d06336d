//! Simulation components.
//!
//! # Component trait
//!
//! A component is a named piece of simulated hardware or software that owns
//! events. Every component must implement the [`Component`] trait, which
//! provides three lifecycle hooks with empty default implementations:
//!
//! * [`Component::init()`] is called once all components were added, while
//!   the simulation is being built. Components may register their events at
//!   this point but may not schedule them yet,
//! * [`Component::startup()`] is called in component-addition order right
//!   before the first event is processed. This is where initial events are
//!   scheduled. When the simulation was restored from a checkpoint, the
//!   checkpointed events are already pending and [`Context::is_restored()`]
//!   returns `true`,
//! * [`Component::drain()`] is called when the simulation is drained at a
//!   safe point, before a checkpoint is taken.
//!
//! # Component events
//!
//! Events created through a [`Context`] are owned by the component: their
//! action receives a mutable reference to the component and a context, and
//! their name is qualified by the component name in traces and checkpoints.
//!
//! # Addresses and slots
//!
//! A component is handed over to the simulation together with a [`Slot`],
//! from which any number of [`Address`]es can be obtained beforehand. This
//! makes it possible to wire components that refer to each other before they
//! are added to the simulation.
//!
//! # Examples
//!
//! A component that fires a configurable number of times with a fixed
//! latency.
//!
//! ```
//! use ticksim::component::{Component, Context, Slot};
//! use ticksim::simulation::{EventId, SimInit};
//! use ticksim::time::{Delay, Tick};
//!
//! pub struct Pinger {
//!     latency: Delay,
//!     remaining: u32,
//!     event: Option<EventId>,
//! }
//!
//! impl Pinger {
//!     fn ping(&mut self, cx: &Context<Self>) {
//!         self.remaining -= 1;
//!         if self.remaining > 0 {
//!             if let Some(event) = self.event {
//!                 cx.scheduler().schedule(event, self.latency).unwrap();
//!             }
//!         }
//!     }
//! }
//!
//! impl Component for Pinger {
//!     fn init(&mut self, cx: &Context<Self>) {
//!         self.event = Some(cx.create_event("ping", Self::ping).unwrap());
//!     }
//!
//!     fn startup(&mut self, cx: &Context<Self>) {
//!         if let Some(event) = self.event {
//!             cx.scheduler().schedule(event, self.latency).unwrap();
//!         }
//!     }
//! }
//!
//! let slot = Slot::new();
//! let address = slot.address();
//! let pinger = Pinger { latency: Delay(7), remaining: 3, event: None };
//!
//! let mut simu = SimInit::new().add_component(pinger, slot, "pinger").init().unwrap();
//! simu.run().unwrap();
//!
//! assert_eq!(simu.cur_tick(), Tick::new(21));
//! assert_eq!(address.with(|p| p.remaining), Some(0));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::simulation::{Action, EventFlags, EventId, Priority, Scheduler, SchedulingError};
use crate::time::{Deadline, Tick};

/// Trait to be implemented by simulation components.
pub trait Component: Sized + 'static {
    /// Called once all components were added to the simulation.
    ///
    /// Events may be registered but not scheduled.
    fn init(&mut self, _cx: &Context<Self>) {}

    /// Called right before the first event is processed.
    fn startup(&mut self, _cx: &Context<Self>) {}

    /// Called when the simulation is drained, before a checkpoint is taken.
    fn drain(&mut self, _cx: &Context<Self>) {}
}

/// The storage of a component, from which addresses can be obtained before the
/// component is added to a simulation.
pub struct Slot<C>(Rc<RefCell<Option<C>>>);

impl<C: Component> Slot<C> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    /// Returns an address of the component which will be placed in this slot.
    pub fn address(&self) -> Address<C> {
        Address(Rc::downgrade(&self.0))
    }
}

impl<C: Component> Default for Slot<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Slot<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot").finish_non_exhaustive()
    }
}

/// A non-owning handle to a component.
pub struct Address<C>(Weak<RefCell<Option<C>>>);

impl<C> Address<C> {
    /// Calls a closure with a mutable reference to the component.
    ///
    /// Returns `None` if the component was not added to a simulation, if the
    /// simulation was dropped, or if the component is already borrowed, which
    /// happens when a component accesses itself through its own address from
    /// one of its events or hooks.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> Option<R> {
        let cell = self.0.upgrade()?;
        let mut component = cell.try_borrow_mut().ok()?;

        component.as_mut().map(f)
    }
}

impl<C> Clone for Address<C> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<C> fmt::Debug for Address<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address").finish_non_exhaustive()
    }
}

/// A local context for components.
///
/// The context gives access to the simulation scheduler and lets the
/// component register events bound to itself.
pub struct Context<C: Component> {
    name: Rc<str>,
    scheduler: Scheduler,
    address: Address<C>,
}

impl<C: Component> Context<C> {
    fn new(name: Rc<str>, scheduler: Scheduler, address: Address<C>) -> Self {
        Self {
            name,
            scheduler,
            address,
        }
    }

    /// Returns the component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current simulated tick.
    pub fn cur_tick(&self) -> Tick {
        self.scheduler.cur_tick()
    }

    /// Returns the simulation scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Returns the address of the component.
    pub fn address(&self) -> Address<C> {
        self.address.clone()
    }

    /// Returns `true` if the simulation was restored from a checkpoint.
    pub fn is_restored(&self) -> bool {
        self.scheduler.state().borrow().clock.restored
    }

    /// Registers an event owned by the component.
    pub fn create_event<F>(&self, name: impl Into<String>, action: F) -> Result<EventId, SchedulingError>
    where
        F: FnMut(&mut C, &Context<C>) + 'static,
    {
        self.scheduler.register(
            name.into(),
            Some(self.name.to_string()),
            EventFlags::default(),
            self.bind(action),
        )
    }

    /// Registers an event owned by the component which is released
    /// automatically after it fires, unless its action scheduled it again.
    pub fn create_auto_event<F>(
        &self,
        name: impl Into<String>,
        action: F,
    ) -> Result<EventId, SchedulingError>
    where
        F: FnMut(&mut C, &Context<C>) + 'static,
    {
        self.scheduler.register(
            name.into(),
            Some(self.name.to_string()),
            EventFlags::auto_release(),
            self.bind(action),
        )
    }

    /// Registers and schedules a one-shot event owned by the component.
    pub fn schedule_once<F>(
        &self,
        deadline: impl Deadline,
        name: impl Into<String>,
        action: F,
    ) -> Result<EventId, SchedulingError>
    where
        F: FnOnce(&mut C, &Context<C>) + 'static,
    {
        self.schedule_once_with_priority(deadline, Priority::DEFAULT, name, action)
    }

    /// Registers and schedules a one-shot event owned by the component at the
    /// specified priority.
    pub fn schedule_once_with_priority<F>(
        &self,
        deadline: impl Deadline,
        priority: Priority,
        name: impl Into<String>,
        action: F,
    ) -> Result<EventId, SchedulingError>
    where
        F: FnOnce(&mut C, &Context<C>) + 'static,
    {
        let mut action = Some(action);
        let action = self.bind(move |component, cx| {
            if let Some(action) = action.take() {
                action(component, cx)
            }
        });

        self.scheduler.register_once(
            name.into(),
            Some(self.name.to_string()),
            deadline,
            priority,
            action,
        )
    }

    /// Returns `true` if the trace flag is enabled.
    pub fn trace_enabled(&self, flag: &str) -> bool {
        self.scheduler.trace_enabled(flag)
    }

    /// Emits a trace line under a named flag, attributed to the component.
    pub fn trace(&self, flag: &str, message: fmt::Arguments<'_>) {
        self.scheduler.trace(flag, &self.name, message);
    }

    fn bind<F>(&self, mut action: F) -> Action
    where
        F: FnMut(&mut C, &Context<C>) + 'static,
    {
        let name = self.name.clone();
        let address = self.address.clone();

        Action::new(move |scheduler| {
            let Some(cell) = address.0.upgrade() else {
                tracing::warn!(component = %name, "event fired for a dropped component");
                return;
            };
            let cx = Context::new(name.clone(), scheduler.clone(), address.clone());
            let mut component = cell.borrow_mut();
            if let Some(component) = component.as_mut() {
                action(component, &cx);
            }
        })
    }
}

impl<C: Component> fmt::Debug for Context<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Type-erased lifecycle hooks of a component added to a simulation.
pub(crate) trait ComponentHooks {
    fn name(&self) -> &str;
    fn init(&self, scheduler: &Scheduler);
    fn startup(&self, scheduler: &Scheduler);
    fn drain(&self, scheduler: &Scheduler);
}

/// A component owned by a simulation.
pub(crate) struct Registered<C> {
    cell: Rc<RefCell<Option<C>>>,
    name: Rc<str>,
}

impl<C: Component> Registered<C> {
    pub(crate) fn new(component: C, slot: Slot<C>, name: String) -> Self {
        *slot.0.borrow_mut() = Some(component);

        Self {
            cell: slot.0,
            name: name.into(),
        }
    }

    fn call(&self, scheduler: &Scheduler, hook: fn(&mut C, &Context<C>)) {
        let cx = Context::new(
            self.name.clone(),
            scheduler.clone(),
            Address(Rc::downgrade(&self.cell)),
        );
        if let Some(component) = self.cell.borrow_mut().as_mut() {
            hook(component, &cx);
        }
    }
}

impl<C: Component> ComponentHooks for Registered<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self, scheduler: &Scheduler) {
        self.call(scheduler, C::init);
    }

    fn startup(&self, scheduler: &Scheduler) {
        self.call(scheduler, C::startup);
    }

    fn drain(&self, scheduler: &Scheduler) {
        self.call(scheduler, C::drain);
    }
}
