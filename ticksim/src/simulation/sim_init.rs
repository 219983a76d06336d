use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentHooks, Registered, Slot};
use crate::time::Tick;
use crate::trace::{TraceBuffer, TraceFlags, Tracer};

use super::clock::Phase;
use super::scheduler::{Scheduler, SimState};
use super::{ExecutionError, Simulation};

/// Run configuration that can be loaded from any `serde` data format.
///
/// All fields are optional.
///
/// # Examples
///
/// ```
/// use ticksim::simulation::{SimConfig, SimInit};
/// use ticksim::time::Tick;
///
/// let config = SimConfig {
///     tick_limit: Some(Tick::new(1_000)),
///     trace_flags: vec!["Event".to_string()],
///     ..SimConfig::default()
/// };
///
/// let simu = SimInit::new().with_config(&config).init().unwrap();
/// # drop(simu);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Tick past which [`Simulation::run()`] stops.
    pub tick_limit: Option<Tick>,
    /// Number of processed events after which [`Simulation::run()`] stops.
    pub event_limit: Option<u64>,
    /// Trace flags to enable.
    pub trace_flags: Vec<String>,
}

/// Builder for a simulation.
pub struct SimInit {
    components: Vec<Box<dyn ComponentHooks>>,
    names: HashSet<String>,
    flags: TraceFlags,
    buffer: Option<TraceBuffer>,
    tick_limit: Option<Tick>,
    event_limit: Option<u64>,
}

impl SimInit {
    /// Creates a builder for a simulation with no component, no limit and no
    /// enabled trace flag.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            names: HashSet::new(),
            flags: TraceFlags::new(),
            buffer: None,
            tick_limit: None,
            event_limit: None,
        }
    }

    /// Adds a component and its slot to the simulation.
    ///
    /// Components are initialized and started up in the order in which they
    /// are added. The name identifies the events owned by the component in
    /// traces and checkpoints and should therefore be unique.
    pub fn add_component<C: Component>(
        mut self,
        component: C,
        slot: Slot<C>,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        if !self.names.insert(name.clone()) {
            tracing::warn!(component = %name, "several components share the same name");
        }
        self.components
            .push(Box::new(Registered::new(component, slot, name)));

        self
    }

    /// Sets the tick past which [`Simulation::run()`] stops.
    pub fn set_tick_limit(mut self, limit: Tick) -> Self {
        self.tick_limit = Some(limit);

        self
    }

    /// Sets the number of processed events after which [`Simulation::run()`]
    /// stops.
    ///
    /// The limit is checked between tick batches, so a batch is never split.
    pub fn set_event_limit(mut self, limit: u64) -> Self {
        self.event_limit = Some(limit);

        self
    }

    /// Enables a trace flag.
    pub fn enable_trace_flag(mut self, flag: &str) -> Self {
        self.flags.enable(flag);

        self
    }

    /// Replaces the set of enabled trace flags.
    pub fn set_trace_flags(mut self, flags: TraceFlags) -> Self {
        self.flags = flags;

        self
    }

    /// Collects trace lines in the provided buffer in addition to emitting
    /// them as `tracing` events.
    pub fn set_trace_buffer(mut self, buffer: TraceBuffer) -> Self {
        self.buffer = Some(buffer);

        self
    }

    /// Applies a run configuration.
    ///
    /// Limits set in the configuration override limits set previously, and
    /// its trace flags are enabled in addition to those already enabled.
    pub fn with_config(mut self, config: &SimConfig) -> Self {
        if let Some(limit) = config.tick_limit {
            self.tick_limit = Some(limit);
        }
        if let Some(limit) = config.event_limit {
            self.event_limit = Some(limit);
        }
        for flag in &config.trace_flags {
            self.flags.enable(flag);
        }

        self
    }

    /// Builds a simulation at tick zero, executing the
    /// [`Component::init()`] hook of all components.
    ///
    /// Events cannot be scheduled from `init()`.
    pub fn init(self) -> Result<Simulation, ExecutionError> {
        let tracer = Tracer {
            flags: self.flags,
            buffer: self.buffer,
        };
        let state = Rc::new(RefCell::new(SimState::new(tracer)));
        let scheduler = Scheduler::new(state.clone());

        for component in &self.components {
            panic::catch_unwind(AssertUnwindSafe(|| component.init(&scheduler))).map_err(
                |payload| {
                    state.borrow_mut().clock.phase = Phase::Stopped;

                    ExecutionError::Panic {
                        origin: format!("{}.init", component.name()),
                        payload,
                    }
                },
            )?;
        }
        state.borrow_mut().clock.phase = Phase::Ready;

        tracing::debug!(
            components = self.components.len(),
            events = state.borrow().queue.registered_count(),
            "simulation initialized"
        );

        Ok(Simulation::new(
            scheduler,
            self.components,
            self.tick_limit,
            self.event_limit,
        ))
    }
}

impl Default for SimInit {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimInit")
            .field("components", &self.components.len())
            .field("tick_limit", &self.tick_limit)
            .field("event_limit", &self.event_limit)
            .finish_non_exhaustive()
    }
}
