//! A deterministic, tick-driven discrete-event simulation kernel.
//!
//! Ticksim is the event-scheduling core of a system simulator: it keeps a
//! single global clock measured in integer ticks and an ordered queue of
//! pending events, and repeatedly advances the clock to the earliest pending
//! event and executes it. Simulated components register named events with
//! the kernel and schedule them at future ticks, which is how all simulated
//! behavior is driven forward.
//!
//! Execution is single-threaded and fully deterministic: events targeting the
//! same tick are ordered by a small signed [priority](simulation::Priority)
//! and then by scheduling order, so two runs of the same simulation always
//! execute the same events in the same order.
//!
//! # A practical overview
//!
//! Running a simulation typically involves three activities:
//!
//! 1. the design of components, which own events and react to them,
//! 2. the assembly of a simulation from a set of components,
//! 3. the execution of the simulation, possibly interrupted at a safe point to
//!    take a checkpoint.
//!
//! ## Authoring components
//!
//! A component is any type implementing the [`Component`](component::Component)
//! trait. Its lifecycle hooks receive a [`Context`](component::Context) that is
//! used to register events bound to the component, to schedule them, and to
//! emit trace lines.
//!
//! ```
//! use ticksim::component::{Component, Context};
//! use ticksim::simulation::EventId;
//! use ticksim::time::Delay;
//!
//! pub struct Blinker {
//!     period: Delay,
//!     on: bool,
//!     toggle: Option<EventId>,
//! }
//!
//! impl Blinker {
//!     fn toggle(&mut self, cx: &Context<Self>) {
//!         self.on = !self.on;
//!         cx.trace("Blink", format_args!("light is {}", if self.on { "on" } else { "off" }));
//!         if let Some(event) = self.toggle {
//!             cx.scheduler().schedule(event, self.period).unwrap();
//!         }
//!     }
//! }
//!
//! impl Component for Blinker {
//!     fn init(&mut self, cx: &Context<Self>) {
//!         self.toggle = Some(cx.create_event("toggle", Self::toggle).unwrap());
//!     }
//!
//!     fn startup(&mut self, cx: &Context<Self>) {
//!         if !cx.is_restored() {
//!             cx.scheduler().schedule(self.toggle.unwrap(), self.period).unwrap();
//!         }
//!     }
//! }
//! ```
//!
//! ## Assembling and running simulations
//!
//! Components are moved into a [`SimInit`](simulation::SimInit) builder
//! together with a [`Slot`](component::Slot) from which addresses can be
//! obtained, then the simulation is built and run.
//!
//! ```
//! # use ticksim::component::{Component, Context};
//! # use ticksim::simulation::EventId;
//! # use ticksim::time::Delay;
//! # pub struct Blinker { period: Delay, on: bool, toggle: Option<EventId> }
//! # impl Blinker {
//! #     fn toggle(&mut self, cx: &Context<Self>) {
//! #         self.on = !self.on;
//! #         cx.trace("Blink", format_args!("light is {}", if self.on { "on" } else { "off" }));
//! #         if let Some(event) = self.toggle {
//! #             cx.scheduler().schedule(event, self.period).unwrap();
//! #         }
//! #     }
//! # }
//! # impl Component for Blinker {
//! #     fn init(&mut self, cx: &Context<Self>) {
//! #         self.toggle = Some(cx.create_event("toggle", Self::toggle).unwrap());
//! #     }
//! #     fn startup(&mut self, cx: &Context<Self>) {
//! #         cx.scheduler().schedule(self.toggle.unwrap(), self.period).unwrap();
//! #     }
//! # }
//! use ticksim::component::Slot;
//! use ticksim::simulation::{ExitReason, SimInit};
//! use ticksim::time::Tick;
//! use ticksim::trace::TraceBuffer;
//!
//! let blinker = Blinker { period: Delay(10), on: false, toggle: None };
//! let blinker_slot = Slot::new();
//! let blinker_addr = blinker_slot.address();
//!
//! let trace = TraceBuffer::new();
//! let mut simu = SimInit::new()
//!     .add_component(blinker, blinker_slot, "blinker")
//!     .enable_trace_flag("Blink")
//!     .set_trace_buffer(trace.clone())
//!     .set_tick_limit(Tick::new(25))
//!     .init()
//!     .unwrap();
//!
//! let outcome = simu.run().unwrap();
//! assert_eq!(outcome.reason, ExitReason::TickLimit);
//! assert_eq!(simu.cur_tick(), Tick::new(25));
//! assert_eq!(blinker_addr.with(|b| b.on), Some(false));
//! assert_eq!(
//!     trace.lines(),
//!     vec!["10: blinker: light is on", "20: blinker: light is off"]
//! );
//! ```
//!
//! ## Checkpoints
//!
//! Once the main loop has returned, the simulation can be drained to obtain a
//! [`Checkpoint`](simulation::Checkpoint) of the clock and of all pending
//! events. The checkpoint can be encoded to CBOR and later restored into a
//! freshly built simulation with the same components.
//!
//! # Modules documentation
//!
//! * the [`simulation`] module describes the simulation lifecycle, the event
//!   processing semantics and the scheduling API,
//! * the [`component`] module discusses component hooks, events and
//!   addresses,
//! * the [`trace`] module describes named-flag trace output,
//! * the [`time`] module defines ticks and delays.
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod component;
pub mod simulation;
pub mod time;
pub mod trace;
#[cfg(feature = "tracing")]
pub mod tracing;
pub(crate) mod util;
