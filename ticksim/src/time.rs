//! Simulation time.
//!
//! Simulation time is a purely logical quantity measured in ticks. It has no
//! relation to wall-clock time: it only moves forward when the simulation
//! driver advances to the tick of the next pending event.
//!
//! This module provides:
//!
//! * [`Tick`]: an absolute point in simulation time,
//! * [`Delay`]: a tick count relative to the current simulation time,
//! * [`Deadline`]: a trait abstracting over the two, accepted by all
//!   scheduling methods.
//!
//! # Examples
//!
//! ```
//! use ticksim::time::{Deadline, Delay, Tick};
//!
//! let now = Tick::new(1_000);
//!
//! assert_eq!(Delay(500).into_tick(now), Some(Tick::new(1_500)));
//! assert_eq!(Tick::new(42).into_tick(now), Some(Tick::new(42)));
//! assert_eq!(Delay(1).into_tick(Tick::MAX), None);
//! ```

mod tick;

pub use tick::{Delay, Tick};

/// Trait abstracting over tick-absolute and tick-relative deadlines.
///
/// This trait is implemented by [`Tick`] and [`Delay`].
pub trait Deadline {
    /// Converts the deadline to an absolute tick given the current tick.
    ///
    /// `None` is returned if the resulting tick cannot be represented.
    fn into_tick(self, now: Tick) -> Option<Tick>;
}

impl Deadline for Tick {
    #[inline(always)]
    fn into_tick(self, _: Tick) -> Option<Tick> {
        Some(self)
    }
}

impl Deadline for Delay {
    #[inline(always)]
    fn into_tick(self, now: Tick) -> Option<Tick> {
        now.checked_add(self)
    }
}
