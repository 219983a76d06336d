use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// An absolute point in simulation time.
///
/// Ticks are unsigned and start at [`Tick::ZERO`] at the beginning of each
/// simulation run. Within a run, the current tick never decreases.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tick(u64);

impl Tick {
    /// The tick at which every simulation run starts.
    pub const ZERO: Self = Self(0);

    /// The largest representable tick.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a tick from a raw tick count.
    #[inline]
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Returns the raw tick count.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Adds a delay, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, delay: Delay) -> Option<Self> {
        match self.0.checked_add(delay.0) {
            Some(ticks) => Some(Self(ticks)),
            None => None,
        }
    }

    /// Returns the delay elapsed since an earlier tick, or `None` if `earlier`
    /// is actually later than `self`.
    #[inline]
    pub const fn checked_delay_since(self, earlier: Tick) -> Option<Delay> {
        match self.0.checked_sub(earlier.0) {
            Some(ticks) => Some(Delay(ticks)),
            None => None,
        }
    }
}

impl From<u64> for Tick {
    fn from(ticks: u64) -> Self {
        Self(ticks)
    }
}

impl Add<Delay> for Tick {
    type Output = Tick;

    /// Adds a delay to a tick.
    ///
    /// # Panics
    ///
    /// This function panics if the resulting tick cannot be represented.
    fn add(self, delay: Delay) -> Self::Output {
        self.checked_add(delay)
            .expect("overflow when adding a delay to a tick")
    }
}

impl Sub<Tick> for Tick {
    type Output = Delay;

    /// Returns the delay between two ticks.
    ///
    /// # Panics
    ///
    /// This function panics if the right-hand side is later than the left-hand
    /// side.
    fn sub(self, earlier: Tick) -> Self::Output {
        self.checked_delay_since(earlier)
            .expect("overflow when subtracting ticks")
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A number of ticks relative to the current simulation time.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Delay(pub u64);

impl Delay {
    /// A null delay.
    pub const ZERO: Self = Self(0);

    /// Returns `true` if the delay is null.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}
