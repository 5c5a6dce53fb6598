//! Discrete simulation ticks and tick sequencing.
//!
//! A [`Tick`] is an immutable record of one simulation step: its index, the
//! duration of that single step, and the accumulated timestamp. Ticks are
//! produced by [`Tick::advance`], a pure function of the previous tick and
//! the elapsed duration. Sequencing starts from [`Tick::ORIGIN`] (index `-1`)
//! so the first captured tick has index `0`.
//!
//! Time is accumulated from per-step deltas rather than derived from a fixed
//! rate, so variable frame rates are represented exactly as they occurred.
//!
//! # Example
//!
//! ```
//! use rewind_core::tick::Tick;
//!
//! let first = Tick::ORIGIN.advance(0.25);
//! let second = first.advance(0.5);
//!
//! assert_eq!(first.index, 0);
//! assert_eq!(second.index, 1);
//! assert_eq!(second.delta, 0.5);
//! assert_eq!(second.timestamp, 0.75);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// One indexed step of simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Monotonic step index. `-1` before the first capture.
    pub index: i64,
    /// Duration of this single step in seconds.
    pub delta: f64,
    /// Sum of all step durations up to and including this one.
    pub timestamp: f64,
}

impl Tick {
    /// The tick that precedes the first capture.
    pub const ORIGIN: Tick = Tick::new(-1, 0.0, 0.0);

    /// Index zero with no elapsed time.
    pub const ZERO: Tick = Tick::new(0, 0.0, 0.0);

    /// Sentinel meaning "never". Compares greater than every real tick.
    pub const MAX: Tick = Tick::new(i64::MAX, f64::MAX, f64::MAX);

    /// Construct a tick from its raw parts.
    pub const fn new(index: i64, delta: f64, timestamp: f64) -> Self {
        Self {
            index,
            delta,
            timestamp,
        }
    }

    /// Produce the tick that follows `self` after `elapsed` seconds.
    pub fn advance(&self, elapsed: f64) -> Tick {
        Tick {
            index: self.index + 1,
            delta: elapsed,
            timestamp: self.timestamp + elapsed,
        }
    }

    /// Returns `true` for the [`Tick::MAX`] sentinel.
    pub fn is_max(&self) -> bool {
        self.index == i64::MAX
    }
}

impl Default for Tick {
    /// Defaults to [`Tick::ORIGIN`].
    fn default() -> Self {
        Self::ORIGIN
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[index: {} | delta: {} | timestamp: {}]",
            self.index, self.delta, self.timestamp
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
