//! Rewind Core -- Bounded history storage and discrete simulation ticks.
//!
//! This crate provides the two leaf building blocks of the rewind engine:
//!
//! - [`HistoryBuffer`](history::HistoryBuffer): a fixed-capacity circular
//!   buffer with overwrite-on-full semantics, used both for the global tick
//!   history and for every recorder's snapshot history. Its eviction policy
//!   is what keeps memory bounded regardless of how long a session records.
//! - [`Tick`](tick::Tick): one indexed step of simulated time, together with
//!   the pure sequencing function that derives the next tick from an elapsed
//!   duration.
//!
//! # Quick Start
//!
//! ```
//! use rewind_core::prelude::*;
//!
//! let mut history = HistoryBuffer::with_capacity(3);
//! let mut tick = Tick::ORIGIN;
//!
//! for _ in 0..5 {
//!     tick = tick.advance(0.5);
//!     history.push(tick);
//! }
//!
//! // Only the newest three ticks survive.
//! let indices: Vec<i64> = history.iter().map(|t| t.index).collect();
//! assert_eq!(indices, vec![2, 3, 4]);
//! assert_eq!(history.peek().unwrap().timestamp, 2.5);
//! ```

#![deny(unsafe_code)]

pub mod history;
pub mod tick;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by history buffer access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// A removal or peek was attempted on an empty history.
    #[error("cannot {operation} from an empty history")]
    Empty {
        /// The operation that was attempted (`"pop"`, `"dequeue"`, `"peek"`).
        operation: &'static str,
    },

    /// An indexed access fell outside the logical range of the history.
    #[error("history index {index} out of range (len {len})")]
    OutOfRange {
        /// The requested logical index.
        index: usize,
        /// The number of items stored at the time of access.
        len: usize,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::history::{HistoryBuffer, Iter};
    pub use crate::tick::Tick;
    pub use crate::HistoryError;
}
