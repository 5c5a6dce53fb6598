//! Rewind Engine -- Record, pause, seek, and roll back a live simulation.
//!
//! This crate builds on [`rewind_core`] to provide the time-travel layer that
//! sits between a frame-stepped simulation loop and arbitrary per-object
//! state:
//!
//! - [`Timeline`](timeline::Timeline) owns the tick history, tracks the
//!   Live/Paused state, and decides which events fire each step.
//! - [`Dispatcher`](dispatch::Dispatcher) fans tick-scoped events out to every
//!   registered listener.
//! - [`SnapshotRecorder`](recorder::SnapshotRecorder) records one
//!   participant's state history with change compression and answers "what
//!   was my state at tick T".
//!
//! # Quick Start
//!
//! ```
//! use rewind_engine::prelude::*;
//!
//! let config = RewindConfig { max_ticks_per_second: 60, max_record_duration: 10.0 };
//! let mut timeline = Timeline::new(config).unwrap();
//!
//! // A participant: a click counter recorded through a variable cell.
//! let clicks = timeline.attach(Variable::new(0u32));
//!
//! for frame in 0..30 {
//!     if frame % 10 == 0 {
//!         clicks.borrow_mut().target_mut().set(frame / 10 + 1);
//!     }
//!     timeline.step(1.0 / 60.0).unwrap();
//! }
//! assert_eq!(*clicks.borrow().target().get(), 3);
//!
//! // Scrub back to the start and resume from there.
//! timeline.pause().unwrap();
//! timeline.seek(0.0).unwrap();
//! timeline.resume().unwrap();
//! assert_eq!(*clicks.borrow().target().get(), 1);
//! assert_eq!(timeline.anchor().index, 0);
//! ```

#![deny(unsafe_code)]

pub mod change;
pub mod config;
pub mod dispatch;
pub mod lifetime;
pub mod physics;
pub mod recorder;
pub mod timeline;
pub mod variable;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the core crate for convenience.
pub use rewind_core;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by timeline operations and configuration.
///
/// Every rejected operation leaves the timeline and all recorders untouched.
#[derive(Debug, thiserror::Error)]
pub enum RewindError {
    /// Pause was requested before enough ticks were recorded to scrub.
    #[error("cannot pause: at least {required} ticks must be recorded, found {recorded}")]
    NotEnoughTicks {
        /// Ticks currently retained in the history.
        recorded: usize,
        /// Minimum number of ticks required.
        required: usize,
    },

    /// Pause was requested while already paused.
    #[error("timeline is already paused")]
    AlreadyPaused,

    /// An operation that requires a paused timeline was called while live.
    #[error("timeline is live -- {operation} requires a paused timeline")]
    NotPaused {
        /// The rejected operation (`"seek"`, `"resume"`).
        operation: &'static str,
    },

    /// Seek was requested but no ticks are retained.
    #[error("no retained ticks to seek to (requested t={timestamp})")]
    NoTicks {
        /// The requested timestamp.
        timestamp: f64,
    },

    /// Seek was requested with a NaN or infinite timestamp.
    #[error("seek timestamp must be finite, got {timestamp}")]
    InvalidTimestamp {
        /// The rejected timestamp.
        timestamp: f64,
    },

    /// A step was requested with a negative or non-finite elapsed duration.
    #[error("step duration must be finite and non-negative, got {elapsed}")]
    InvalidDelta {
        /// The rejected duration in seconds.
        elapsed: f64,
    },

    /// A subscribed listener is borrowed by the host and cannot receive the
    /// events the operation would broadcast.
    #[error("listener {listener} is borrowed elsewhere; release it before driving the timeline")]
    ListenerBusy {
        /// Registration id of the busy listener.
        listener: u64,
    },

    /// The configuration failed validation.
    #[error("invalid rewind configuration: {0}")]
    InvalidConfig(String),

    /// The configuration could not be parsed.
    #[error("failed to parse rewind configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A history access failed.
    #[error(transparent)]
    History(#[from] rewind_core::HistoryError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the core prelude.
    pub use rewind_core::prelude::*;

    pub use crate::change::{Angle, Changed};
    pub use crate::config::RewindConfig;
    pub use crate::dispatch::{Attached, Channel, ChannelSet, Dispatcher, Subscription, TickListener};
    pub use crate::lifetime::{Activity, SpawnState, TimeEntity};
    pub use crate::recorder::{ApplySource, Rewindable, Snapshot, SnapshotRecorder};
    pub use crate::timeline::{Timeline, TimelineState, MIN_TICKS_TO_PAUSE};
    pub use crate::variable::Variable;
    pub use crate::RewindError;

    // Physics types.
    pub use crate::physics::{
        BodyId, BodyState, ColliderShape, CollisionPair, PhysicsBody, PhysicsBodyType,
        PhysicsWorld, Position, RigidBodyTarget, Velocity,
    };
}
