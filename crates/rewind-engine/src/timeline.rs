//! The timeline controller.
//!
//! [`Timeline`] owns the canonical tick history and the Live/Paused state
//! machine. Each frame the host calls [`Timeline::step`]; while live this
//! produces the next [`Tick`], evicts ticks that left the retention window,
//! and broadcasts Capture so every attached recorder records its state.
//!
//! While paused the host scrubs with [`Timeline::seek`], which moves the
//! anchor to the nearest recorded tick and broadcasts Replicate. Resuming
//! broadcasts Simulate at the anchor and then discards every tick after it,
//! so the abandoned future is gone for good.
//!
//! ```text
//!            step (records)                  seek (replicates)
//!          +----------------+              +-----------------+
//!          v                |              v                 |
//!       +------+  pause  +--------+     +--------+           |
//!  ---> | Live | ------> | Paused | --> | Paused | ----------+
//!       +------+         +--------+     +--------+
//!          ^                                 |
//!          +------ resume (rolls back) ------+
//! ```
//!
//! # Example
//!
//! ```
//! use rewind_engine::prelude::*;
//!
//! let config = RewindConfig { max_ticks_per_second: 10, max_record_duration: 1.0 };
//! let mut timeline = Timeline::new(config).unwrap();
//!
//! for _ in 0..10 {
//!     timeline.step(0.1).unwrap();
//! }
//! timeline.pause().unwrap();
//!
//! let tick = timeline.seek(0.42).unwrap();
//! assert_eq!(tick.index, 3);
//!
//! timeline.resume().unwrap();
//! assert_eq!(timeline.tick_count(), 4);
//! assert_eq!(timeline.history().peek().unwrap().index, 3);
//! ```

use rewind_core::history::HistoryBuffer;
use rewind_core::tick::Tick;
use serde::{Deserialize, Serialize};

use crate::config::RewindConfig;
use crate::dispatch::{Attached, Channel, ChannelSet, Dispatcher};
use crate::lifetime::TimeEntity;
use crate::recorder::{Rewindable, SnapshotRecorder};
use crate::RewindError;

/// Minimum number of recorded ticks before the timeline may pause.
pub const MIN_TICKS_TO_PAUSE: usize = 2;

// ---------------------------------------------------------------------------
// TimelineState
// ---------------------------------------------------------------------------

/// Whether the timeline is recording or scrubbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimelineState {
    /// Recording a new tick every step.
    #[default]
    Live,
    /// Recording suspended; seeking allowed.
    Paused,
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// Canonical tick history plus the Live/Paused state machine.
#[derive(Debug)]
pub struct Timeline {
    config: RewindConfig,
    state: TimelineState,
    anchor: Tick,
    history: HistoryBuffer<Tick>,
    dispatcher: Dispatcher,
}

impl Timeline {
    /// Create a live timeline with an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: RewindConfig) -> Result<Self, RewindError> {
        config.validate()?;
        let history = HistoryBuffer::with_capacity(config.capacity());
        Ok(Self {
            config,
            state: TimelineState::Live,
            anchor: Tick::ORIGIN,
            history,
            dispatcher: Dispatcher::new(),
        })
    }

    // -- queries ------------------------------------------------------------

    /// Current state.
    pub fn state(&self) -> TimelineState {
        self.state
    }

    /// Returns `true` while recording.
    pub fn is_live(&self) -> bool {
        self.state == TimelineState::Live
    }

    /// Returns `true` while paused.
    pub fn is_paused(&self) -> bool {
        self.state == TimelineState::Paused
    }

    /// The tick currently treated as "now". While paused this is the last
    /// sought tick.
    pub fn anchor(&self) -> Tick {
        self.anchor
    }

    /// Number of retained ticks.
    pub fn tick_count(&self) -> usize {
        self.history.len()
    }

    /// Maximum number of retained ticks.
    pub fn capacity(&self) -> usize {
        self.history.capacity()
    }

    /// Retained ticks, oldest first.
    pub fn history(&self) -> &HistoryBuffer<Tick> {
        &self.history
    }

    /// Active configuration.
    pub fn config(&self) -> &RewindConfig {
        &self.config
    }

    /// The event dispatcher. Use it to subscribe custom listeners.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Timestamp of the anchor.
    pub fn max_time(&self) -> f64 {
        self.anchor.timestamp
    }

    /// Earliest timestamp that can be sought to.
    ///
    /// The greater of the oldest retained timestamp and
    /// `max_time - max_record_duration`. Equal to [`max_time`](Self::max_time)
    /// when nothing is retained.
    pub fn min_time(&self) -> f64 {
        let max_time = self.max_time();
        match self.history.oldest() {
            Some(oldest) => oldest
                .timestamp
                .max(max_time - self.config.max_record_duration),
            None => max_time,
        }
    }

    /// Simulation time scale: `1.0` live, `0.0` paused.
    pub fn scale(&self) -> f64 {
        match self.state {
            TimelineState::Live => 1.0,
            TimelineState::Paused => 0.0,
        }
    }

    /// BLAKE3 hex digest of the retained tick history.
    ///
    /// Pausing and seeking never change it. Only stepping, resuming, and
    /// reconfiguring do.
    pub fn history_hash(&self) -> String {
        #[derive(Serialize)]
        struct HashableHistory<'a> {
            capacity: usize,
            ticks: Vec<&'a Tick>,
        }

        let hashable = HashableHistory {
            capacity: self.history.capacity(),
            ticks: self.history.iter().collect(),
        };

        let json_bytes = serde_json::to_vec(&hashable)
            .expect("tick history should always be JSON-serializable");

        blake3::hash(&json_bytes).to_hex().to_string()
    }

    // -- attachment ---------------------------------------------------------

    /// Wrap `target` in a recorder sized to this timeline, anchored at the
    /// current anchor and subscribed to every channel.
    ///
    /// Dropping the returned handle unsubscribes the recorder.
    pub fn attach<R>(&self, target: R) -> Attached<SnapshotRecorder<R>>
    where
        R: Rewindable + 'static,
    {
        let recorder = SnapshotRecorder::new(target, self.capacity(), self.anchor);
        self.dispatcher.attach(recorder, ChannelSet::ALL)
    }

    /// Create a lifetime recorder for an entity spawned at the current
    /// anchor.
    pub fn attach_entity(&self) -> Attached<TimeEntity> {
        let entity = TimeEntity::new(self.anchor, self.capacity());
        self.dispatcher.attach(entity, ChannelSet::ALL)
    }

    // -- transitions --------------------------------------------------------

    /// Advance one frame by `elapsed` seconds.
    ///
    /// While live, records and returns the new tick. While paused, returns
    /// `Ok(None)` and does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::InvalidDelta`] if `elapsed` is negative or not
    /// finite, and [`RewindError::ListenerBusy`] if a recorder is borrowed
    /// while live.
    pub fn step(&mut self, elapsed: f64) -> Result<Option<Tick>, RewindError> {
        if !(elapsed.is_finite() && elapsed >= 0.0) {
            return Err(RewindError::InvalidDelta { elapsed });
        }
        if self.is_paused() {
            return Ok(None);
        }
        self.dispatcher
            .ensure_available(ChannelSet::of(Channel::Capture).with(Channel::Discard))?;

        self.anchor = self.anchor.advance(elapsed);

        if self.history.is_full() {
            if let Some(evicted) = self.history.try_dequeue() {
                self.discard(&evicted);
            }
        }

        let horizon = self.anchor.timestamp - self.config.max_record_duration;
        while let Some(&oldest) = self.history.oldest() {
            if oldest.timestamp > horizon {
                break;
            }
            self.history.try_dequeue();
            self.discard(&oldest);
        }

        tracing::trace!(tick = %self.anchor, "capture");
        self.dispatcher.capture(&self.anchor);
        self.history.push(self.anchor);

        Ok(Some(self.anchor))
    }

    /// Stop recording.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::AlreadyPaused`] if already paused,
    /// [`RewindError::NotEnoughTicks`] if fewer than
    /// [`MIN_TICKS_TO_PAUSE`] ticks are retained, and
    /// [`RewindError::ListenerBusy`] if a pause listener is borrowed.
    pub fn pause(&mut self) -> Result<(), RewindError> {
        if self.is_paused() {
            return Err(RewindError::AlreadyPaused);
        }
        if self.history.len() < MIN_TICKS_TO_PAUSE {
            return Err(RewindError::NotEnoughTicks {
                recorded: self.history.len(),
                required: MIN_TICKS_TO_PAUSE,
            });
        }
        self.dispatcher.ensure_available(ChannelSet::of(Channel::Pause))?;

        self.state = TimelineState::Paused;
        tracing::debug!(anchor = %self.anchor, "timeline paused");
        self.dispatcher.pause();
        Ok(())
    }

    /// Resume recording from the anchor, discarding every later tick.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::NotPaused`] while live and
    /// [`RewindError::ListenerBusy`] if a listener that must roll back is
    /// borrowed. Either way nothing is rolled back.
    pub fn resume(&mut self) -> Result<(), RewindError> {
        if self.is_live() {
            return Err(RewindError::NotPaused {
                operation: "resume",
            });
        }
        self.dispatcher.ensure_available(
            ChannelSet::of(Channel::Resume)
                .with(Channel::Simulate)
                .with(Channel::Discard),
        )?;

        self.state = TimelineState::Live;
        tracing::debug!(anchor = %self.anchor, "timeline resumed");
        self.dispatcher.resume();
        self.rollback();
        Ok(())
    }

    /// Move the anchor to the retained tick nearest `timestamp` and
    /// replicate it.
    ///
    /// Timestamps outside the retained range clamp to the nearest end. When
    /// two ticks are equally near, the older one is chosen.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::NotPaused`] while live,
    /// [`RewindError::InvalidTimestamp`] for NaN or infinite input, and
    /// [`RewindError::NoTicks`] if nothing is retained, and
    /// [`RewindError::ListenerBusy`] if a replicating listener is borrowed.
    pub fn seek(&mut self, timestamp: f64) -> Result<Tick, RewindError> {
        if self.is_live() {
            return Err(RewindError::NotPaused { operation: "seek" });
        }
        if !timestamp.is_finite() {
            return Err(RewindError::InvalidTimestamp { timestamp });
        }
        let position = self
            .nearest(timestamp)
            .ok_or(RewindError::NoTicks { timestamp })?;
        let tick = *self.history.at(position)?;
        self.dispatcher
            .ensure_available(ChannelSet::of(Channel::Replicate))?;

        self.anchor = tick;
        tracing::debug!(requested = timestamp, tick = %tick, "seek");
        self.dispatcher.replicate(&tick);
        Ok(tick)
    }

    /// Apply a new retention window.
    ///
    /// Ticks that no longer fit are discarded oldest first. Attached
    /// recorders keep their capacity until
    /// [`SnapshotRecorder::set_capacity`] is called on them.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::InvalidConfig`] if `config` fails validation
    /// and [`RewindError::ListenerBusy`] if ticks must be discarded while a
    /// listener is borrowed; the timeline is left unchanged.
    pub fn reconfigure(&mut self, config: RewindConfig) -> Result<(), RewindError> {
        config.validate()?;
        let capacity = config.capacity();
        if self.history.len() > capacity {
            self.dispatcher
                .ensure_available(ChannelSet::of(Channel::Discard))?;
        }

        while self.history.len() > capacity {
            match self.history.try_dequeue() {
                Some(evicted) => self.discard(&evicted),
                None => break,
            }
        }
        self.history.resize(capacity);
        tracing::debug!(capacity, "timeline reconfigured");
        self.config = config;
        Ok(())
    }

    // -- internals ----------------------------------------------------------

    fn discard(&self, tick: &Tick) {
        tracing::trace!(tick = %tick, "discard");
        self.dispatcher.discard(tick);
    }

    /// Broadcast Simulate at the anchor, then drop the abandoned future.
    fn rollback(&mut self) {
        let anchor = self.anchor;
        self.dispatcher.simulate(&anchor);

        let mut discarded = 0usize;
        while self
            .history
            .try_peek()
            .is_some_and(|newest| newest.index > anchor.index)
        {
            if let Some(abandoned) = self.history.try_pop() {
                self.discard(&abandoned);
                discarded += 1;
            }
        }
        tracing::debug!(anchor = %anchor, discarded, "rolled back");
    }

    /// Position of the retained tick whose timestamp is nearest `timestamp`.
    fn nearest(&self, timestamp: f64) -> Option<usize> {
        let first = self.history.oldest()?;
        let last = self.history.try_peek()?;
        let last_position = self.history.len() - 1;

        if timestamp <= first.timestamp {
            return Some(0);
        }
        if timestamp >= last.timestamp {
            return Some(last_position);
        }

        // first.timestamp < timestamp < last.timestamp, so `upper` lands in
        // 1..=last_position.
        let upper = self
            .history
            .partition_point(|tick| tick.timestamp < timestamp);
        let above = self.history.get(upper)?.timestamp;
        if above == timestamp {
            return Some(upper);
        }
        let lower = upper - 1;
        let below = self.history.get(lower)?.timestamp;

        if above - timestamp < timestamp - below {
            Some(upper)
        } else {
            Some(lower)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
