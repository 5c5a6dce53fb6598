//! Per-participant snapshot history.
//!
//! A [`SnapshotRecorder`] wraps one [`Rewindable`] target and keeps a
//! bounded, tick-ordered history of its captured states. It answers the
//! question "what was my state at tick T" with a predecessor search: the
//! newest snapshot whose tick is `<= T`. Because a recorder only stores a
//! snapshot when the target's state actually changed, the predecessor is the
//! state that was in effect at T even when T itself was never stored.
//!
//! # Protocol
//!
//! | event           | effect                                                     |
//! |-----------------|------------------------------------------------------------|
//! | `capture(T)`    | store the target state at `T` if it differs from the newest |
//! | `replicate(T)`  | apply the predecessor of `T` as [`ApplySource::Replication`] |
//! | `rollback(T)`   | drop every snapshot newer than `T`                          |
//! | `simulate(T)`   | roll back to `T`, apply the newest remaining as [`ApplySource::Simulate`] |
//!
//! Replication is read-only with respect to the snapshot history; only
//! capture and rollback mutate it.
//!
//! # Example
//!
//! ```
//! use rewind_engine::recorder::{ApplySource, Rewindable, SnapshotRecorder};
//! use rewind_engine::rewind_core::tick::Tick;
//!
//! struct Health(u32);
//!
//! impl Rewindable for Health {
//!     type State = u32;
//!     fn capture_state(&self) -> u32 { self.0 }
//!     fn apply_state(&mut self, state: &u32, _source: ApplySource) { self.0 = *state; }
//!     fn has_changed(&self, previous: &u32, current: &u32) -> bool { previous != current }
//! }
//!
//! let mut recorder = SnapshotRecorder::new(Health(100), 16, Tick::ORIGIN);
//! let mut tick = Tick::ORIGIN;
//! for hp in [100, 100, 80, 80, 50] {
//!     tick = tick.advance(0.1);
//!     recorder.target_mut().0 = hp;
//!     recorder.capture(&tick);
//! }
//! // Only the three distinct values were stored.
//! assert_eq!(recorder.len(), 3);
//!
//! // Tick 3 was never stored; its predecessor (tick 2) holds 80.
//! assert_eq!(recorder.lookup(3).map(|s| s.state), Some(80));
//! ```

use std::fmt;

use rewind_core::history::HistoryBuffer;
use rewind_core::tick::Tick;
use serde::{Deserialize, Serialize};

use crate::dispatch::TickListener;

// ---------------------------------------------------------------------------
// Rewindable
// ---------------------------------------------------------------------------

/// Why a snapshot is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplySource {
    /// Cosmetic display while paused. Must not restore simulation-only state
    /// such as velocities.
    Replication,
    /// Authoritative restore before live simulation resumes.
    Simulate,
}

/// Something whose state can be captured and restored per tick.
pub trait Rewindable {
    /// Opaque per-participant state.
    type State: Clone;

    /// Read the current state. Must not mutate the target.
    fn capture_state(&self) -> Self::State;

    /// Restore `state`. `source` distinguishes cosmetic scrubbing from the
    /// authoritative restore on resume.
    fn apply_state(&mut self, state: &Self::State, source: ApplySource);

    /// Whether `current` differs enough from `previous` to be stored.
    /// Defaults to always storing.
    fn has_changed(&self, _previous: &Self::State, _current: &Self::State) -> bool {
        true
    }

    /// The timeline paused.
    fn on_pause(&mut self) {}

    /// The timeline resumed.
    fn on_resume(&mut self) {}

    /// `tick` permanently left the retention window.
    fn on_discard(&mut self, _tick: &Tick) {}
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One stored state, tagged with the index of the tick it was captured at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    /// Index of the capturing tick.
    pub tick: i64,
    /// The captured state.
    pub state: S,
}

// ---------------------------------------------------------------------------
// SnapshotRecorder
// ---------------------------------------------------------------------------

/// Records one target's state history and replays it on demand.
pub struct SnapshotRecorder<R: Rewindable> {
    target: R,
    snapshots: HistoryBuffer<Snapshot<R::State>>,
    anchor: Tick,
}

impl<R: Rewindable> SnapshotRecorder<R> {
    /// Create a recorder holding at most `capacity` snapshots, mirroring the
    /// timeline anchor `anchor`.
    pub fn new(target: R, capacity: usize, anchor: Tick) -> Self {
        Self {
            target,
            snapshots: HistoryBuffer::with_capacity(capacity),
            anchor,
        }
    }

    // -- accessors ----------------------------------------------------------

    /// The recorded target.
    pub fn target(&self) -> &R {
        &self.target
    }

    /// Mutable access to the recorded target.
    pub fn target_mut(&mut self) -> &mut R {
        &mut self.target
    }

    /// Consume the recorder and return its target.
    pub fn into_target(self) -> R {
        self.target
    }

    /// Stored snapshots, oldest first.
    pub fn snapshots(&self) -> &HistoryBuffer<Snapshot<R::State>> {
        &self.snapshots
    }

    /// The last tick this recorder captured at or rolled back to.
    pub fn anchor(&self) -> Tick {
        self.anchor
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns `true` if no snapshot is stored.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Maximum number of stored snapshots.
    pub fn capacity(&self) -> usize {
        self.snapshots.capacity()
    }

    /// Resize the snapshot history, keeping the newest entries.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.snapshots.resize(capacity);
    }

    // -- protocol -----------------------------------------------------------

    /// Capture the target state at `tick`.
    ///
    /// Returns `true` if a snapshot was stored, `false` if the state was
    /// unchanged since the newest stored snapshot.
    pub fn capture(&mut self, tick: &Tick) -> bool {
        let state = self.target.capture_state();

        // Ticks only move forward while live. A stored entry at or after this
        // tick means the host skipped a rollback.
        let mut repaired = 0usize;
        while self
            .snapshots
            .try_peek()
            .is_some_and(|newest| newest.tick >= tick.index)
        {
            self.snapshots.try_pop();
            repaired += 1;
        }
        if repaired > 0 {
            tracing::warn!(
                tick = tick.index,
                dropped = repaired,
                "recorder held snapshots at or after capture tick, dropped them"
            );
        }

        self.anchor = *tick;

        if let Some(newest) = self.snapshots.try_peek() {
            if !self.target.has_changed(&newest.state, &state) {
                return false;
            }
        }

        self.snapshots.push(Snapshot {
            tick: tick.index,
            state,
        });
        true
    }

    /// The newest snapshot captured at or before `tick_index`.
    ///
    /// Returns `None` if every stored snapshot is newer, or none is stored.
    pub fn lookup(&self, tick_index: i64) -> Option<&Snapshot<R::State>> {
        let position = self.predecessor(tick_index)?;
        self.snapshots.get(position)
    }

    /// Apply the state in effect at `tick` for display.
    ///
    /// Returns `false` without touching the target when nothing was captured
    /// at or before `tick`.
    pub fn replicate(&mut self, tick: &Tick) -> bool {
        let Some(position) = self.predecessor(tick.index) else {
            return false;
        };
        match self.snapshots.get(position) {
            Some(snapshot) => {
                self.target
                    .apply_state(&snapshot.state, ApplySource::Replication);
                true
            }
            None => false,
        }
    }

    /// Drop every snapshot captured after `tick` and move the anchor there.
    ///
    /// Returns the number of snapshots dropped.
    pub fn rollback(&mut self, tick: &Tick) -> usize {
        let mut pruned = 0;
        while self
            .snapshots
            .try_peek()
            .is_some_and(|newest| newest.tick > tick.index)
        {
            self.snapshots.try_pop();
            pruned += 1;
        }
        self.anchor = *tick;
        pruned
    }

    /// Roll back to `tick` and restore the newest remaining snapshot.
    ///
    /// Returns `true` if a snapshot was applied.
    pub fn simulate(&mut self, tick: &Tick) -> bool {
        self.rollback(tick);
        match self.snapshots.try_peek() {
            Some(snapshot) => {
                self.target.apply_state(&snapshot.state, ApplySource::Simulate);
                true
            }
            None => false,
        }
    }

    fn predecessor(&self, tick_index: i64) -> Option<usize> {
        self.snapshots
            .partition_point(|snapshot| snapshot.tick <= tick_index)
            .checked_sub(1)
    }
}

impl<R: Rewindable> TickListener for SnapshotRecorder<R> {
    fn on_capture(&mut self, tick: &Tick) {
        self.capture(tick);
    }

    fn on_discard(&mut self, tick: &Tick) {
        self.target.on_discard(tick);
    }

    fn on_replicate(&mut self, tick: &Tick) {
        self.replicate(tick);
    }

    fn on_simulate(&mut self, tick: &Tick) {
        self.simulate(tick);
    }

    fn on_pause(&mut self) {
        self.target.on_pause();
    }

    fn on_resume(&mut self) {
        self.target.on_resume();
    }
}

impl<R> fmt::Debug for SnapshotRecorder<R>
where
    R: Rewindable + fmt::Debug,
    R::State: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotRecorder")
            .field("target", &self.target)
            .field("snapshots", &self.snapshots)
            .field("anchor", &self.anchor)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// A counter that logs every applied state with its source.
    #[derive(Debug, Default)]
    struct Counter {
        value: i32,
        applied: Vec<(i32, ApplySource)>,
        compress: bool,
        pauses: u32,
        discarded: Vec<i64>,
    }

    impl Rewindable for Counter {
        type State = i32;

        fn capture_state(&self) -> i32 {
            self.value
        }

        fn apply_state(&mut self, state: &i32, source: ApplySource) {
            self.value = *state;
            self.applied.push((*state, source));
        }

        fn has_changed(&self, previous: &i32, current: &i32) -> bool {
            !self.compress || previous != current
        }

        fn on_pause(&mut self) {
            self.pauses += 1;
        }

        fn on_discard(&mut self, tick: &Tick) {
            self.discarded.push(tick.index);
        }
    }

    fn tick(index: i64) -> Tick {
        Tick::new(index, 0.1, 0.1 * (index + 1) as f64)
    }

    /// Capture `values[i]` at tick `i`.
    fn recorded(values: &[i32], compress: bool, capacity: usize) -> SnapshotRecorder<Counter> {
        let counter = Counter {
            compress,
            ..Default::default()
        };
        let mut recorder = SnapshotRecorder::new(counter, capacity, Tick::ORIGIN);
        for (i, &value) in values.iter().enumerate() {
            recorder.target_mut().value = value;
            recorder.capture(&tick(i as i64));
        }
        recorder
    }

    fn stored_ticks(recorder: &SnapshotRecorder<Counter>) -> Vec<i64> {
        recorder.snapshots().iter().map(|s| s.tick).collect()
    }

    // -- 1. Capture ---------------------------------------------------------

    #[test]
    fn uncompressed_capture_stores_every_tick() {
        let recorder = recorded(&[1, 1, 1], false, 8);
        assert_eq!(stored_ticks(&recorder), vec![0, 1, 2]);
        assert_eq!(recorder.anchor().index, 2);
    }

    #[test]
    fn compression_skips_unchanged_states() {
        let recorder = recorded(&[5, 5, 5, 6, 6, 5], true, 8);
        assert_eq!(stored_ticks(&recorder), vec![0, 3, 5]);
        // Anchor still follows every capture.
        assert_eq!(recorder.anchor().index, 5);
    }

    #[test]
    fn capacity_evicts_oldest_snapshots() {
        let recorder = recorded(&[0, 1, 2, 3, 4, 5], true, 3);
        assert_eq!(stored_ticks(&recorder), vec![3, 4, 5]);
    }

    #[test]
    fn capture_at_stale_tick_replaces_newer_entries() {
        let mut recorder = recorded(&[0, 1, 2, 3], false, 8);
        recorder.target_mut().value = 9;
        assert!(recorder.capture(&tick(2)));
        assert_eq!(stored_ticks(&recorder), vec![0, 1, 2]);
        assert_eq!(recorder.lookup(2).map(|s| s.state), Some(9));
    }

    // -- 2. Lookup / replicate ----------------------------------------------

    #[test]
    fn lookup_finds_greatest_tick_not_after_target() {
        let recorder = recorded(&[5, 5, 5, 6, 6, 5], true, 8);
        assert_eq!(recorder.lookup(0).map(|s| s.tick), Some(0));
        assert_eq!(recorder.lookup(2).map(|s| s.tick), Some(0));
        assert_eq!(recorder.lookup(3).map(|s| s.tick), Some(3));
        assert_eq!(recorder.lookup(4).map(|s| s.tick), Some(3));
        assert_eq!(recorder.lookup(100).map(|s| s.tick), Some(5));
    }

    #[test]
    fn lookup_before_oldest_is_none() {
        let recorder = recorded(&[0, 1, 2, 3, 4, 5], true, 3);
        assert!(recorder.lookup(2).is_none());
        assert!(recorder.lookup(-1).is_none());
        assert!(recorded(&[], true, 3).lookup(0).is_none());
    }

    #[test]
    fn replicate_applies_predecessor_without_mutating_history() {
        let mut recorder = recorded(&[10, 20, 30, 40], false, 8);
        assert!(recorder.replicate(&tick(1)));
        assert_eq!(recorder.target().value, 20);
        assert_eq!(
            recorder.target().applied,
            vec![(20, ApplySource::Replication)]
        );
        assert_eq!(stored_ticks(&recorder), vec![0, 1, 2, 3]);
    }

    #[test]
    fn replicate_before_oldest_leaves_target_untouched() {
        let mut recorder = recorded(&[0, 1, 2, 3, 4, 5], true, 3);
        assert!(!recorder.replicate(&tick(1)));
        assert_eq!(recorder.target().value, 5);
        assert!(recorder.target().applied.is_empty());
    }

    // -- 3. Rollback / simulate ---------------------------------------------

    #[test]
    fn rollback_prunes_only_newer_snapshots() {
        let mut recorder = recorded(&[0, 1, 2, 3, 4], false, 8);
        assert_eq!(recorder.rollback(&tick(2)), 2);
        assert_eq!(stored_ticks(&recorder), vec![0, 1, 2]);
        assert_eq!(recorder.anchor().index, 2);
        assert_eq!(recorder.rollback(&tick(2)), 0);
    }

    #[test]
    fn simulate_restores_newest_remaining_state() {
        let mut recorder = recorded(&[5, 5, 6, 6, 7], true, 8);
        assert!(recorder.simulate(&tick(3)));
        assert_eq!(recorder.target().value, 6);
        assert_eq!(
            recorder.target().applied.last(),
            Some(&(6, ApplySource::Simulate))
        );
        assert_eq!(stored_ticks(&recorder), vec![0, 2]);
    }

    #[test]
    fn simulate_with_nothing_left_applies_nothing() {
        let mut recorder = recorded(&[0, 1, 2, 3, 4, 5], true, 3);
        assert!(!recorder.simulate(&tick(1)));
        assert!(recorder.is_empty());
        assert!(recorder.target().applied.is_empty());
    }

    #[test]
    fn capture_after_simulate_continues_from_anchor() {
        let mut recorder = recorded(&[0, 1, 2, 3, 4], false, 8);
        recorder.simulate(&tick(1));
        recorder.target_mut().value = 42;
        recorder.capture(&tick(2));
        assert_eq!(stored_ticks(&recorder), vec![0, 1, 2]);
        assert_eq!(recorder.lookup(4).map(|s| s.state), Some(42));
    }

    #[test]
    fn set_capacity_keeps_newest() {
        let mut recorder = recorded(&[0, 1, 2, 3, 4], false, 8);
        recorder.set_capacity(2);
        assert_eq!(recorder.capacity(), 2);
        assert_eq!(stored_ticks(&recorder), vec![3, 4]);
    }

    // -- 4. Listener forwarding ---------------------------------------------

    #[test]
    fn listener_callbacks_drive_protocol_and_hooks() {
        let mut recorder = SnapshotRecorder::new(Counter::default(), 8, Tick::ORIGIN);
        recorder.on_capture(&tick(0));
        recorder.target_mut().value = 3;
        recorder.on_capture(&tick(1));
        recorder.on_pause();
        recorder.on_replicate(&tick(0));
        recorder.on_discard(&tick(0));
        recorder.on_simulate(&tick(1));

        let target = recorder.into_target();
        assert_eq!(target.pauses, 1);
        assert_eq!(target.discarded, vec![0]);
        assert_eq!(
            target.applied,
            vec![(0, ApplySource::Replication), (3, ApplySource::Simulate)]
        );
    }
}
