//! Entity lifetime across rewinds.
//!
//! Entities that appear and disappear during play need more than a state
//! history: scrubbing to before an entity existed must hide it, and
//! resuming from before its spawn must destroy it for good, because the
//! future it was spawned in has been abandoned.
//!
//! [`TimeEntity`] tracks the spawn tick (the timeline anchor when it was
//! attached), an optional despawn tick, and a recorded active flag. The host
//! owns the actual game object and polls [`TimeEntity::is_active`] and
//! [`TimeEntity::is_destroyed`] each frame.
//!
//! | event        | Unspawned         | Live                    | Despawned             |
//! |--------------|-------------------|-------------------------|-----------------------|
//! | Replicate(T) | hide              | replay active flag      | hide                  |
//! | Simulate(T)  | destroy           | respawn, restore flag   | prune history, hide   |
//!
//! A Discard at or after the despawn tick also destroys the entity: the
//! despawn can no longer be undone by rewinding.

use rewind_core::tick::Tick;
use serde::{Deserialize, Serialize};

use crate::change::Changed;
use crate::dispatch::TickListener;
use crate::recorder::{ApplySource, Rewindable, SnapshotRecorder};

// ---------------------------------------------------------------------------
// SpawnState
// ---------------------------------------------------------------------------

/// Where a tick falls relative to an entity's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnState {
    /// Before the entity was spawned.
    Unspawned,
    /// Between spawn and despawn, inclusive.
    Live,
    /// After the entity was despawned.
    Despawned,
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

/// The recorded visibility flag of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    active: bool,
}

impl Rewindable for Activity {
    type State = bool;

    fn capture_state(&self) -> bool {
        self.active
    }

    fn apply_state(&mut self, state: &bool, _source: ApplySource) {
        self.active = *state;
    }

    fn has_changed(&self, previous: &bool, current: &bool) -> bool {
        previous.changed(current)
    }
}

// ---------------------------------------------------------------------------
// TimeEntity
// ---------------------------------------------------------------------------

/// Lifetime recorder for one spawned entity.
#[derive(Debug)]
pub struct TimeEntity {
    spawn_tick: Tick,
    despawn_tick: Tick,
    spawned: bool,
    destroyed: bool,
    activity: SnapshotRecorder<Activity>,
}

impl TimeEntity {
    /// An active entity spawned at `spawn_tick`, recording up to `capacity`
    /// activity changes.
    ///
    /// The spawn tick itself is recorded as active, so replaying or resuming
    /// exactly at the spawn always finds the entity visible.
    pub fn new(spawn_tick: Tick, capacity: usize) -> Self {
        let mut activity = SnapshotRecorder::new(Activity { active: true }, capacity, spawn_tick);
        activity.capture(&spawn_tick);
        Self {
            spawn_tick,
            despawn_tick: Tick::MAX,
            spawned: true,
            destroyed: false,
            activity,
        }
    }

    /// Tick the entity was spawned at.
    pub fn spawn_tick(&self) -> Tick {
        self.spawn_tick
    }

    /// Tick the entity was despawned at, [`Tick::MAX`] if it is alive.
    pub fn despawn_tick(&self) -> Tick {
        self.despawn_tick
    }

    /// Whether the entity should currently be shown and simulated.
    pub fn is_active(&self) -> bool {
        !self.destroyed && self.activity.target().active
    }

    /// `false` once despawned, until a rewind respawns it.
    pub fn is_spawned(&self) -> bool {
        self.spawned
    }

    /// Whether the entity is gone for good. The host should release it.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// The recorded activity history.
    pub fn activity(&self) -> &SnapshotRecorder<Activity> {
        &self.activity
    }

    /// Despawn at tick `at` (normally the timeline anchor). The entity is
    /// hidden but stays recoverable until `at` leaves the retention window.
    pub fn despawn(&mut self, at: Tick) {
        if self.destroyed {
            return;
        }
        self.spawned = false;
        self.despawn_tick = at;
        self.activity.target_mut().active = false;
    }

    /// Classify `tick` against this entity's lifetime.
    pub fn spawn_state(&self, tick: &Tick) -> SpawnState {
        if tick.index < self.spawn_tick.index {
            SpawnState::Unspawned
        } else if tick.index > self.despawn_tick.index {
            SpawnState::Despawned
        } else {
            SpawnState::Live
        }
    }

    fn respawn(&mut self) {
        self.spawned = true;
        self.despawn_tick = Tick::MAX;
    }

    fn destroy(&mut self, reason: &'static str, tick: &Tick) {
        tracing::debug!(
            spawn = self.spawn_tick.index,
            tick = tick.index,
            reason,
            "entity destroyed"
        );
        self.destroyed = true;
        self.spawned = false;
        self.activity.target_mut().active = false;
    }
}

impl TickListener for TimeEntity {
    fn on_capture(&mut self, tick: &Tick) {
        if self.destroyed {
            return;
        }
        self.activity.capture(tick);
    }

    fn on_discard(&mut self, tick: &Tick) {
        if self.destroyed {
            return;
        }
        if tick.index >= self.despawn_tick.index {
            self.destroy("despawn left the retention window", tick);
        }
    }

    fn on_replicate(&mut self, tick: &Tick) {
        if self.destroyed {
            return;
        }
        match self.spawn_state(tick) {
            SpawnState::Unspawned | SpawnState::Despawned => {
                self.activity.target_mut().active = false;
            }
            SpawnState::Live => {
                self.activity.replicate(tick);
            }
        }
    }

    fn on_simulate(&mut self, tick: &Tick) {
        if self.destroyed {
            return;
        }
        match self.spawn_state(tick) {
            SpawnState::Unspawned => {
                self.activity.rollback(tick);
                self.destroy("rolled back before spawn", tick);
            }
            SpawnState::Despawned => {
                self.activity.rollback(tick);
                self.activity.target_mut().active = false;
            }
            SpawnState::Live => {
                if !self.spawned {
                    self.respawn();
                }
                self.activity.simulate(tick);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(index: i64) -> Tick {
        Tick::new(index, 0.1, 0.1 * (index + 1) as f64)
    }

    /// An entity spawned at `spawn` that has captured every tick through
    /// `until`.
    fn entity(spawn: i64, until: i64) -> TimeEntity {
        let mut entity = TimeEntity::new(tick(spawn), 64);
        for index in spawn + 1..=until {
            entity.on_capture(&tick(index));
        }
        entity
    }

    #[test]
    fn spawn_state_classification() {
        let mut entity = entity(3, 5);
        assert_eq!(entity.spawn_state(&tick(2)), SpawnState::Unspawned);
        assert_eq!(entity.spawn_state(&tick(3)), SpawnState::Live);
        assert_eq!(entity.spawn_state(&tick(100)), SpawnState::Live);

        entity.despawn(tick(5));
        assert_eq!(entity.spawn_state(&tick(5)), SpawnState::Live);
        assert_eq!(entity.spawn_state(&tick(6)), SpawnState::Despawned);
    }

    #[test]
    fn despawn_hides_and_records() {
        let mut entity = entity(0, 3);
        entity.despawn(tick(3));
        assert!(!entity.is_active());
        assert!(!entity.is_spawned());
        assert!(!entity.is_destroyed());
        assert_eq!(entity.despawn_tick().index, 3);

        entity.on_capture(&tick(4));
        let stored: Vec<(i64, bool)> = entity
            .activity()
            .snapshots()
            .iter()
            .map(|s| (s.tick, s.state))
            .collect();
        assert_eq!(stored, vec![(0, true), (4, false)]);
    }

    #[test]
    fn replicate_hides_outside_lifetime() {
        let mut entity = entity(3, 6);
        entity.on_replicate(&tick(1));
        assert!(!entity.is_active());
        entity.on_replicate(&tick(5));
        assert!(entity.is_active());
        assert!(!entity.is_destroyed());
    }

    #[test]
    fn spawn_tick_is_recorded_active() {
        let entity = TimeEntity::new(tick(5), 8);
        let first = entity.activity().snapshots().oldest().cloned();
        assert_eq!(first.map(|s| (s.tick, s.state)), Some((5, true)));
    }

    #[test]
    fn replicate_at_spawn_after_hiding_shows_entity() {
        let mut entity = entity(5, 9);
        entity.on_replicate(&tick(3));
        assert!(!entity.is_active());

        entity.on_replicate(&tick(5));
        assert!(entity.is_active());
    }

    #[test]
    fn simulate_at_spawn_after_hiding_keeps_entity_alive() {
        let mut entity = entity(5, 9);
        entity.on_replicate(&tick(3));
        entity.on_simulate(&tick(5));

        assert!(entity.is_active());
        assert!(entity.is_spawned());
        assert!(!entity.is_destroyed());
        let stored: Vec<i64> = entity.activity().snapshots().iter().map(|s| s.tick).collect();
        assert_eq!(stored, vec![5]);

        entity.on_capture(&tick(6));
        assert!(entity.is_active());
    }

    #[test]
    fn simulate_before_spawn_destroys() {
        let mut entity = entity(6, 9);
        entity.on_simulate(&tick(4));
        assert!(entity.is_destroyed());
        assert!(!entity.is_active());
        assert!(entity.activity().is_empty());

        // Destroyed entities ignore everything afterwards.
        entity.on_capture(&tick(5));
        entity.on_simulate(&tick(8));
        assert!(entity.is_destroyed());
        assert!(entity.activity().is_empty());
    }

    #[test]
    fn simulate_before_despawn_respawns() {
        let mut entity = entity(0, 4);
        entity.despawn(tick(4));
        for index in 5..=8 {
            entity.on_capture(&tick(index));
        }

        entity.on_simulate(&tick(2));
        assert!(entity.is_spawned());
        assert!(entity.is_active());
        assert!(entity.despawn_tick().is_max());
        assert_eq!(entity.activity().anchor().index, 2);
    }

    #[test]
    fn simulate_after_despawn_stays_hidden_and_prunes() {
        let mut entity = entity(0, 4);
        entity.despawn(tick(4));
        for index in 5..=8 {
            entity.on_capture(&tick(index));
        }

        entity.on_simulate(&tick(6));
        assert!(!entity.is_active());
        assert!(!entity.is_spawned());
        assert!(!entity.is_destroyed());
        assert!(entity.activity().snapshots().iter().all(|s| s.tick <= 6));
    }

    #[test]
    fn discarding_despawn_tick_destroys() {
        let mut entity = entity(0, 6);
        entity.despawn(tick(4));

        entity.on_discard(&tick(3));
        assert!(!entity.is_destroyed());
        entity.on_discard(&tick(4));
        assert!(entity.is_destroyed());
    }

    #[test]
    fn discard_without_despawn_is_harmless() {
        let mut entity = entity(0, 6);
        entity.on_discard(&tick(5));
        assert!(!entity.is_destroyed());
        assert!(entity.is_active());
    }
}
