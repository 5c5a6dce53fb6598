//! A rewindable value cell.
//!
//! [`Variable`] is the simplest [`Rewindable`]: it records a single value and
//! compresses consecutive captures with [`Changed`]. Use it for scalar game
//! state such as scores, counters, or cooldowns.

use crate::change::Changed;
use crate::recorder::{ApplySource, Rewindable};

/// A value whose history is recorded by the timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variable<T> {
    value: T,
    last_applied: Option<ApplySource>,
}

impl<T> Variable<T> {
    /// Wrap `value`.
    pub fn new(value: T) -> Self {
        Self {
            value,
            last_applied: None,
        }
    }

    /// Current value.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replace the current value. Recorded at the next capture.
    pub fn set(&mut self, value: T) {
        self.value = value;
    }

    /// How the most recent restored value was applied, if any. Hosts use it to
    /// tell a cosmetic scrub from an authoritative restore.
    pub fn last_applied(&self) -> Option<ApplySource> {
        self.last_applied
    }

    /// Unwrap the current value.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Clone + Changed> Rewindable for Variable<T> {
    type State = T;

    fn capture_state(&self) -> T {
        self.value.clone()
    }

    fn apply_state(&mut self, state: &T, source: ApplySource) {
        self.value = state.clone();
        self.last_applied = Some(source);
    }

    fn has_changed(&self, previous: &T, current: &T) -> bool {
        previous.changed(current)
    }
}

#[cfg(test)]
mod tests {
    use rewind_core::tick::Tick;

    use super::*;
    use crate::recorder::SnapshotRecorder;

    #[test]
    fn set_and_get() {
        let mut score = Variable::new(10u32);
        score.set(25);
        assert_eq!(*score.get(), 25);
        assert_eq!(score.last_applied(), None);
        assert_eq!(score.into_inner(), 25);
    }

    #[test]
    fn recorder_compresses_repeated_values() {
        let mut recorder = SnapshotRecorder::new(Variable::new(0.0f64), 8, Tick::ORIGIN);
        let mut tick = Tick::ORIGIN;
        for value in [0.0, 1e-9, 0.5, 0.5, 1.0] {
            tick = tick.advance(0.1);
            recorder.target_mut().set(value);
            recorder.capture(&tick);
        }
        let stored: Vec<i64> = recorder.snapshots().iter().map(|s| s.tick).collect();
        assert_eq!(stored, vec![0, 2, 4]);
    }

    #[test]
    fn applied_source_is_reported() {
        let mut recorder = SnapshotRecorder::new(Variable::new(1i32), 8, Tick::ORIGIN);
        let t0 = Tick::ORIGIN.advance(0.1);
        let t1 = t0.advance(0.1);
        recorder.capture(&t0);
        recorder.target_mut().set(2);
        recorder.capture(&t1);

        recorder.replicate(&t0);
        assert_eq!(*recorder.target().get(), 1);
        assert_eq!(recorder.target().last_applied(), Some(ApplySource::Replication));

        recorder.simulate(&t1);
        assert_eq!(*recorder.target().get(), 2);
        assert_eq!(recorder.target().last_applied(), Some(ApplySource::Simulate));
    }
}
