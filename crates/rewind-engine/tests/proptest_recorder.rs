//! Property tests for snapshot recorders driven through a timeline.
//!
//! Random sequences of value changes, steps, seeks and resumes are checked
//! against a plain per-tick log of the values that were live at each tick.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rewind_engine::prelude::*;

#[derive(Debug, Clone)]
enum Action {
    /// Set the value, then step one frame.
    Step(u8),
    /// Pause, seek to a fraction of the retained range, resume.
    Rewind(f64),
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        6 => (0u8..4).prop_map(Action::Step),
        1 => (0.0..=1.0f64).prop_map(Action::Rewind),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Replicate at any retained tick shows the value that was live there,
    /// and resume never leaves snapshots past the anchor.
    #[test]
    fn recorder_agrees_with_per_tick_log(
        tps in 2u32..12,
        actions in prop::collection::vec(action_strategy(), 1..120),
    ) {
        let mut timeline = Timeline::new(RewindConfig {
            max_ticks_per_second: tps,
            max_record_duration: 1.0,
        }).unwrap();
        let value = timeline.attach(Variable::new(0u8));
        let mut log: BTreeMap<i64, u8> = BTreeMap::new();

        for action in actions {
            match action {
                Action::Step(v) => {
                    value.borrow_mut().target_mut().set(v);
                    let tick = timeline.step(0.1).unwrap().unwrap();
                    // A fresh tick replaces any abandoned future with the same index.
                    let _abandoned = log.split_off(&tick.index);
                    log.insert(tick.index, v);
                }
                Action::Rewind(fraction) => {
                    if timeline.pause().is_err() {
                        continue;
                    }
                    let (min, max) = (timeline.min_time(), timeline.max_time());
                    let anchor = timeline.seek(min + (max - min) * fraction).unwrap();

                    // Every retained tick replays the logged value.
                    let retained: Vec<Tick> = timeline.history().iter().copied().collect();
                    for tick in &retained {
                        timeline.seek(tick.timestamp).unwrap();
                        let expected = log.get(&tick.index).copied();
                        prop_assert_eq!(Some(*value.borrow().target().get()), expected);
                    }

                    timeline.seek(anchor.timestamp).unwrap();
                    timeline.resume().unwrap();

                    prop_assert_eq!(timeline.anchor().index, anchor.index);
                    prop_assert_eq!(timeline.history().peek().unwrap().index, anchor.index);
                    prop_assert!(value.borrow().snapshots().iter().all(|s| s.tick <= anchor.index));
                    prop_assert_eq!(Some(*value.borrow().target().get()), log.get(&anchor.index).copied());
                }
            }
        }
    }

    /// Compression never stores two equal neighbours and keeps ticks strictly
    /// increasing.
    #[test]
    fn compressed_snapshots_are_distinct_and_ordered(
        values in prop::collection::vec(0u8..3, 1..200),
    ) {
        let timeline_config = RewindConfig { max_ticks_per_second: 60, max_record_duration: 10.0 };
        let mut timeline = Timeline::new(timeline_config).unwrap();
        let value = timeline.attach(Variable::new(0u8));

        for v in &values {
            value.borrow_mut().target_mut().set(*v);
            timeline.step(1.0 / 60.0).unwrap();
        }

        let recorder = value.borrow();
        let snapshots = recorder.snapshots().to_vec();
        prop_assert!(snapshots.windows(2).all(|w| w[0].tick < w[1].tick));
        prop_assert!(snapshots.windows(2).all(|w| w[0].state != w[1].state));

        let changes = 1 + values.windows(2).filter(|w| w[0] != w[1]).count();
        prop_assert_eq!(snapshots.len(), changes.min(recorder.capacity()));
    }

    /// The predecessor lookup agrees with a linear scan.
    #[test]
    fn lookup_matches_linear_scan(
        values in prop::collection::vec(0u8..4, 1..60),
        target in -5i64..70,
    ) {
        let mut recorder = SnapshotRecorder::new(Variable::new(0u8), 16, Tick::ORIGIN);
        let mut tick = Tick::ORIGIN;
        for v in &values {
            tick = tick.advance(0.1);
            recorder.target_mut().set(*v);
            recorder.capture(&tick);
        }

        let expected = recorder.snapshots().iter().filter(|s| s.tick <= target).last().cloned();
        prop_assert_eq!(recorder.lookup(target).cloned(), expected);
    }
}
