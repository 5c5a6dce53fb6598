//! Broadcast dispatcher for tick-scoped timeline events.
//!
//! The [`Dispatcher`] fans events out to every registered [`TickListener`]
//! without the timeline knowing any concrete listener type. There are six
//! independent [`Channel`]s:
//!
//! | channel     | fired when                                             |
//! |-------------|--------------------------------------------------------|
//! | `Capture`   | a new tick is recorded while live                      |
//! | `Discard`   | a tick permanently leaves the retention window         |
//! | `Replicate` | a paused timeline seeks to a past tick (cosmetic only) |
//! | `Simulate`  | a resumed timeline rolls back to its anchor            |
//! | `Pause`     | the timeline pauses                                    |
//! | `Resume`    | the timeline resumes (before `Simulate`)               |
//!
//! # Ownership
//!
//! The registry stores only [`Weak`] references. Subscribing returns a
//! [`Subscription`] guard that unregisters the listener when dropped, so a
//! listener can never receive callbacks after its owner released it.
//! [`Attached`] bundles a listener with its guard for the common case where
//! both share one lifetime.
//!
//! # Re-entrancy
//!
//! Dispatch snapshots the target list before invoking callbacks, so listeners
//! may subscribe or unsubscribe (including themselves) while an event is in
//! flight. A listener unsubscribed mid-dispatch is not called afterwards.
//!
//! A listener the host holds borrowed cannot receive events. The timeline
//! calls [`Dispatcher::ensure_available`] before every state change and
//! rejects the operation with [`RewindError::ListenerBusy`] instead of
//! leaving that listener behind. A listener that becomes borrowed while an
//! event is already in flight is skipped with a warning.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use rewind_engine::dispatch::{ChannelSet, Dispatcher, TickListener};
//! use rewind_engine::rewind_core::tick::Tick;
//!
//! #[derive(Default)]
//! struct Counter { captures: u32 }
//!
//! impl TickListener for Counter {
//!     fn on_capture(&mut self, _tick: &Tick) { self.captures += 1; }
//! }
//!
//! let dispatcher = Dispatcher::new();
//! let counter = Rc::new(RefCell::new(Counter::default()));
//! let subscription = dispatcher.subscribe(&counter, ChannelSet::ALL);
//!
//! dispatcher.capture(&Tick::ZERO);
//! drop(subscription);
//! dispatcher.capture(&Tick::ZERO);
//!
//! assert_eq!(counter.borrow().captures, 1);
//! ```

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use rewind_core::tick::Tick;

use crate::RewindError;

// ---------------------------------------------------------------------------
// Channel / ChannelSet
// ---------------------------------------------------------------------------

/// One event stream of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Record current state for the newest tick.
    Capture,
    /// A tick has permanently left the retention window.
    Discard,
    /// Display state as of a past tick without resuming simulation.
    Replicate,
    /// Prune rolled-back history and resume from the anchor.
    Simulate,
    /// The timeline paused.
    Pause,
    /// The timeline resumed.
    Resume,
}

impl Channel {
    const fn bit(self) -> u8 {
        match self {
            Channel::Capture => 1 << 0,
            Channel::Discard => 1 << 1,
            Channel::Replicate => 1 << 2,
            Channel::Simulate => 1 << 3,
            Channel::Pause => 1 << 4,
            Channel::Resume => 1 << 5,
        }
    }
}

/// A set of [`Channel`]s a listener subscribes to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChannelSet(u8);

impl ChannelSet {
    /// No channels.
    pub const NONE: ChannelSet = ChannelSet(0);

    /// The four tick-scoped channels.
    pub const TICK: ChannelSet = ChannelSet(
        Channel::Capture.bit()
            | Channel::Discard.bit()
            | Channel::Replicate.bit()
            | Channel::Simulate.bit(),
    );

    /// Pause and resume notifications.
    pub const PLAYBACK: ChannelSet = ChannelSet(Channel::Pause.bit() | Channel::Resume.bit());

    /// Every channel.
    pub const ALL: ChannelSet = ChannelSet(Self::TICK.0 | Self::PLAYBACK.0);

    /// A set containing only `channel`.
    pub const fn of(channel: Channel) -> Self {
        ChannelSet(channel.bit())
    }

    /// This set plus `channel`.
    pub const fn with(self, channel: Channel) -> Self {
        ChannelSet(self.0 | channel.bit())
    }

    /// Returns `true` if `channel` is in the set.
    pub const fn contains(self, channel: Channel) -> bool {
        self.0 & channel.bit() != 0
    }

    /// Returns `true` if the two sets share a channel.
    pub const fn intersects(self, other: ChannelSet) -> bool {
        self.0 & other.0 != 0
    }
}

impl fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const CHANNELS: [Channel; 6] = [
            Channel::Capture,
            Channel::Discard,
            Channel::Replicate,
            Channel::Simulate,
            Channel::Pause,
            Channel::Resume,
        ];
        f.debug_set()
            .entries(CHANNELS.iter().filter(|c| self.contains(**c)))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TickListener
// ---------------------------------------------------------------------------

/// Receiver of timeline events. Every callback defaults to a no-op so
/// listeners implement only what they care about.
pub trait TickListener {
    /// A new tick is being recorded.
    fn on_capture(&mut self, _tick: &Tick) {}

    /// `tick` has permanently left the retention window.
    fn on_discard(&mut self, _tick: &Tick) {}

    /// Display state as of `tick` without mutating recorded history.
    fn on_replicate(&mut self, _tick: &Tick) {}

    /// Drop history newer than `tick` and resume live state from it.
    fn on_simulate(&mut self, _tick: &Tick) {}

    /// The timeline paused.
    fn on_pause(&mut self) {}

    /// The timeline resumed.
    fn on_resume(&mut self) {}
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type ListenerRef = Weak<RefCell<dyn TickListener>>;

struct Slot {
    id: u64,
    channels: ChannelSet,
    listener: ListenerRef,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    slots: Vec<Slot>,
}

impl Registry {
    fn contains(&self, id: u64) -> bool {
        self.slots.iter().any(|slot| slot.id == id)
    }

    fn remove(&mut self, id: u64) {
        self.slots.retain(|slot| slot.id != id);
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Multi-channel, multi-subscriber event fan-out.
///
/// Dispatch order is subscription order. Listeners must not rely on
/// ordering relative to other listeners.
#[derive(Default)]
pub struct Dispatcher {
    registry: Rc<RefCell<Registry>>,
}

impl Dispatcher {
    /// Create a dispatcher with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` on `channels`.
    ///
    /// The dispatcher keeps only a weak reference. The returned guard must be
    /// kept alive for as long as the listener should receive events.
    #[must_use = "dropping the subscription immediately unsubscribes the listener"]
    pub fn subscribe<L>(&self, listener: &Rc<RefCell<L>>, channels: ChannelSet) -> Subscription
    where
        L: TickListener + 'static,
    {
        let weak: Weak<RefCell<L>> = Rc::downgrade(listener);
        let weak: ListenerRef = weak;
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.slots.push(Slot {
            id,
            channels,
            listener: weak,
        });

        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Take ownership of `listener`, subscribe it, and return a handle that
    /// unsubscribes when dropped.
    pub fn attach<L>(&self, listener: L, channels: ChannelSet) -> Attached<L>
    where
        L: TickListener + 'static,
    {
        let listener = Rc::new(RefCell::new(listener));
        let subscription = self.subscribe(&listener, channels);
        Attached {
            listener,
            subscription,
        }
    }

    /// Number of live registrations.
    pub fn listener_count(&self) -> usize {
        self.registry
            .borrow()
            .slots
            .iter()
            .filter(|slot| slot.listener.strong_count() > 0)
            .count()
    }

    /// Check that every listener subscribed to any of `channels` can be
    /// borrowed right now.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::ListenerBusy`] naming the first listener that
    /// is currently borrowed elsewhere.
    pub fn ensure_available(&self, channels: ChannelSet) -> Result<(), RewindError> {
        let registry = self.registry.borrow();
        for slot in &registry.slots {
            if !slot.channels.intersects(channels) {
                continue;
            }
            let Some(listener) = slot.listener.upgrade() else {
                continue;
            };
            if listener.try_borrow_mut().is_err() {
                return Err(RewindError::ListenerBusy { listener: slot.id });
            }
        }
        Ok(())
    }

    // -- broadcasting -------------------------------------------------------

    /// Broadcast a Capture for `tick`.
    pub fn capture(&self, tick: &Tick) {
        self.broadcast(Channel::Capture, |listener| listener.on_capture(tick));
    }

    /// Broadcast a Discard for `tick`.
    pub fn discard(&self, tick: &Tick) {
        self.broadcast(Channel::Discard, |listener| listener.on_discard(tick));
    }

    /// Broadcast a Replicate for `tick`.
    pub fn replicate(&self, tick: &Tick) {
        self.broadcast(Channel::Replicate, |listener| listener.on_replicate(tick));
    }

    /// Broadcast a Simulate for `tick`.
    pub fn simulate(&self, tick: &Tick) {
        self.broadcast(Channel::Simulate, |listener| listener.on_simulate(tick));
    }

    /// Broadcast a Pause notification.
    pub fn pause(&self) {
        self.broadcast(Channel::Pause, |listener| listener.on_pause());
    }

    /// Broadcast a Resume notification.
    pub fn resume(&self) {
        self.broadcast(Channel::Resume, |listener| listener.on_resume());
    }

    fn broadcast<F>(&self, channel: Channel, mut deliver: F)
    where
        F: FnMut(&mut dyn TickListener),
    {
        // Snapshot targets so callbacks may (un)subscribe without conflicting
        // with this borrow.
        let targets: Vec<(u64, ListenerRef)> = {
            let mut registry = self.registry.borrow_mut();
            registry
                .slots
                .retain(|slot| slot.listener.strong_count() > 0);
            registry
                .slots
                .iter()
                .filter(|slot| slot.channels.contains(channel))
                .map(|slot| (slot.id, slot.listener.clone()))
                .collect()
        };

        for (id, weak) in targets {
            if !self.registry.borrow().contains(id) {
                continue;
            }
            let Some(listener) = weak.upgrade() else {
                continue;
            };
            match listener.try_borrow_mut() {
                Ok(mut guard) => deliver(&mut *guard),
                Err(_) => tracing::warn!(
                    listener = id,
                    ?channel,
                    "listener is borrowed elsewhere, skipping event"
                ),
            };
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Guard for one registration. Dropping it unsubscribes the listener.
#[must_use = "dropping the subscription immediately unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    /// Returns `true` while the registration is still present in a live
    /// dispatcher.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.borrow().contains(self.id))
    }

    /// Unsubscribe now. Equivalent to dropping the guard.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Attached
// ---------------------------------------------------------------------------

/// A listener owned together with its subscription.
///
/// Dropping the handle unsubscribes the listener and releases it.
pub struct Attached<L> {
    listener: Rc<RefCell<L>>,
    subscription: Subscription,
}

impl<L> Attached<L> {
    /// Immutably borrow the listener.
    ///
    /// # Panics
    ///
    /// Panics if the listener is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, L> {
        self.listener.borrow()
    }

    /// Mutably borrow the listener. Timeline operations are rejected while
    /// the borrow is held.
    ///
    /// # Panics
    ///
    /// Panics if the listener is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, L> {
        self.listener.borrow_mut()
    }

    /// A shared handle to the listener, e.g. for nesting inside another
    /// owner. The subscription still ends when this `Attached` drops.
    pub fn handle(&self) -> Rc<RefCell<L>> {
        Rc::clone(&self.listener)
    }

    /// Returns `true` while the listener is still subscribed.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_active()
    }
}

impl<L: fmt::Debug> fmt::Debug for Attached<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attached")
            .field("listener", &self.listener)
            .field("subscription", &self.subscription)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every event it receives as a string.
    #[derive(Default)]
    struct Log {
        events: Vec<String>,
    }

    impl TickListener for Log {
        fn on_capture(&mut self, tick: &Tick) {
            self.events.push(format!("capture {}", tick.index));
        }
        fn on_discard(&mut self, tick: &Tick) {
            self.events.push(format!("discard {}", tick.index));
        }
        fn on_replicate(&mut self, tick: &Tick) {
            self.events.push(format!("replicate {}", tick.index));
        }
        fn on_simulate(&mut self, tick: &Tick) {
            self.events.push(format!("simulate {}", tick.index));
        }
        fn on_pause(&mut self) {
            self.events.push("pause".to_owned());
        }
        fn on_resume(&mut self) {
            self.events.push("resume".to_owned());
        }
    }

    fn tick(index: i64) -> Tick {
        Tick::new(index, 0.1, 0.1 * (index + 1) as f64)
    }

    // -- 1. ChannelSet ------------------------------------------------------

    #[test]
    fn channel_set_membership() {
        assert!(ChannelSet::ALL.contains(Channel::Pause));
        assert!(ChannelSet::TICK.contains(Channel::Discard));
        assert!(!ChannelSet::TICK.contains(Channel::Resume));
        assert!(!ChannelSet::NONE.contains(Channel::Capture));

        let set = ChannelSet::of(Channel::Capture).with(Channel::Simulate);
        assert!(set.contains(Channel::Capture));
        assert!(set.contains(Channel::Simulate));
        assert!(!set.contains(Channel::Replicate));
        assert_eq!(format!("{set:?}"), "{Capture, Simulate}");
    }

    // -- 2. Delivery --------------------------------------------------------

    #[test]
    fn every_channel_reaches_subscriber() {
        let dispatcher = Dispatcher::new();
        let log = dispatcher.attach(Log::default(), ChannelSet::ALL);

        dispatcher.capture(&tick(0));
        dispatcher.discard(&tick(0));
        dispatcher.replicate(&tick(1));
        dispatcher.simulate(&tick(2));
        dispatcher.pause();
        dispatcher.resume();

        assert_eq!(
            log.borrow().events,
            vec![
                "capture 0",
                "discard 0",
                "replicate 1",
                "simulate 2",
                "pause",
                "resume"
            ]
        );
    }

    #[test]
    fn channels_are_independent() {
        let dispatcher = Dispatcher::new();
        let log = dispatcher.attach(Log::default(), ChannelSet::of(Channel::Discard));

        dispatcher.capture(&tick(0));
        dispatcher.discard(&tick(0));
        dispatcher.pause();

        assert_eq!(log.borrow().events, vec!["discard 0"]);
    }

    #[test]
    fn dispatch_follows_subscription_order() {
        let order = Rc::new(RefCell::new(Vec::new()));

        struct Named {
            name: &'static str,
            order: Rc<RefCell<Vec<&'static str>>>,
        }
        impl TickListener for Named {
            fn on_capture(&mut self, _tick: &Tick) {
                self.order.borrow_mut().push(self.name);
            }
        }

        let dispatcher = Dispatcher::new();
        let _a = dispatcher.attach(
            Named {
                name: "a",
                order: Rc::clone(&order),
            },
            ChannelSet::ALL,
        );
        let _b = dispatcher.attach(
            Named {
                name: "b",
                order: Rc::clone(&order),
            },
            ChannelSet::ALL,
        );

        dispatcher.capture(&tick(0));
        assert_eq!(*order.borrow(), vec!["a", "b"]);
    }

    // -- 3. Symmetric unsubscription ----------------------------------------

    #[test]
    fn dropping_attached_unsubscribes() {
        let dispatcher = Dispatcher::new();
        let log = dispatcher.attach(Log::default(), ChannelSet::ALL);
        assert_eq!(dispatcher.listener_count(), 1);
        assert!(log.is_subscribed());

        drop(log);
        assert_eq!(dispatcher.listener_count(), 0);
        dispatcher.capture(&tick(0));
    }

    #[test]
    fn cancel_stops_delivery_but_listener_survives() {
        let dispatcher = Dispatcher::new();
        let log = Rc::new(RefCell::new(Log::default()));
        let subscription = dispatcher.subscribe(&log, ChannelSet::ALL);

        dispatcher.capture(&tick(0));
        subscription.cancel();
        dispatcher.capture(&tick(1));

        assert_eq!(log.borrow().events, vec!["capture 0"]);
    }

    #[test]
    fn dropped_listener_is_skipped_and_pruned() {
        let dispatcher = Dispatcher::new();
        let log = Rc::new(RefCell::new(Log::default()));
        let subscription = dispatcher.subscribe(&log, ChannelSet::ALL);

        drop(log);
        assert_eq!(dispatcher.listener_count(), 0);
        dispatcher.capture(&tick(0));
        assert!(!subscription.is_active());
    }

    #[test]
    fn subscription_outliving_dispatcher_is_harmless() {
        let log = Rc::new(RefCell::new(Log::default()));
        let subscription = {
            let dispatcher = Dispatcher::new();
            dispatcher.subscribe(&log, ChannelSet::ALL)
        };
        assert!(!subscription.is_active());
        drop(subscription);
    }

    // -- 4. Re-entrancy -----------------------------------------------------

    /// Cancels another listener's subscription from inside a callback.
    struct Canceller {
        victim: Option<Subscription>,
    }

    impl TickListener for Canceller {
        fn on_capture(&mut self, _tick: &Tick) {
            self.victim.take();
        }
    }

    #[test]
    fn unsubscribed_mid_dispatch_is_not_called() {
        let dispatcher = Dispatcher::new();
        let victim = Rc::new(RefCell::new(Log::default()));
        let canceller = Rc::new(RefCell::new(Canceller { victim: None }));

        let _canceller_sub = dispatcher.subscribe(&canceller, ChannelSet::ALL);
        let victim_sub = dispatcher.subscribe(&victim, ChannelSet::ALL);
        canceller.borrow_mut().victim = Some(victim_sub);

        dispatcher.capture(&tick(0));

        assert!(victim.borrow().events.is_empty());
        assert_eq!(dispatcher.listener_count(), 1);
    }

    #[test]
    fn intersecting_channel_sets() {
        assert!(ChannelSet::ALL.intersects(ChannelSet::PLAYBACK));
        assert!(!ChannelSet::TICK.intersects(ChannelSet::PLAYBACK));
        assert!(!ChannelSet::NONE.intersects(ChannelSet::ALL));
    }

    #[test]
    fn ensure_available_reports_borrowed_listener() {
        let dispatcher = Dispatcher::new();
        let _free = dispatcher.attach(Log::default(), ChannelSet::ALL);
        let busy = dispatcher.attach(Log::default(), ChannelSet::of(Channel::Simulate));

        assert!(dispatcher.ensure_available(ChannelSet::ALL).is_ok());

        let _held = busy.borrow();
        assert!(matches!(
            dispatcher.ensure_available(ChannelSet::of(Channel::Simulate)),
            Err(RewindError::ListenerBusy { listener: 1 })
        ));
        // Not subscribed to Capture, so a capture would not need it.
        assert!(dispatcher.ensure_available(ChannelSet::of(Channel::Capture)).is_ok());
    }

    #[test]
    fn borrowed_listener_is_skipped() {
        let dispatcher = Dispatcher::new();
        let log = dispatcher.attach(Log::default(), ChannelSet::ALL);
        let other = dispatcher.attach(Log::default(), ChannelSet::ALL);

        {
            let _held = log.borrow_mut();
            dispatcher.capture(&tick(0));
        }
        dispatcher.capture(&tick(1));

        assert_eq!(log.borrow().events, vec!["capture 1"]);
        assert_eq!(other.borrow().events, vec!["capture 0", "capture 1"]);
    }
}
