//! Typed notification lists.
//!
//! Every observable object in the core (Compositor, ClientWindow,
//! WindowPixmap) announces state changes through [`Signal`]s: plain lists of
//! callbacks invoked synchronously on the emitting thread. Slots are held
//! behind `Arc` and emission runs on a snapshot of the list, so a slot may
//! connect or disconnect other slots without deadlocking the signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Slot<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifies a connected slot so it can be disconnected later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(u64);

/// A list of typed callbacks.
pub struct Signal<T> {
    slots: Mutex<Vec<(u64, Slot<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a slot; it stays connected until [`disconnect`](Self::disconnect).
    pub fn connect(&self, slot: impl Fn(&T) + Send + Sync + 'static) -> SlotId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().unwrap().push((id, Arc::new(slot)));
        SlotId(id)
    }

    /// Remove a slot. Unknown ids are ignored, so disconnecting twice is fine.
    pub fn disconnect(&self, id: SlotId) {
        self.slots.lock().unwrap().retain(|(slot_id, _)| *slot_id != id.0);
    }

    /// Invoke every slot connected at the time of the call, in connection
    /// order. Slots connected during emission are not invoked for it.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Slot<T>> = self
            .slots
            .lock()
            .unwrap()
            .iter()
            .map(|(_, slot)| slot.clone())
            .collect();
        for slot in snapshot {
            slot(value);
        }
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.slots.lock().unwrap().len();
        f.debug_struct("Signal").field("slots", &len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emits_to_all_slots_in_order() {
        let signal = Signal::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let log = log.clone();
            signal.connect(move |value: &i32| log.lock().unwrap().push((tag, *value)));
        }
        signal.emit(&7);

        assert_eq!(*log.lock().unwrap(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn disconnected_slot_stops_receiving() {
        let signal = Signal::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let id = signal.connect(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        signal.emit(&());
        signal.disconnect(id);
        signal.disconnect(id);
        signal.emit(&());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn slot_connected_during_emission_misses_that_emission() {
        let signal = Arc::new(Signal::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let inner_signal = signal.clone();
        let late = late_calls.clone();
        signal.connect(move |_: &()| {
            let late = late.clone();
            inner_signal.connect(move |_: &()| {
                late.fetch_add(1, Ordering::SeqCst);
            });
        });

        signal.emit(&());
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        signal.emit(&());
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }
}
