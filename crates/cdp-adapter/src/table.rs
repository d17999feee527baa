//! Pending-response table shared by the receive loop and awaiting callers.

use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;

#[derive(Debug)]
enum Slot {
    Awaiting { method: String },
    Arrived(Value),
}

/// Outcome of handing a decoded response to the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Stored,
    /// Nobody is waiting for this id any more (or never was); the payload is dropped.
    Stale,
    /// A payload for this id is already waiting to be consumed; the newer one is dropped.
    Duplicate,
}

/// Request id to response payload, one entry per outstanding exchange.
///
/// An entry is created by [`register`](Self::register) before the request is written, filled
/// by the receive loop, and removed by exactly one [`take`](Self::take) or
/// [`abandon`](Self::abandon). Payloads for ids that are not registered are never stored, so a
/// response arriving after its caller gave up cannot be observed by anyone.
#[derive(Debug, Default)]
pub struct PendingResponseTable {
    slots: DashMap<u64, Slot>,
}

impl PendingResponseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `id` is already outstanding.
    pub fn register(&self, id: u64, method: &str) -> bool {
        match self.slots.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Awaiting {
                    method: method.to_string(),
                });
                true
            }
        }
    }

    pub fn deliver(&self, id: u64, payload: Value) -> Delivery {
        let Some(mut slot) = self.slots.get_mut(&id) else {
            return Delivery::Stale;
        };
        if matches!(*slot, Slot::Arrived(_)) {
            return Delivery::Duplicate;
        }
        *slot = Slot::Arrived(payload);
        Delivery::Stored
    }

    pub fn is_ready(&self, id: u64) -> bool {
        self.slots
            .get(&id)
            .map(|slot| matches!(&*slot, Slot::Arrived(_)))
            .unwrap_or(false)
    }

    /// Remove and return the payload for `id` if it has arrived.
    pub fn take(&self, id: u64) -> Option<Value> {
        let (_, slot) = self
            .slots
            .remove_if(&id, |_, slot| matches!(slot, Slot::Arrived(_)))?;
        match slot {
            Slot::Arrived(payload) => Some(payload),
            Slot::Awaiting { .. } => None,
        }
    }

    /// Drop the entry for `id` whatever its state. Returns the method it was registered for.
    pub fn abandon(&self, id: u64) -> Option<String> {
        self.slots.remove(&id).map(|(_, slot)| match slot {
            Slot::Awaiting { method } => method,
            Slot::Arrived(_) => String::new(),
        })
    }

    pub fn method_of(&self, id: u64) -> Option<String> {
        self.slots.get(&id).and_then(|slot| match &*slot {
            Slot::Awaiting { method } => Some(method.clone()),
            Slot::Arrived(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Outstanding ids, in no particular order.
    pub fn outstanding(&self) -> Vec<u64> {
        self.slots.iter().map(|entry| *entry.key()).collect()
    }
}
