//! Ordered, de-duplicated collections of resource values.
//!
//! Used for "known proposals" and multi-select sets. Membership is decided
//! by value identity (URI and name), never by load state, and the order of
//! first insertion is preserved. Mutations diff against the previous
//! contents and fire a single aggregate notification only when the
//! resulting sequence actually differs.

use tokio::sync::broadcast;

use crate::value::ResourceValue;

/// Aggregate change notification for a [`ValueList`].
#[derive(Debug, Clone)]
pub enum ListEvent {
    Changed {
        old: Vec<ResourceValue>,
        new: Vec<ResourceValue>,
    },
}

/// An ordered sequence of resource values with set semantics.
pub struct ValueList {
    values: Vec<ResourceValue>,
    events: broadcast::Sender<ListEvent>,
}

impl Default for ValueList {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueList {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            values: Vec::new(),
            events,
        }
    }

    pub fn values(&self) -> &[ResourceValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, value: &ResourceValue) -> bool {
        self.values.contains(value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResourceValue> {
        self.values.iter()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListEvent> {
        self.events.subscribe()
    }

    /// Append a value unless an equal one is already present. Returns
    /// whether the list changed.
    pub fn insert(&mut self, value: ResourceValue) -> bool {
        if self.values.contains(&value) {
            return false;
        }
        let old = self.values.clone();
        self.values.push(value);
        self.notify(old);
        true
    }

    /// Remove the value equal to `value`, preserving the order of the
    /// survivors. Returns whether the list changed.
    pub fn remove(&mut self, value: &ResourceValue) -> bool {
        let Some(index) = self.values.iter().position(|v| v == value) else {
            return false;
        };
        let old = self.values.clone();
        self.values.remove(index);
        self.notify(old);
        true
    }

    /// Reconcile the list with `new_values`: elements not yet present are
    /// appended in the new set's iteration order, elements that vanished
    /// are removed with the survivors keeping their relative order, and
    /// duplicates within the input collapse onto their first occurrence.
    /// One aggregate notification fires iff the resulting sequence differs.
    pub fn sync<I>(&mut self, new_values: I) -> bool
    where
        I: IntoIterator<Item = ResourceValue>,
    {
        let mut incoming: Vec<ResourceValue> = Vec::new();
        for value in new_values {
            if !incoming.contains(&value) {
                incoming.push(value);
            }
        }

        let old = self.values.clone();
        for value in &incoming {
            if !self.values.contains(value) {
                self.values.push(value.clone());
            }
        }
        self.values.retain(|v| incoming.contains(v));

        if self.values == old {
            return false;
        }
        self.notify(old);
        true
    }

    /// Remove every listed value. Returns whether the list changed.
    pub fn remove_all(&mut self, values: &[ResourceValue]) -> bool {
        let old = self.values.clone();
        self.values.retain(|v| !values.contains(v));
        if self.values == old {
            return false;
        }
        self.notify(old);
        true
    }

    /// Commit an edited value back into the list: the new value takes the
    /// old one's position. A notification fires only when the identity
    /// sequence changed; refreshing artifacts under an unchanged identity
    /// is silent. Returns whether `old_value` was found.
    pub fn replace(&mut self, old_value: &ResourceValue, new_value: ResourceValue) -> bool {
        let Some(index) = self.values.iter().position(|v| v == old_value) else {
            return false;
        };
        let changed = self.values[index] != new_value;
        let old = self.values.clone();
        self.values[index] = new_value;
        if changed {
            self.notify(old);
        }
        true
    }

    fn notify(&self, old: Vec<ResourceValue>) {
        let _ = self.events.send(ListEvent::Changed {
            old,
            new: self.values.clone(),
        });
    }
}
