//! Content-addressed record set.
//!
//! Records are stored in insertion order and addressed by their identity.
//! Lookup and removal are O(1): removal leaves an empty slot behind instead
//! of shifting the remaining records, so iteration order stays stable while
//! the set is being drained.

use std::collections::HashMap;

use super::index::Identity;
use super::types::Record;

/// A set of records keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct ContentSet {
    /// Record slots in insertion order; removed records leave `None`.
    slots: Vec<Option<(Identity, Record)>>,
    /// Identity -> slot position.
    positions: HashMap<Identity, usize>,
}

impl ContentSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, replacing (in place) any record with the same
    /// identity. Returns the replaced record.
    pub fn insert(&mut self, identity: Identity, record: Record) -> Option<Record> {
        if let Some(&position) = self.positions.get(&identity)
            && let Some(slot) = self.slots.get_mut(position)
        {
            return slot.replace((identity, record)).map(|(_, previous)| previous);
        }

        self.positions.insert(identity.clone(), self.slots.len());
        self.slots.push(Some((identity, record)));
        None
    }

    /// Looks up a record by identity.
    #[must_use]
    pub fn get(&self, identity: &Identity) -> Option<&Record> {
        let position = *self.positions.get(identity)?;
        self.slots
            .get(position)
            .and_then(Option::as_ref)
            .map(|(_, record)| record)
    }

    /// Returns true if a record with this identity is present.
    #[must_use]
    pub fn contains(&self, identity: &Identity) -> bool {
        self.positions.contains_key(identity)
    }

    /// Removes a record by identity, handing it back to the caller.
    pub fn remove(&mut self, identity: &Identity) -> Option<Record> {
        let position = self.positions.remove(identity)?;
        self.slots
            .get_mut(position)
            .and_then(Option::take)
            .map(|(_, record)| record)
    }

    /// Iterates over the remaining records in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Record> {
        self.entries().map(|(_, record)| record)
    }

    /// Iterates over the remaining identities and records in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&Identity, &Record)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|(identity, record)| (identity, record)))
    }

    /// Consumes the set, yielding the remaining entries in insertion order.
    pub fn into_entries(self) -> impl Iterator<Item = (Identity, Record)> {
        self.slots.into_iter().flatten()
    }

    /// Number of records in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if the set holds no record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::ResourceKind;
    use serde_json::json;

    fn queue(name: &str, durable: bool) -> (Identity, Record) {
        let record = json!({ "vhost": "/", "name": name, "durable": durable });
        let record = record.as_object().expect("object").clone();
        let identity = Identity::from_record(ResourceKind::Queue, &record, 0).expect("identity");
        (identity, record)
    }

    #[test]
    fn test_insert_get_remove() {
        let mut set = ContentSet::new();
        let (id, record) = queue("q1", true);

        assert!(set.insert(id.clone(), record.clone()).is_none());
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&id), Some(&record));

        assert_eq!(set.remove(&id), Some(record));
        assert!(set.is_empty());
        assert!(set.get(&id).is_none());
        assert!(set.remove(&id).is_none());
    }

    #[test]
    fn test_duplicate_identity_last_write_wins() {
        let mut set = ContentSet::new();
        let (id, first) = queue("q1", false);
        let (_, second) = queue("q1", true);

        set.insert(id.clone(), first.clone());
        let replaced = set.insert(id.clone(), second.clone());

        assert_eq!(replaced, Some(first));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&id), Some(&second));
    }

    #[test]
    fn test_iteration_order_survives_removal() {
        let mut set = ContentSet::new();
        for name in ["a", "b", "c", "d"] {
            let (id, record) = queue(name, true);
            set.insert(id, record);
        }

        let (b, _) = queue("b", true);
        set.remove(&b);

        let names: Vec<&str> = set
            .values()
            .filter_map(|r| r.get("name").and_then(serde_json::Value::as_str))
            .collect();
        assert_eq!(names, vec!["a", "c", "d"]);
        assert_eq!(set.into_entries().count(), 3);
    }
}
