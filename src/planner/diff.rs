//! Diff engine for comparing two definitions snapshots.
//!
//! Every record of every kind is classified as added, deleted, changed or
//! unaffected by identity. Bindings that are unaffected themselves but touch
//! a changed exchange or queue are additionally reported as implicitly
//! affected: the broker can only apply such a change by deleting and
//! recreating the exchange or queue, which drops its bindings.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::definitions::{Definitions, DefinitionsIndex, Record, ResourceKind, ResourceMap, ResourceSelector};
use crate::error::Result;

/// Engine for computing diffs between definitions snapshots.
#[derive(Debug, Default)]
pub struct DiffEngine;

/// A record whose identity is unchanged but whose content differs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangedRecord {
    /// Record before the change.
    pub before: Record,
    /// Record after the change.
    pub after: Record,
}

/// Bindings that must be recreated because of a changed exchange or queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImplicitlyAffected {
    /// Affected bindings (as found in the target snapshot).
    pub bindings: Vec<Record>,
}

/// Complete diff result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    /// Records present only after.
    pub added: ResourceMap<Record>,
    /// Records present only before.
    pub deleted: ResourceMap<Record>,
    /// Records present on both sides with different content.
    pub changed: ResourceMap<ChangedRecord>,
    /// Records identical on both sides.
    #[serde(skip)]
    pub unaffected: ResourceMap<Record>,
    /// Unaffected records that still need recreating.
    pub implicitly_affected: ImplicitlyAffected,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the diff between two indexes.
    ///
    /// The inputs are left untouched: each kind is diffed on a private copy
    /// of both sets, which is fully drained by the comparison.
    #[must_use]
    pub fn compute(&self, before: &DefinitionsIndex, after: &DefinitionsIndex) -> DiffResult {
        let mut result = DiffResult::default();

        for kind in ResourceKind::ALL {
            Self::diff_kind(kind, before, after, &mut result);
        }

        result.implicitly_affected.bindings = Self::implicitly_affected_bindings(&result);

        debug!(
            "Diff: {} added, {} deleted, {} changed, {} unaffected, {} implicitly affected",
            result.added_count(),
            result.deleted_count(),
            result.changed_count(),
            result.unaffected_count(),
            result.implicitly_affected.bindings.len()
        );

        result
    }

    /// Indexes two snapshots (skipping `ignore`d resources on both sides)
    /// and diffs them.
    ///
    /// # Errors
    ///
    /// Returns an error if either snapshot cannot be indexed.
    pub fn diff_definitions(
        &self,
        before: &Definitions,
        after: &Definitions,
        ignore: &[ResourceSelector],
    ) -> Result<DiffResult> {
        let ignore_index = if ignore.is_empty() {
            None
        } else {
            Some(DefinitionsIndex::from_selectors(ignore)?)
        };

        let before = DefinitionsIndex::build(before, true, ignore_index.as_ref())?;
        let after = DefinitionsIndex::build(after, true, ignore_index.as_ref())?;

        Ok(self.compute(&before, &after))
    }

    /// Classifies every record of one kind.
    fn diff_kind(
        kind: ResourceKind,
        before: &DefinitionsIndex,
        after: &DefinitionsIndex,
        result: &mut DiffResult,
    ) {
        let mut remaining = before.set(kind).clone();

        for (identity, record) in after.set(kind).clone().into_entries() {
            match remaining.remove(&identity) {
                None => result.added.get_mut(kind).push(record),
                Some(previous) if previous == record => {
                    result.unaffected.get_mut(kind).push(record);
                }
                Some(previous) => result.changed.get_mut(kind).push(ChangedRecord {
                    before: previous,
                    after: record,
                }),
            }
        }

        result
            .deleted
            .get_mut(kind)
            .extend(remaining.into_entries().map(|(_, record)| record));
    }

    /// Finds unaffected bindings whose source or destination is a changed
    /// exchange or queue.
    fn implicitly_affected_bindings(result: &DiffResult) -> Vec<Record> {
        let changed_keys = |kind: ResourceKind| -> HashSet<(String, String)> {
            result
                .changed
                .get(kind)
                .iter()
                .filter_map(|c| vhost_and(&c.before, "name"))
                .collect()
        };
        let changed_exchanges = changed_keys(ResourceKind::Exchange);
        let changed_queues = changed_keys(ResourceKind::Queue);

        if changed_exchanges.is_empty() && changed_queues.is_empty() {
            return Vec::new();
        }

        result
            .unaffected
            .bindings
            .iter()
            .filter(|binding| {
                let source = vhost_and(binding, "source");
                let destination = vhost_and(binding, "destination");
                let destination_type = binding.get("destination_type").and_then(Value::as_str);

                let source_changed = source.is_some_and(|key| changed_exchanges.contains(&key));
                let destination_changed = destination.is_some_and(|key| match destination_type {
                    Some("exchange") => changed_exchanges.contains(&key),
                    Some("queue") => changed_queues.contains(&key),
                    _ => false,
                });

                source_changed || destination_changed
            })
            .cloned()
            .collect()
    }
}

/// Extracts `(vhost, record[field])` when both are strings.
fn vhost_and(record: &Record, field: &str) -> Option<(String, String)> {
    let vhost = record.get("vhost").and_then(Value::as_str)?;
    let value = record.get(field).and_then(Value::as_str)?;
    Some((vhost.to_string(), value.to_string()))
}

impl DiffResult {
    /// Number of added records.
    #[must_use]
    pub fn added_count(&self) -> usize {
        self.added.total()
    }

    /// Number of deleted records.
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted.total()
    }

    /// Number of changed records.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.changed.total()
    }

    /// Number of unaffected records.
    #[must_use]
    pub fn unaffected_count(&self) -> usize {
        self.unaffected.total()
    }

    /// Returns true if there are any changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.added_count() > 0 || self.deleted_count() > 0 || self.changed_count() > 0
    }

    /// Returns the total number of changes.
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.added_count() + self.deleted_count() + self.changed_count()
    }
}

impl std::fmt::Display for DiffResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} deleted, {} changed, {} unaffected",
            self.added_count(),
            self.deleted_count(),
            self.changed_count(),
            self.unaffected_count()
        )?;
        if !self.implicitly_affected.bindings.is_empty() {
            write!(
                f,
                " ({} bindings implicitly affected)",
                self.implicitly_affected.bindings.len()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defs(value: Value) -> Definitions {
        serde_json::from_value(value).expect("valid definitions")
    }

    fn record(value: Value) -> Record {
        value.as_object().expect("object").clone()
    }

    fn diff(before: Value, after: Value) -> DiffResult {
        DiffEngine::new()
            .diff_definitions(&defs(before), &defs(after), &[])
            .expect("diff")
    }

    fn sample() -> Value {
        json!({
            "vhosts": [{ "name": "/" }, { "name": "orders" }],
            "users": [{ "name": "app", "tags": "" }],
            "exchanges": [
                { "vhost": "/", "name": "ex1", "type": "topic", "durable": true },
                { "vhost": "orders", "name": "ex2", "type": "direct" }
            ],
            "queues": [{ "vhost": "/", "name": "q1" }, { "vhost": "orders", "name": "q2" }],
            "bindings": [{
                "vhost": "/", "source": "ex1", "destination": "q1",
                "destination_type": "queue", "routing_key": "a", "arguments": {}
            }],
            "permissions": [{ "vhost": "/", "user": "app", "configure": ".*", "write": ".*", "read": ".*" }],
            "topic_permissions": []
        })
    }

    fn other() -> Value {
        json!({
            "vhosts": [{ "name": "/" }, { "name": "billing" }],
            "users": [{ "name": "app", "tags": "monitoring" }, { "name": "ops" }],
            "exchanges": [{ "vhost": "/", "name": "ex1", "type": "topic", "durable": true }],
            "queues": [{ "vhost": "/", "name": "q1", "durable": true }, { "vhost": "billing", "name": "q3" }],
            "bindings": [],
            "permissions": [{ "vhost": "billing", "user": "ops", "configure": "", "write": "", "read": ".*" }],
            "topic_permissions": [{ "vhost": "/", "user": "app", "exchange": "ex1", "write": ".*", "read": ".*" }]
        })
    }

    #[test]
    fn test_queue_changed_scenario() {
        let result = diff(
            json!({ "queues": [{ "vhost": "/", "name": "q1" }] }),
            json!({ "queues": [{ "vhost": "/", "name": "q1", "durable": true }] }),
        );

        assert_eq!(
            result.changed.queues,
            vec![ChangedRecord {
                before: record(json!({ "vhost": "/", "name": "q1" })),
                after: record(json!({ "vhost": "/", "name": "q1", "durable": true })),
            }]
        );
        assert!(result.added.queues.is_empty());
        assert!(result.deleted.queues.is_empty());
        assert!(result.unaffected.queues.is_empty());
    }

    #[test]
    fn test_identity_diff_is_empty() {
        let result = diff(sample(), sample());

        assert!(!result.has_changes());
        assert_eq!(result.added_count(), 0);
        assert_eq!(result.deleted_count(), 0);
        assert_eq!(result.changed_count(), 0);
        assert_eq!(result.unaffected_count(), defs(sample()).total());
        assert!(result.implicitly_affected.bindings.is_empty());
    }

    #[test]
    fn test_diff_partitions_both_sides() {
        let before = defs(sample());
        let after = defs(other());
        let result = DiffEngine::new()
            .diff_definitions(&before, &after, &[])
            .expect("diff");

        for kind in ResourceKind::ALL {
            let changed = result.changed.get(kind).len();
            let unaffected = result.unaffected.get(kind).len();
            assert_eq!(
                result.added.get(kind).len() + changed + unaffected,
                after.get(kind).len(),
                "after side of {kind}"
            );
            assert_eq!(
                result.deleted.get(kind).len() + changed + unaffected,
                before.get(kind).len(),
                "before side of {kind}"
            );
        }
        assert_eq!(
            result.total_changes(),
            result.added_count() + result.deleted_count() + result.changed_count()
        );
    }

    #[test]
    fn test_added_and_deleted_are_symmetric() {
        let forward = diff(sample(), other());
        let backward = diff(other(), sample());

        assert_eq!(forward.added, backward.deleted);
        assert_eq!(forward.deleted, backward.added);
        assert_eq!(forward.changed_count(), backward.changed_count());
    }

    #[test]
    fn test_changed_exchange_implicitly_affects_binding() {
        let binding = json!({
            "vhost": "/", "source": "ex1", "destination": "q1",
            "destination_type": "queue", "routing_key": "", "arguments": {}
        });
        let result = diff(
            json!({
                "exchanges": [{ "vhost": "/", "name": "ex1", "type": "direct", "durable": true }],
                "queues": [{ "vhost": "/", "name": "q1" }],
                "bindings": [binding.clone()]
            }),
            json!({
                "exchanges": [{ "vhost": "/", "name": "ex1", "type": "direct" }],
                "queues": [{ "vhost": "/", "name": "q1" }],
                "bindings": [binding.clone()]
            }),
        );

        assert_eq!(result.changed.exchanges.len(), 1);
        assert_eq!(result.unaffected.bindings, vec![record(binding.clone())]);
        assert_eq!(result.implicitly_affected.bindings, vec![record(binding)]);
    }

    #[test]
    fn test_changed_queue_implicitly_affects_binding_to_it_only() {
        let to_q1 = json!({
            "vhost": "/", "source": "ex1", "destination": "q1",
            "destination_type": "queue", "routing_key": "", "arguments": {}
        });
        let to_q2 = json!({
            "vhost": "/", "source": "ex1", "destination": "q2",
            "destination_type": "queue", "routing_key": "", "arguments": {}
        });
        let result = diff(
            json!({
                "queues": [{ "vhost": "/", "name": "q1" }, { "vhost": "/", "name": "q2" }],
                "bindings": [to_q1.clone(), to_q2.clone()]
            }),
            json!({
                "queues": [
                    { "vhost": "/", "name": "q1", "arguments": { "x-queue-type": "quorum" } },
                    { "vhost": "/", "name": "q2" }
                ],
                "bindings": [to_q1.clone(), to_q2]
            }),
        );

        assert_eq!(result.implicitly_affected.bindings, vec![record(to_q1)]);
    }

    #[test]
    fn test_exchange_to_exchange_destination_detected() {
        let e2e = json!({
            "vhost": "/", "source": "upstream", "destination": "downstream",
            "destination_type": "exchange", "routing_key": "#", "arguments": {}
        });
        let result = diff(
            json!({
                "exchanges": [{ "vhost": "/", "name": "downstream", "type": "fanout" }],
                "bindings": [e2e.clone()]
            }),
            json!({
                "exchanges": [{ "vhost": "/", "name": "downstream", "type": "topic" }],
                "bindings": [e2e.clone()]
            }),
        );

        assert_eq!(result.implicitly_affected.bindings, vec![record(e2e)]);
    }

    #[test]
    fn test_changes_in_other_vhost_do_not_leak() {
        let binding = json!({
            "vhost": "/", "source": "ex1", "destination": "q1",
            "destination_type": "queue", "routing_key": "", "arguments": {}
        });
        let result = diff(
            json!({
                "exchanges": [{ "vhost": "other", "name": "ex1", "durable": true }],
                "bindings": [binding.clone()]
            }),
            json!({
                "exchanges": [{ "vhost": "other", "name": "ex1", "durable": false }],
                "bindings": [binding]
            }),
        );

        assert_eq!(result.changed.exchanges.len(), 1);
        assert!(result.implicitly_affected.bindings.is_empty());
    }

    #[test]
    fn test_inputs_left_untouched() {
        let before = DefinitionsIndex::build(&defs(sample()), true, None).expect("index");
        let after = DefinitionsIndex::build(&defs(other()), true, None).expect("index");
        let (before_len, after_len) = (before.len(), after.len());

        let engine = DiffEngine::new();
        let first = engine.compute(&before, &after);
        let second = engine.compute(&before, &after);

        assert_eq!(before.len(), before_len);
        assert_eq!(after.len(), after_len);
        assert_eq!(first, second);
    }

    #[test]
    fn test_ignored_resources_never_diffed() {
        let result = DiffEngine::new()
            .diff_definitions(
                &defs(json!({ "queues": [{ "vhost": "/", "name": "scratch", "durable": false }] })),
                &defs(json!({ "queues": [] })),
                &[ResourceSelector {
                    vhost: String::from("/"),
                    exchange: None,
                    queue: Some(String::from("scratch")),
                }],
            )
            .expect("diff");

        assert!(!result.has_changes());
        assert_eq!(result.unaffected_count(), 0);
    }

    #[test]
    fn test_serialized_shape() {
        let result = diff(json!({}), json!({ "vhosts": [{ "name": "/" }] }));
        let value = serde_json::to_value(&result).expect("serialize");

        assert_eq!(value["added"]["vhosts"][0]["name"], "/");
        assert!(value.get("implicitlyAffected").is_some());
        assert!(value.get("unaffected").is_none());
    }
}
