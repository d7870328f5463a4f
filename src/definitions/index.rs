//! Identity-based indexing of definitions snapshots.
//!
//! Every record is keyed by the natural identity of its kind (see
//! [`ResourceKind::identity_fields`]). Identity fields never change once a
//! record is indexed; every other field only takes part in change detection.

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{DefinitionsError, Result};

use super::hash::canonical_json;
use super::set::ContentSet;
use super::types::{Definitions, Record, ResourceKind, ResourceSelector};

/// Natural identity of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    kind: ResourceKind,
    parts: Vec<String>,
}

impl Identity {
    /// Creates an identity from its parts, in the order of
    /// [`ResourceKind::identity_fields`].
    #[must_use]
    pub const fn new(kind: ResourceKind, parts: Vec<String>) -> Self {
        Self { kind, parts }
    }

    /// Computes the identity of a record.
    ///
    /// `index` is the record's position in its section, used for error
    /// reporting only.
    ///
    /// # Errors
    ///
    /// Returns an error if an identity field is missing or is not a string,
    /// or if binding arguments are present but not an object.
    pub fn from_record(
        kind: ResourceKind,
        record: &Record,
        index: usize,
    ) -> std::result::Result<Self, DefinitionsError> {
        let mut parts = Vec::with_capacity(kind.identity_fields().len() + 1);

        for field in kind.identity_fields() {
            let value = record
                .get(*field)
                .and_then(Value::as_str)
                .ok_or_else(|| DefinitionsError::MissingIdentityField {
                    kind: kind.to_string(),
                    field: (*field).to_string(),
                    index,
                })?;
            parts.push(value.to_string());
        }

        if kind == ResourceKind::Binding {
            let arguments = match record.get("arguments") {
                None | Some(Value::Null) => String::from("{}"),
                Some(arguments @ Value::Object(_)) => canonical_json(arguments),
                Some(_) => {
                    return Err(DefinitionsError::MissingIdentityField {
                        kind: kind.to_string(),
                        field: String::from("arguments"),
                        index,
                    });
                }
            };
            parts.push(arguments);
        }

        Ok(Self { kind, parts })
    }

    /// Resource kind of the identity.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Identity parts, in the order of [`ResourceKind::identity_fields`].
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.kind, self.parts.join(", "))
    }
}

/// Indexed definitions: one [`ContentSet`] per resource kind.
#[derive(Debug, Clone, Default)]
pub struct DefinitionsIndex {
    vhosts: ContentSet,
    users: ContentSet,
    exchanges: ContentSet,
    queues: ContentSet,
    bindings: ContentSet,
    permissions: ContentSet,
    topic_permissions: ContentSet,
}

impl DefinitionsIndex {
    /// Builds an index from a definitions snapshot.
    ///
    /// When `include_implicit` is false, the broker's predeclared exchanges
    /// (the default `""` exchange and `amq.*`) are left out. Records whose
    /// identity is present in `ignore` are skipped entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if a record is not an object or lacks an identity
    /// field.
    pub fn build(
        definitions: &Definitions,
        include_implicit: bool,
        ignore: Option<&Self>,
    ) -> Result<Self> {
        let mut index = Self::default();
        let mut ignored = 0usize;

        for kind in ResourceKind::ALL {
            for (position, value) in definitions.get(kind).iter().enumerate() {
                let record = value.as_object().ok_or_else(|| DefinitionsError::NotAnObject {
                    kind: kind.to_string(),
                    index: position,
                })?;
                let identity = Identity::from_record(kind, record, position)?;

                if ignore.is_some_and(|ignore| ignore.contains(&identity)) {
                    trace!("Ignoring {identity}");
                    ignored += 1;
                    continue;
                }

                if !include_implicit && is_implicit(kind, record) {
                    continue;
                }

                if index.set_mut(kind).insert(identity, record.clone()).is_some() {
                    debug!("Duplicate {kind} {}, keeping the last one", kind.describe(record));
                }
            }
        }

        debug!("Indexed {} records ({ignored} ignored)", index.len());
        Ok(index)
    }

    /// Builds an ignore index from a flat list of selectors.
    ///
    /// # Errors
    ///
    /// Never fails for well-formed selectors; the error path is shared with
    /// [`Self::build`].
    pub fn from_selectors(selectors: &[ResourceSelector]) -> Result<Self> {
        let mut definitions = Definitions::default();
        for selector in selectors {
            let expanded = selector.to_definitions();
            for kind in ResourceKind::ALL {
                definitions
                    .get_mut(kind)
                    .extend(expanded.get(kind).iter().cloned());
            }
        }
        Self::build(&definitions, true, None)
    }

    /// Returns the set for a kind.
    #[must_use]
    pub const fn set(&self, kind: ResourceKind) -> &ContentSet {
        match kind {
            ResourceKind::Vhost => &self.vhosts,
            ResourceKind::User => &self.users,
            ResourceKind::Exchange => &self.exchanges,
            ResourceKind::Queue => &self.queues,
            ResourceKind::Binding => &self.bindings,
            ResourceKind::Permission => &self.permissions,
            ResourceKind::TopicPermission => &self.topic_permissions,
        }
    }

    const fn set_mut(&mut self, kind: ResourceKind) -> &mut ContentSet {
        match kind {
            ResourceKind::Vhost => &mut self.vhosts,
            ResourceKind::User => &mut self.users,
            ResourceKind::Exchange => &mut self.exchanges,
            ResourceKind::Queue => &mut self.queues,
            ResourceKind::Binding => &mut self.bindings,
            ResourceKind::Permission => &mut self.permissions,
            ResourceKind::TopicPermission => &mut self.topic_permissions,
        }
    }

    /// Returns true if a record with this identity is indexed.
    #[must_use]
    pub fn contains(&self, identity: &Identity) -> bool {
        self.set(identity.kind()).contains(identity)
    }

    /// Looks up a record by identity.
    #[must_use]
    pub fn get(&self, identity: &Identity) -> Option<&Record> {
        self.set(identity.kind()).get(identity)
    }

    /// Total number of indexed records.
    #[must_use]
    pub fn len(&self) -> usize {
        ResourceKind::ALL.iter().map(|kind| self.set(*kind).len()).sum()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns true for exchanges every broker predeclares.
fn is_implicit(kind: ResourceKind, record: &Record) -> bool {
    kind == ResourceKind::Exchange
        && record
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| name.is_empty() || name.starts_with("amq."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definitions(value: Value) -> Definitions {
        serde_json::from_value(value).expect("valid definitions")
    }

    #[test]
    fn test_build_indexes_every_kind() {
        let defs = definitions(json!({
            "vhosts": [{ "name": "/" }],
            "users": [{ "name": "admin", "tags": "administrator" }],
            "exchanges": [{ "vhost": "/", "name": "ex1", "type": "topic" }],
            "queues": [{ "vhost": "/", "name": "q1" }],
            "bindings": [{
                "vhost": "/", "source": "ex1", "destination": "q1",
                "destination_type": "queue", "routing_key": "a.b", "arguments": {}
            }],
            "permissions": [{ "vhost": "/", "user": "admin", "configure": ".*" }],
            "topic_permissions": [{ "vhost": "/", "user": "admin", "exchange": "ex1" }]
        }));

        let index = DefinitionsIndex::build(&defs, true, None).expect("index");

        assert_eq!(index.len(), 7);
        for kind in ResourceKind::ALL {
            assert_eq!(index.set(kind).len(), 1, "{kind}");
        }
    }

    #[test]
    fn test_missing_identity_field_is_fatal() {
        let defs = definitions(json!({ "queues": [{ "name": "q1" }] }));

        let err = DefinitionsIndex::build(&defs, true, None).expect_err("missing vhost");
        assert!(err.to_string().contains("vhost"));
    }

    #[test]
    fn test_non_object_record_is_fatal() {
        let defs = definitions(json!({ "vhosts": ["/"] }));

        assert!(DefinitionsIndex::build(&defs, true, None).is_err());
    }

    #[test]
    fn test_binding_arguments_compared_structurally() {
        let a = json!({
            "vhost": "/", "source": "ex", "destination": "q", "destination_type": "queue",
            "routing_key": "", "arguments": { "x-match": "all", "format": "pdf" }
        });
        let b = json!({
            "vhost": "/", "source": "ex", "destination": "q", "destination_type": "queue",
            "routing_key": "", "arguments": { "format": "pdf", "x-match": "all" }
        });
        let c = json!({
            "vhost": "/", "source": "ex", "destination": "q", "destination_type": "queue",
            "routing_key": "", "arguments": { "format": "zip", "x-match": "all" }
        });

        let id = |v: &Value| {
            Identity::from_record(ResourceKind::Binding, v.as_object().expect("object"), 0)
                .expect("identity")
        };

        assert_eq!(id(&a), id(&b));
        assert_ne!(id(&a), id(&c));
    }

    #[test]
    fn test_absent_binding_arguments_equal_empty_object() {
        let with_args = json!({
            "vhost": "/", "source": "ex", "destination": "q", "destination_type": "queue",
            "routing_key": "k", "arguments": {}
        });
        let without_args = json!({
            "vhost": "/", "source": "ex", "destination": "q", "destination_type": "queue",
            "routing_key": "k"
        });

        let a = Identity::from_record(ResourceKind::Binding, with_args.as_object().expect("object"), 0)
            .expect("identity");
        let b = Identity::from_record(ResourceKind::Binding, without_args.as_object().expect("object"), 0)
            .expect("identity");
        assert_eq!(a, b);
    }

    #[test]
    fn test_ignore_index_skips_matching_records() {
        let defs = definitions(json!({
            "vhosts": [{ "name": "/" }, { "name": "legacy" }],
            "queues": [{ "vhost": "/", "name": "q1" }, { "vhost": "/", "name": "scratch" }],
            "exchanges": [{ "vhost": "/", "name": "ex1" }]
        }));
        let ignore = DefinitionsIndex::from_selectors(&[
            ResourceSelector { vhost: String::from("legacy"), exchange: None, queue: None },
            ResourceSelector {
                vhost: String::from("/"),
                exchange: None,
                queue: Some(String::from("scratch")),
            },
        ])
        .expect("ignore index");

        let index = DefinitionsIndex::build(&defs, true, Some(&ignore)).expect("index");

        assert_eq!(index.set(ResourceKind::Vhost).len(), 1);
        assert_eq!(index.set(ResourceKind::Queue).len(), 1);
        assert_eq!(index.set(ResourceKind::Exchange).len(), 1);
        let scratch = Identity::new(
            ResourceKind::Queue,
            vec![String::from("/"), String::from("scratch")],
        );
        assert!(!index.contains(&scratch));
    }

    #[test]
    fn test_implicit_exchanges_excluded_on_request() {
        let defs = definitions(json!({
            "exchanges": [
                { "vhost": "/", "name": "" },
                { "vhost": "/", "name": "amq.topic" },
                { "vhost": "/", "name": "orders" }
            ]
        }));

        let with_implicit = DefinitionsIndex::build(&defs, true, None).expect("index");
        let without_implicit = DefinitionsIndex::build(&defs, false, None).expect("index");

        assert_eq!(with_implicit.set(ResourceKind::Exchange).len(), 3);
        assert_eq!(without_implicit.set(ResourceKind::Exchange).len(), 1);
    }

    #[test]
    fn test_identity_display() {
        let id = Identity::new(
            ResourceKind::Queue,
            vec![String::from("/"), String::from("q1")],
        );
        assert_eq!(id.to_string(), "queue[/, q1]");
        assert_eq!(id.parts().len(), 2);
    }
}
