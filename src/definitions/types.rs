//! Definitions snapshot types.
//!
//! A definitions snapshot is the JSON document a broker exports (or an
//! operator declares): seven optional arrays of flat records using the
//! broker's own field names. Records are kept as JSON objects; only the
//! identity fields of each kind are interpreted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DefinitionsError, Result};

/// A single resource record (a flat JSON object).
pub type Record = serde_json::Map<String, Value>;

/// A raw definitions snapshot.
pub type Definitions = ResourceMap<Value>;

/// The resource kinds a definitions snapshot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Namespace partition.
    Vhost,
    /// Broker user.
    User,
    /// Routing primitive scoped to a vhost.
    Exchange,
    /// Storage primitive scoped to a vhost.
    Queue,
    /// Routing rule from an exchange to a queue or exchange.
    Binding,
    /// Access grant of a user within a vhost.
    Permission,
    /// Topic access grant of a user within a vhost.
    TopicPermission,
}

impl ResourceKind {
    /// All kinds, in the order they are diffed.
    pub const ALL: [Self; 7] = [
        Self::Vhost,
        Self::Queue,
        Self::Exchange,
        Self::Binding,
        Self::User,
        Self::Permission,
        Self::TopicPermission,
    ];

    /// Name of the definitions section holding this kind.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Vhost => "vhosts",
            Self::User => "users",
            Self::Exchange => "exchanges",
            Self::Queue => "queues",
            Self::Binding => "bindings",
            Self::Permission => "permissions",
            Self::TopicPermission => "topic_permissions",
        }
    }

    /// Fields forming the natural identity of a record of this kind.
    ///
    /// Bindings additionally include their `arguments`, compared
    /// structurally.
    #[must_use]
    pub const fn identity_fields(self) -> &'static [&'static str] {
        match self {
            Self::Vhost | Self::User => &["name"],
            Self::Exchange | Self::Queue => &["vhost", "name"],
            Self::Permission | Self::TopicPermission => &["vhost", "user"],
            Self::Binding => &[
                "vhost",
                "source",
                "destination",
                "destination_type",
                "routing_key",
            ],
        }
    }

    /// Short human-readable description of a record, built from whatever
    /// identity fields it carries.
    #[must_use]
    pub fn describe(self, record: &Record) -> String {
        let field = |name: &str| record.get(name).and_then(Value::as_str).unwrap_or("?");

        match self {
            Self::Vhost | Self::User => field("name").to_string(),
            Self::Exchange | Self::Queue => format!("{}/{}", field("vhost"), field("name")),
            Self::Permission | Self::TopicPermission => {
                format!("{}@{}", field("user"), field("vhost"))
            }
            Self::Binding => {
                let routing_key = field("routing_key");
                format!(
                    "{}: {} -> {} {}{}",
                    field("vhost"),
                    field("source"),
                    field("destination_type"),
                    field("destination"),
                    if routing_key.is_empty() {
                        String::new()
                    } else {
                        format!(" [{routing_key}]")
                    }
                )
            }
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Vhost => "vhost",
            Self::User => "user",
            Self::Exchange => "exchange",
            Self::Queue => "queue",
            Self::Binding => "binding",
            Self::Permission => "permission",
            Self::TopicPermission => "topic permission",
        };
        write!(f, "{s}")
    }
}

/// One sequence per resource kind.
///
/// Used both for raw snapshots (`ResourceMap<Value>`) and for classified
/// diff output (`ResourceMap<Record>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMap<T> {
    /// Vhost records.
    #[serde(default)]
    pub vhosts: Vec<T>,
    /// User records.
    #[serde(default)]
    pub users: Vec<T>,
    /// Exchange records.
    #[serde(default)]
    pub exchanges: Vec<T>,
    /// Queue records.
    #[serde(default)]
    pub queues: Vec<T>,
    /// Binding records.
    #[serde(default)]
    pub bindings: Vec<T>,
    /// Permission records.
    #[serde(default)]
    pub permissions: Vec<T>,
    /// Topic permission records.
    #[serde(default)]
    pub topic_permissions: Vec<T>,
}

impl<T> Default for ResourceMap<T> {
    fn default() -> Self {
        Self {
            vhosts: Vec::new(),
            users: Vec::new(),
            exchanges: Vec::new(),
            queues: Vec::new(),
            bindings: Vec::new(),
            permissions: Vec::new(),
            topic_permissions: Vec::new(),
        }
    }
}

impl<T> ResourceMap<T> {
    /// Returns the sequence for a kind.
    #[must_use]
    pub fn get(&self, kind: ResourceKind) -> &[T] {
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

    /// Returns the mutable sequence for a kind.
    pub const fn get_mut(&mut self, kind: ResourceKind) -> &mut Vec<T> {
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

    /// Total number of entries across all kinds.
    #[must_use]
    pub fn total(&self) -> usize {
        ResourceKind::ALL.iter().map(|kind| self.get(*kind).len()).sum()
    }

    /// Returns true if no kind has any entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl Definitions {
    /// Checks that every resource section present in a JSON document is an
    /// array.
    ///
    /// Unknown top-level keys and non-object documents are left for
    /// deserialization to judge.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionsError::InvalidSection`] naming the first section
    /// that is not an array.
    pub fn check_sections(document: &Value) -> Result<()> {
        let Some(object) = document.as_object() else {
            return Ok(());
        };
        for kind in ResourceKind::ALL {
            if object.get(kind.section()).is_some_and(|section| !section.is_array()) {
                return Err(DefinitionsError::InvalidSection {
                    section: kind.section().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Selects a vhost, or an exchange and/or queue inside a vhost.
///
/// Used for ignore lists and for observed-usage records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceSelector {
    /// Vhost name.
    pub vhost: String,
    /// Exchange name, if the selector targets an exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    /// Queue name, if the selector targets a queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
}

impl ResourceSelector {
    /// Expands the selector into the definitions records it names.
    ///
    /// A bare vhost selector names the vhost itself; otherwise it names the
    /// exchange and/or queue it carries.
    #[must_use]
    pub fn to_definitions(&self) -> Definitions {
        let mut definitions = Definitions::default();

        if self.exchange.is_none() && self.queue.is_none() {
            definitions
                .vhosts
                .push(serde_json::json!({ "name": self.vhost }));
        }
        if let Some(exchange) = &self.exchange {
            definitions
                .exchanges
                .push(serde_json::json!({ "vhost": self.vhost, "name": exchange }));
        }
        if let Some(queue) = &self.queue {
            definitions
                .queues
                .push(serde_json::json!({ "vhost": self.vhost, "name": queue }));
        }

        definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrokerDefsError;
    use serde_json::json;

    #[test]
    fn test_check_sections_rejects_non_array_section() {
        let err = Definitions::check_sections(&json!({
            "vhosts": [{ "name": "/" }],
            "queues": { "vhost": "/", "name": "q1" }
        }))
        .expect_err("queues is an object");

        assert!(matches!(
            err,
            BrokerDefsError::Definitions(DefinitionsError::InvalidSection { ref section })
                if section == "queues"
        ));
    }

    #[test]
    fn test_check_sections_ignores_unknown_keys() {
        assert!(
            Definitions::check_sections(&json!({
                "rabbit_version": "3.13.0",
                "parameters": {},
                "topic_permissions": []
            }))
            .is_ok()
        );
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let definitions: Definitions =
            serde_json::from_value(json!({ "queues": [{ "vhost": "/", "name": "q1" }] }))
                .expect("valid definitions");

        assert_eq!(definitions.queues.len(), 1);
        assert!(definitions.vhosts.is_empty());
        assert!(definitions.topic_permissions.is_empty());
        assert_eq!(definitions.total(), 1);
    }

    #[test]
    fn test_unknown_top_level_fields_are_ignored() {
        let definitions: Definitions = serde_json::from_value(json!({
            "rabbit_version": "3.12.0",
            "policies": [],
            "vhosts": [{ "name": "/" }]
        }))
        .expect("valid definitions");

        assert_eq!(definitions.vhosts.len(), 1);
    }

    #[test]
    fn test_describe_binding() {
        let record = json!({
            "vhost": "/",
            "source": "ex1",
            "destination": "q1",
            "destination_type": "queue",
            "routing_key": "orders.*"
        });
        let record = record.as_object().expect("object").clone();

        assert_eq!(
            ResourceKind::Binding.describe(&record),
            "/: ex1 -> queue q1 [orders.*]"
        );
    }

    #[test]
    fn test_selector_expansion() {
        let vhost_only = ResourceSelector {
            vhost: String::from("legacy"),
            exchange: None,
            queue: None,
        };
        assert_eq!(vhost_only.to_definitions().vhosts.len(), 1);

        let both = ResourceSelector {
            vhost: String::from("/"),
            exchange: Some(String::from("ex1")),
            queue: Some(String::from("q1")),
        };
        let definitions = both.to_definitions();
        assert!(definitions.vhosts.is_empty());
        assert_eq!(definitions.exchanges.len(), 1);
        assert_eq!(definitions.queues.len(), 1);
    }
}
