//! Management API endpoints.
//!
//! Maps every `(Operation, ResourceKind)` pair to an HTTP method and path.
//! The match is exhaustive, so adding an operation or a kind does not
//! compile until each pair is either mapped or explicitly rejected.

use serde_json::{Value, json};
use tracing::warn;

use crate::definitions::{Record, ResourceKind};
use crate::error::{PlanError, Result};
use crate::planner::Operation;

use super::transport::HttpMethod;

/// Placeholder the management API accepts for an empty properties key.
const EMPTY_PROPERTIES_KEY: &str = "~";

/// A fully resolved request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Percent-encoded path rooted at `/api/`.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<Value>,
}

/// Resolves the request that applies `operation` to a record of `kind`.
///
/// # Errors
///
/// Returns an error if the broker cannot apply the operation to the kind in
/// place (exchanges, queues and bindings are never updated), if a path field
/// is missing, or if a binding has an unknown destination type.
pub fn resolve(operation: Operation, kind: ResourceKind, record: &Record) -> Result<ApiRequest> {
    let field = |name: &str| path_field(kind, record, name);

    let (method, path, body) = match (operation, kind) {
        (Operation::Create | Operation::Update, ResourceKind::Vhost) => (
            HttpMethod::Put,
            format!("/api/vhosts/{}", field("name")?),
            Some(Value::Object(record.clone())),
        ),
        (Operation::Create | Operation::Update, ResourceKind::User) => (
            HttpMethod::Put,
            format!("/api/users/{}", field("name")?),
            Some(Value::Object(record.clone())),
        ),
        (Operation::Create, ResourceKind::Exchange) => (
            HttpMethod::Put,
            format!("/api/exchanges/{}/{}", field("vhost")?, field("name")?),
            Some(Value::Object(record.clone())),
        ),
        (Operation::Create, ResourceKind::Queue) => (
            HttpMethod::Put,
            format!("/api/queues/{}/{}", field("vhost")?, field("name")?),
            Some(Value::Object(record.clone())),
        ),
        (Operation::Create, ResourceKind::Binding) => (
            HttpMethod::Post,
            binding_base_path(record)?,
            Some(json!({
                "routing_key": record.get("routing_key").cloned().unwrap_or_else(|| json!("")),
                "arguments": record.get("arguments").cloned().unwrap_or_else(|| json!({})),
            })),
        ),
        (Operation::Create | Operation::Update, ResourceKind::Permission) => (
            HttpMethod::Put,
            format!("/api/permissions/{}/{}", field("vhost")?, field("user")?),
            Some(Value::Object(record.clone())),
        ),
        (Operation::Create | Operation::Update, ResourceKind::TopicPermission) => (
            HttpMethod::Put,
            format!("/api/topic-permissions/{}/{}", field("vhost")?, field("user")?),
            Some(Value::Object(record.clone())),
        ),
        (Operation::Update, ResourceKind::Exchange | ResourceKind::Queue | ResourceKind::Binding) => {
            return Err(PlanError::UnsupportedOperation {
                operation: operation.to_string(),
                kind: kind.to_string(),
            }
            .into());
        }
        (Operation::Delete, ResourceKind::Vhost) => (
            HttpMethod::Delete,
            format!("/api/vhosts/{}", field("name")?),
            None,
        ),
        (Operation::Delete, ResourceKind::User) => (
            HttpMethod::Delete,
            format!("/api/users/{}", field("name")?),
            None,
        ),
        (Operation::Delete, ResourceKind::Exchange) => (
            HttpMethod::Delete,
            format!("/api/exchanges/{}/{}", field("vhost")?, field("name")?),
            None,
        ),
        (Operation::Delete, ResourceKind::Queue) => (
            HttpMethod::Delete,
            format!("/api/queues/{}/{}", field("vhost")?, field("name")?),
            None,
        ),
        (Operation::Delete, ResourceKind::Binding) => (
            HttpMethod::Delete,
            format!("{}/{}", binding_base_path(record)?, properties_key(record)),
            None,
        ),
        (Operation::Delete, ResourceKind::Permission) => (
            HttpMethod::Delete,
            format!("/api/permissions/{}/{}", field("vhost")?, field("user")?),
            None,
        ),
        (Operation::Delete, ResourceKind::TopicPermission) => (
            HttpMethod::Delete,
            format!("/api/topic-permissions/{}/{}", field("vhost")?, field("user")?),
            None,
        ),
    };

    Ok(ApiRequest { method, path, body })
}

/// `/api/bindings/{vhost}/e/{source}/{q|e}/{destination}`.
fn binding_base_path(record: &Record) -> Result<String> {
    let field = |name: &str| path_field(ResourceKind::Binding, record, name);

    let destination_type = record
        .get("destination_type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let type_char = match destination_type {
        "queue" => "q",
        "exchange" => "e",
        other => {
            return Err(PlanError::InvalidDestinationType {
                value: other.to_string(),
            }
            .into());
        }
    };

    Ok(format!(
        "/api/bindings/{}/e/{}/{type_char}/{}",
        field("vhost")?,
        field("source")?,
        field("destination")?
    ))
}

/// Properties key identifying a binding for deletion.
///
/// Uses the broker-supplied key when the record has one. Without it, a
/// binding without arguments is addressed by its routing key (`~` when
/// empty). A binding with arguments cannot be addressed precisely; `~` is
/// used and the ambiguity logged.
fn properties_key(record: &Record) -> String {
    if let Some(key) = record.get("properties_key").and_then(Value::as_str) {
        return encode_segment(key);
    }

    let has_arguments = record
        .get("arguments")
        .and_then(Value::as_object)
        .is_some_and(|arguments| !arguments.is_empty());
    let routing_key = record
        .get("routing_key")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if has_arguments {
        warn!(
            "Binding {} has arguments but no properties_key; deleting with '{EMPTY_PROPERTIES_KEY}' may target the wrong binding",
            ResourceKind::Binding.describe(record)
        );
        return String::from(EMPTY_PROPERTIES_KEY);
    }

    if routing_key.is_empty() {
        String::from(EMPTY_PROPERTIES_KEY)
    } else {
        encode_segment(routing_key)
    }
}

/// Reads a string field and percent-encodes it as a path segment.
fn path_field(kind: ResourceKind, record: &Record, name: &str) -> Result<String> {
    record
        .get(name)
        .and_then(Value::as_str)
        .map(encode_segment)
        .ok_or_else(|| {
            PlanError::MissingField {
                kind: kind.to_string(),
                field: name.to_string(),
            }
            .into()
        })
}

/// Percent-encodes everything but RFC 3986 unreserved characters.
#[must_use]
pub fn encode_segment(raw: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(char::from(byte));
            }
            _ => {
                out.push('%');
                out.push(char::from(HEX[usize::from(byte >> 4)]));
                out.push(char::from(HEX[usize::from(byte & 0x0F)]));
            }
        }
    }
    out
}
