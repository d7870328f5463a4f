//! Transport abstraction over the broker management API.

use async_trait::async_trait;
use serde_json::Value;

use crate::definitions::Definitions;
use crate::error::{BrokerError, Result};

/// HTTP methods used against the management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Read.
    Get,
    /// Create or overwrite.
    Put,
    /// Create (bindings).
    Post,
    /// Remove.
    Delete,
}

impl HttpMethod {
    /// Returns true if the method changes broker state.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

/// Issues requests against the broker management API.
///
/// Implementations own authentication, base-URL resolution and retries. In
/// dry-run mode they must log mutating requests instead of sending them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request to `path` (percent-encoded, rooted at `/api/`).
    ///
    /// Returns the decoded JSON body, or `None` for an empty response.
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>>;

    /// Returns true if mutating requests are suppressed.
    fn is_dry_run(&self) -> bool;
}

/// Path of the definitions export endpoint.
pub const DEFINITIONS_PATH: &str = "/api/definitions";

/// Fetches the broker's current definitions.
///
/// # Errors
///
/// Returns an error if the request fails or the response is not a
/// definitions document.
pub async fn fetch_definitions<T: Transport + ?Sized>(transport: &T) -> Result<Definitions> {
    let body = transport
        .request(HttpMethod::Get, DEFINITIONS_PATH, None)
        .await?
        .ok_or_else(|| BrokerError::InvalidResponse {
            message: String::from("Empty definitions response"),
        })?;
    Definitions::check_sections(&body)?;

    serde_json::from_value(body).map_err(|e| {
        BrokerError::InvalidResponse {
            message: format!("Failed to parse definitions: {e}"),
        }
        .into()
    })
}
