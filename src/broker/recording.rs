//! In-memory transport recording every request, for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::definitions::Definitions;
use crate::error::{BrokerError, Result};

use super::transport::{DEFINITIONS_PATH, HttpMethod, Transport};

/// Records calls in dispatch order; serves fixed live definitions on GET.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    live: Definitions,
    failing: HashSet<String>,
    dry_run: bool,
    calls: Mutex<Vec<(HttpMethod, String)>>,
}

impl RecordingTransport {
    /// Transport serving `live` as the broker's current definitions.
    pub fn new(live: Definitions) -> Self {
        Self {
            live,
            ..Self::default()
        }
    }

    /// Requests to `path` fail with a 400.
    pub fn failing_on(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    /// Mutating requests are dropped without being recorded.
    pub const fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Mutating calls as `"METHOD path"`, in dispatch order.
    pub fn mutations(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|(method, _)| method.is_mutating())
            .map(|(method, path)| format!("{method} {path}"))
            .collect()
    }

    /// Number of read requests.
    pub fn reads(&self) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|(method, _)| !method.is_mutating())
            .count()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        _body: Option<Value>,
    ) -> Result<Option<Value>> {
        if self.dry_run && method.is_mutating() {
            return Ok(None);
        }

        self.calls
            .lock()
            .expect("lock")
            .push((method, path.to_string()));

        if self.failing.contains(path) {
            return Err(BrokerError::api_error(400, format!("rejected {path}")).into());
        }
        if method == HttpMethod::Get && path == DEFINITIONS_PATH {
            return Ok(Some(serde_json::to_value(&self.live).expect("serialize")));
        }
        Ok(None)
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
