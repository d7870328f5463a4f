//! Management API client implementation.
//!
//! This module provides the HTTP client for the broker's management API.

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::config::BrokerConfig;
use crate::error::{BrokerDefsError, BrokerError, Result};

use super::transport::{HttpMethod, Transport};

/// Default delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Broker management API client.
#[derive(Debug, Clone)]
pub struct ManagementClient {
    /// HTTP client.
    client: Client,
    /// Base URL without trailing slash.
    base_url: String,
    /// Basic auth user.
    username: String,
    /// Basic auth password.
    password: String,
    /// Suppress mutating requests.
    dry_run: bool,
    /// Attempts per request, including the first.
    max_retries: u32,
    /// Base delay between attempts; grows linearly.
    retry_delay: Duration,
}

impl ManagementClient {
    /// Creates a new client from broker settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BrokerError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            dry_run: false,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Enables or disables dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Overrides the base delay between retries.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Executes a request, retrying transient failures.
    async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {} for {method} {path}", self.max_retries);
                tokio::time::sleep(self.retry_delay.saturating_mul(attempt)).await;
            }

            match self.execute_once(method, path, body).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BrokerDefsError::Broker(BrokerError::NetworkError {
                message: String::from("Max retries exceeded"),
            })
        }))
    }

    /// Executes a single request.
    async fn execute_once(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        trace!("{method} {path}");

        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .client
            .request(to_reqwest(method), &url)
            .basic_auth(&self.username, Some(&self.password))
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BrokerError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(BrokerError::AuthenticationFailed {
                message: format!("{status} for {method} {path}"),
            }
            .into());
        }

        if status.as_u16() == 404 {
            return Err(BrokerError::NotFound {
                path: path.to_string(),
            }
            .into());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::api_error(status.as_u16(), body).into());
        }

        let text = response
            .text()
            .await
            .map_err(|e| BrokerError::network(format!("Failed to read response: {e}")))?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&text).map(Some).map_err(|e| {
            BrokerError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            }
            .into()
        })
    }
}

#[async_trait]
impl Transport for ManagementClient {
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        if self.dry_run && method.is_mutating() {
            match &body {
                Some(body) => info!("[dry-run] {method} {path} {body}"),
                None => info!("[dry-run] {method} {path}"),
            }
            return Ok(None);
        }

        self.execute(method, path, body.as_ref()).await
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

const fn to_reqwest(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Post => Method::POST,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, max_retries: u32) -> ManagementClient {
        let config = BrokerConfig {
            url: format!("{}/", server.uri()),
            max_retries,
            ..BrokerConfig::default()
        };
        ManagementClient::new(&config)
            .expect("client")
            .with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_get_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/definitions"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "vhosts": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let body = client(&server, 1)
            .request(HttpMethod::Get, "/api/definitions", None)
            .await
            .expect("request");

        assert_eq!(body, Some(json!({ "vhosts": [] })));
    }

    #[tokio::test]
    async fn test_put_sends_body_and_accepts_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/queues/%2F/q1"))
            .and(body_json(json!({ "durable": true })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let body = client(&server, 1)
            .request(HttpMethod::Put, "/api/queues/%2F/q1", Some(json!({ "durable": true })))
            .await
            .expect("request");

        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(path("/api/users/nobody"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/api/whoami"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(path("/api/queues/%2F/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string("inequivalent arg 'durable'"))
            .mount(&server)
            .await;
        let client = client(&server, 1);

        let not_found = client
            .request(HttpMethod::Delete, "/api/users/nobody", None)
            .await
            .expect_err("404");
        assert!(matches!(not_found, BrokerDefsError::Broker(BrokerError::NotFound { .. })));

        let auth = client
            .request(HttpMethod::Get, "/api/whoami", None)
            .await
            .expect_err("401");
        assert!(matches!(
            auth,
            BrokerDefsError::Broker(BrokerError::AuthenticationFailed { .. })
        ));

        let rejected = client
            .request(HttpMethod::Put, "/api/queues/%2F/bad", Some(json!({})))
            .await
            .expect_err("400");
        assert!(rejected.to_string().contains("inequivalent arg"));
        assert!(!rejected.is_retryable());
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(path("/api/vhosts/v1"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, 3)
            .request(HttpMethod::Put, "/api/vhosts/v1", Some(json!({})))
            .await
            .expect_err("503");

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_dry_run_skips_mutating_requests() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        let client = client(&server, 1).with_dry_run(true);

        assert!(client.is_dry_run());
        let put = client
            .request(HttpMethod::Put, "/api/vhosts/v1", Some(json!({})))
            .await
            .expect("dry-run put");
        assert!(put.is_none());

        let get = client
            .request(HttpMethod::Get, "/api/definitions", None)
            .await
            .expect("get");
        assert_eq!(get, Some(json!({})));
    }
}
