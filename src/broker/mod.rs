//! Broker management API integration.
//!
//! This module provides:
//! - The transport abstraction the executor dispatches through
//! - The endpoint table mapping operations to HTTP requests
//! - An HTTP client with retries and dry-run support

mod client;
mod endpoint;
#[cfg(test)]
mod recording;
mod transport;

pub use client::ManagementClient;
pub use endpoint::{ApiRequest, encode_segment, resolve};
pub use transport::{DEFINITIONS_PATH, HttpMethod, Transport, fetch_definitions};

#[cfg(test)]
pub(crate) use recording::RecordingTransport;
#[cfg(test)]
pub(crate) use transport::MockTransport;
