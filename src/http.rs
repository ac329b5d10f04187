//! Shared HTTP client factory.
//!
//! Provides consistent HTTP client configuration for upstream calls.

use reqwest::Client;
use std::time::Duration;

/// Default timeout for Claude API calls (60 seconds; long-form document
/// generation runs close to this).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Create a new HTTP client with the default timeout.
pub fn create_client() -> Client {
    create_client_with_timeout(DEFAULT_TIMEOUT)
}

/// Create a new HTTP client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}
