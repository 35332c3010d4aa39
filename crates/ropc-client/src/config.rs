// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the remote operation client.

use std::time::Duration;

use url::Url;

use crate::error::{ClientError, Result};
use crate::transport::MAX_GET_QUERY_LENGTH;

const DEFAULT_BASE_URI: &str = "http://127.0.0.1:8080/services";

/// Default cap on a response body (64 MiB).
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 64 * 1024 * 1024;

/// Configuration for the RemoteClient.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URI; operation names are appended as a path segment.
    pub base_uri: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Longest query string sent with GET before falling back to POST.
    pub max_get_query_length: usize,
    /// Largest response body accepted.
    pub max_response_size: usize,
    /// Keep server stack traces in translated errors.
    pub include_exception_details: bool,
    /// Headers added to every request.
    pub headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_uri: DEFAULT_BASE_URI.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_get_query_length: MAX_GET_QUERY_LENGTH,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            include_exception_details: false,
            headers: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ROPC_BASE_URI`: Base URI (default: "http://127.0.0.1:8080/services")
    /// - `ROPC_CONNECT_TIMEOUT_MS`: Connection timeout in milliseconds (default: 10000)
    /// - `ROPC_REQUEST_TIMEOUT_MS`: Request timeout in milliseconds (default: 30000)
    /// - `ROPC_MAX_GET_QUERY_LENGTH`: GET query string limit (default: 2048)
    /// - `ROPC_MAX_RESPONSE_BYTES`: Response body limit (default: 67108864)
    /// - `ROPC_INCLUDE_EXCEPTION_DETAILS`: Keep server stack traces (default: "false")
    pub fn from_env() -> Result<Self> {
        let base_uri =
            std::env::var("ROPC_BASE_URI").unwrap_or_else(|_| DEFAULT_BASE_URI.to_string());

        let connect_timeout_ms: u64 = env_number("ROPC_CONNECT_TIMEOUT_MS", 10_000)?;
        let request_timeout_ms: u64 = env_number("ROPC_REQUEST_TIMEOUT_MS", 30_000)?;
        let max_get_query_length = env_number("ROPC_MAX_GET_QUERY_LENGTH", MAX_GET_QUERY_LENGTH)?;
        let max_response_size = env_number("ROPC_MAX_RESPONSE_BYTES", DEFAULT_MAX_RESPONSE_SIZE)?;

        let include_exception_details = std::env::var("ROPC_INCLUDE_EXCEPTION_DETAILS")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let config = Self {
            base_uri,
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
            max_get_query_length,
            max_response_size,
            include_exception_details,
            headers: Vec::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the base URI is an absolute http(s) URI.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_uri)
            .map_err(|e| ClientError::Config(format!("invalid base URI {}: {}", self.base_uri, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ClientError::Config(format!(
                "unsupported base URI scheme: {}",
                other
            ))),
        }
    }

    /// Set the base URI.
    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.base_uri = uri.into();
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_get_query_length(mut self, length: usize) -> Self {
        self.max_get_query_length = length;
        self
    }

    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    pub fn with_exception_details(mut self, include: bool) -> Self {
        self.include_exception_details = include;
        self
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

fn env_number<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ClientError::Config(format!("invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
