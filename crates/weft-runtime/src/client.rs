// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP client for calling the engine's own API.

use std::time::Duration;

use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::instrument;

/// Errors raised by [`ApiClient`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The base URL or a path did not parse.
    #[error("invalid url '{url}': {details}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parse failure.
        details: String,
    },

    /// Only http and https are supported.
    #[error("unsupported url scheme '{0}'")]
    UnsupportedScheme(String),

    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Build(String),

    /// A request failed or returned a non-success status.
    #[error("request to {url} failed: {details}")]
    Request {
        /// Requested URL.
        url: String,
        /// Failure.
        details: String,
    },
}

/// Client bound to the engine's own base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Build a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl {
            url: base_url.to_string(),
            details: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::UnsupportedScheme(base_url.scheme().to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self { http, base_url })
    }

    /// Base URL the client resolves paths against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` against the base URL.
    pub fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl {
                url: path.to_string(),
                details: e.to_string(),
            })
    }

    /// GET `path` and decode the JSON body.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path)?;
        let request_error = |e: reqwest::Error| ClientError::Request {
            url: url.to_string(),
            details: e.to_string(),
        };
        self.http
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(request_error)?
            .json()
            .await
            .map_err(request_error)
    }
}

/// Host a client should dial for a server bound to `host`.
///
/// Wildcard binds (`""`, `0.0.0.0`, `::`) become loopback; IPv6 literals are
/// bracketed.
pub fn client_host(host: &str) -> String {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    match host {
        "" | "0.0.0.0" | "::" => "127.0.0.1".to_string(),
        h if h.contains(':') => format!("[{h}]"),
        h => h.to_string(),
    }
}

/// `http://<client host>:<port>`
pub fn base_url(host: &str, port: u16) -> String {
    format!("http://{}:{}", client_host(host), port)
}
