// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal blocking REST client interface.
//!
//! Everything that talks HTTP (naming service, orchestrated bootstrap,
//! keepalive) goes through [`RestClient`], so tests can substitute a
//! recording fake for [`HttpRestClient`].

use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use thiserror::Error;

/// REST transport failures (no response was obtained).
#[derive(Debug, Error)]
pub enum RestError {
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("HTTP request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

/// Status code and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
    pub status: u16,
    pub body: String,
}

impl RestResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP verbs used by the layer.
pub trait RestClient: Send + Sync {
    fn get(&self, url: &str) -> Result<RestResponse, RestError>;

    /// POST a JSON body.
    fn post(&self, url: &str, body: &str) -> Result<RestResponse, RestError>;

    fn delete(&self, url: &str) -> Result<RestResponse, RestError>;
}

/// [`RestClient`] backed by a blocking `reqwest` client.
pub struct HttpRestClient {
    client: reqwest::blocking::Client,
}

impl HttpRestClient {
    /// Client with the same timeout for connect and whole request.
    pub fn new(timeout: Duration) -> Result<Self, RestError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| RestError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    fn finish(
        url: &str,
        result: reqwest::Result<reqwest::blocking::Response>,
    ) -> Result<RestResponse, RestError> {
        let failed = |e: reqwest::Error| RestError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = result.map_err(failed)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(failed)?;
        log::debug!("[REST] {} -> {}", url, status);
        Ok(RestResponse { status, body })
    }
}

impl RestClient for HttpRestClient {
    fn get(&self, url: &str) -> Result<RestResponse, RestError> {
        Self::finish(url, self.client.get(url).send())
    }

    fn post(&self, url: &str, body: &str) -> Result<RestResponse, RestError> {
        Self::finish(
            url,
            self.client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string())
                .send(),
        )
    }

    fn delete(&self, url: &str) -> Result<RestResponse, RestError> {
        Self::finish(url, self.client.delete(url).send())
    }
}
