// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Naming-service (TNS) REST client.
//!
//! Stateless wrapper over four calls:
//!
//! | Call | Request | Success |
//! |------|---------|---------|
//! | register | `POST {base}/tns/topic` `{"topic": {...}}` | `201` + `{"ka_interval": n}` |
//! | unregister | `DELETE {base}/tns/topic?name=` | any status |
//! | query | `GET {base}/tns/topic?name=&hierarchical=yes\|no` | `200` + `{"topics": [...]}` |
//! | keepalive | `POST {base}/tns/keepalive` `{"topic_names": [...]}` | logged only |
//!
//! `{base}` is the naming-service address followed by `/api/v1`. The service
//! is known to send numbers and booleans as strings, so responses are parsed
//! leniently.

use crate::config::API_PREFIX;
use crate::endpoint::EndPoint;
use crate::error::{Error, ErrorKind, Result};
use crate::rest::RestClient;
use crate::topic::Topic;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const TOPIC_PATH: &str = "/tns/topic";
const KEEPALIVE_PATH: &str = "/tns/keepalive";

const STATUS_OK: u16 = 200;
const STATUS_CREATED: u16 = 201;

#[derive(Serialize)]
struct RegisterRequest<'a> {
    topic: TopicEntry<'a>,
}

#[derive(Serialize)]
struct TopicEntry<'a> {
    name: &'a str,
    endpoint: String,
    datamodel: &'a str,
    secured: bool,
}

#[derive(Serialize)]
struct KeepAliveRequest<'a> {
    topic_names: &'a [String],
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Interval the service expects keepalives at, if it asked for any.
    pub keepalive_interval: Option<Duration>,
}

/// Client for one naming-service instance.
#[derive(Clone)]
pub struct TnsClient {
    address: String,
    api_base: String,
    rest: Arc<dyn RestClient>,
}

impl std::fmt::Debug for TnsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TnsClient").field("address", &self.address).finish()
    }
}

/// Prefix `http://` when the address carries no scheme; drop trailing '/'.
pub(crate) fn normalize_address(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

impl TnsClient {
    pub fn new(address: &str, rest: Arc<dyn RestClient>) -> Self {
        let address = normalize_address(address);
        let api_base = format!("{address}{API_PREFIX}");
        Self {
            address,
            api_base,
            rest,
        }
    }

    /// Normalized naming-service address.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn topic_url(&self) -> String {
        format!("{}{}", self.api_base, TOPIC_PATH)
    }

    pub fn keepalive_url(&self) -> String {
        format!("{}{}", self.api_base, KEEPALIVE_PATH)
    }

    /// Register `topic`; anything but `201 Created` is `RegistrationFailed`.
    pub fn register(&self, topic: &Topic) -> Result<Registration> {
        let body = serde_json::to_string(&RegisterRequest {
            topic: TopicEntry {
                name: topic.name(),
                endpoint: topic.endpoint().to_string(),
                datamodel: topic.data_model(),
                secured: topic.is_secured(),
            },
        })
        .map_err(|e| Error::new(ErrorKind::InvalidParam, e.to_string()))?;

        let url = self.topic_url();
        let response = self.rest.post(&url, &body).map_err(unavailable)?;
        if response.status != STATUS_CREATED {
            return Err(Error::new(
                ErrorKind::RegistrationFailed,
                format!(
                    "register '{}' returned {}: {}",
                    topic.name(),
                    response.status,
                    response.body
                ),
            ));
        }

        let keepalive_interval = parse_keepalive_interval(&response.body)?;
        log::debug!(
            "[TNS] Registered {} (keepalive {:?})",
            topic.name(),
            keepalive_interval
        );
        Ok(Registration { keepalive_interval })
    }

    /// Remove `name`. Only transport failures are errors; any status is accepted.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let url = format!("{}?name={}", self.topic_url(), name);
        let response = self.rest.delete(&url).map_err(unavailable)?;
        log::debug!("[TNS] Unregistered {} -> {}", name, response.status);
        Ok(())
    }

    /// Query topics matching `name`, optionally including descendants.
    pub fn query(&self, name: &str, hierarchical: bool) -> Result<Vec<Topic>> {
        let url = format!(
            "{}?name={}&hierarchical={}",
            self.topic_url(),
            name,
            if hierarchical { "yes" } else { "no" }
        );
        let response = self.rest.get(&url).map_err(unavailable)?;
        if response.status != STATUS_OK {
            return Err(Error::new(
                ErrorKind::NameServiceUnavailable,
                format!("query '{}' returned {}", name, response.status),
            ));
        }
        parse_topics(&response.body)
    }

    /// Announce that every topic in `names` is still alive.
    pub fn keep_alive(&self, names: &[String]) -> Result<()> {
        let body = serde_json::to_string(&KeepAliveRequest { topic_names: names })
            .map_err(|e| Error::new(ErrorKind::InvalidParam, e.to_string()))?;
        let response = self
            .rest
            .post(&self.keepalive_url(), &body)
            .map_err(unavailable)?;
        log::trace!("[TNS] Keepalive for {} topic(s) -> {}", names.len(), response.status);
        Ok(())
    }
}

fn unavailable(err: crate::rest::RestError) -> Error {
    Error::new(ErrorKind::NameServiceUnavailable, err.to_string())
}

/// Accept `5`, `5.0` or `"5"`.
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accept `true` or `"true"` (any case).
fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().to_ascii_lowercase().parse().ok(),
        _ => None,
    }
}

fn parse_keepalive_interval(body: &str) -> Result<Option<Duration>> {
    let root: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body).map_err(|e| {
            Error::new(
                ErrorKind::RegistrationFailed,
                format!("malformed registration response: {e}"),
            )
        })?
    };

    match root.get("ka_interval") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => match lenient_u64(raw) {
            Some(secs) if secs >= 1 => Ok(Some(Duration::from_secs(secs))),
            _ => Err(Error::new(
                ErrorKind::RegistrationFailed,
                format!("invalid ka_interval {raw}"),
            )),
        },
    }
}

fn parse_topics(body: &str) -> Result<Vec<Topic>> {
    let root: Value = serde_json::from_str(body).map_err(|e| {
        Error::new(
            ErrorKind::NameServiceUnavailable,
            format!("malformed query response: {e}"),
        )
    })?;

    let Some(entries) = root.get("topics").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut topics = Vec::with_capacity(entries.len());
    for entry in entries {
        match parse_topic_entry(entry) {
            Some(topic) => topics.push(topic),
            None => log::warn!("[TNS] Skipping malformed topic entry {}", entry),
        }
    }
    Ok(topics)
}

fn parse_topic_entry(entry: &Value) -> Option<Topic> {
    let name = entry.get("name")?.as_str()?;
    let datamodel = entry.get("datamodel")?.as_str()?;
    let endpoint = EndPoint::parse(entry.get("endpoint")?.as_str()?).ok()?;
    let secured = entry.get("secured").and_then(lenient_bool).unwrap_or(false);
    Topic::new(name, datamodel, secured, endpoint).ok()
}
