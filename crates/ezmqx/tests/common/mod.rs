// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared helpers for integration tests.

#![allow(dead_code)]

use ezmqx::rest::{RestClient, RestError, RestResponse};
use parking_lot::Mutex;
use std::io::Write;
use std::time::{Duration, Instant};

pub const SERVER_SECRET: &str = "[:X%Q3UfY+kv2A^.wv:(qy2E=bk0L][cm=mS3Hcx";
pub const SERVER_PUBLIC: &str = "tXJx&1^QE2g7WCXbF.$$TVP.wCtxwNhR8?iLi&S<";
pub const CLIENT_PUBLIC: &str = "-QW?Ved(f:<::3d5tJ$[4Er&]6#9yr=vha/caBc(";
pub const CLIENT_SECRET: &str = "ZB1@RS6Kv^zucova$kH(!o>tZCQ.<!Q)6-0aWFmW";

pub const ROBOT_MODEL: &str = "GTC_Robot_0.0.1";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub method: &'static str,
    pub url: String,
    pub body: String,
}

struct Route {
    method: &'static str,
    prefix: String,
    response: RestResponse,
}

/// REST client answering from a route table and recording every call.
///
/// Routes match on method and URL prefix; the first match wins. Unrouted
/// requests fail like a refused connection.
#[derive(Default)]
pub struct FakeRestClient {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRestClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, method: &'static str, prefix: &str, status: u16, body: &str) -> Self {
        self.routes.lock().push(Route {
            method,
            prefix: prefix.to_string(),
            response: RestResponse::new(status, body),
        });
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: &str, fragment: &str) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method && c.url.contains(fragment))
            .cloned()
            .collect()
    }

    /// Poll until a matching call shows up or `timeout` elapses.
    pub fn wait_for(&self, method: &str, fragment: &str, timeout: Duration) -> Option<Call> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(call) = self.calls_to(method, fragment).into_iter().next() {
                return Some(call);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn answer(&self, method: &'static str, url: &str, body: &str) -> Result<RestResponse, RestError> {
        self.calls.lock().push(Call {
            method,
            url: url.to_string(),
            body: body.to_string(),
        });
        self.routes
            .lock()
            .iter()
            .find(|r| r.method == method && url.starts_with(&r.prefix))
            .map(|r| r.response.clone())
            .ok_or_else(|| RestError::Request {
                url: url.to_string(),
                reason: "connection refused".into(),
            })
    }
}

impl RestClient for FakeRestClient {
    fn get(&self, url: &str) -> Result<RestResponse, RestError> {
        self.answer("GET", url, "")
    }

    fn post(&self, url: &str, body: &str) -> Result<RestResponse, RestError> {
        self.answer("POST", url, body)
    }

    fn delete(&self, url: &str) -> Result<RestResponse, RestError> {
        self.answer("DELETE", url, "")
    }
}

/// Write a JSON model file declaring `sections`.
pub fn model_file(id: &str, sections: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create model file");
    let body = serde_json::json!({ "id": id, "sections": sections });
    write!(file, "{body}").expect("write model file");
    file
}

pub fn robot_model() -> tempfile::NamedTempFile {
    model_file(ROBOT_MODEL, &["Model", "Sample"])
}

/// Block until `predicate` holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    predicate()
}
