// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network endpoint descriptor (`host` or `host:port`).

use crate::error::{Error, ErrorKind, Result};
use std::fmt;
use std::str::FromStr;

/// Immutable `(address, optional port)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndPoint {
    address: String,
    port: Option<u16>,
}

impl EndPoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port: Some(port),
        }
    }

    /// Endpoint without a port.
    pub fn host(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: None,
        }
    }

    /// Parse `"host:port"` or `"host"`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(Error::new(
                        ErrorKind::InvalidParam,
                        format!("endpoint '{s}' has no address"),
                    ));
                }
                let port = port.parse::<u16>().map_err(|_| {
                    Error::new(
                        ErrorKind::InvalidParam,
                        format!("endpoint '{s}' has an invalid port"),
                    )
                })?;
                Ok(Self::new(host, port))
            }
            None if s.is_empty() => Err(Error::new(ErrorKind::InvalidParam, "endpoint is empty")),
            None => Ok(Self::host(s)),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Port, or `None` when the endpoint names a host only.
    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl FromStr for EndPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for EndPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.address, port),
            None => f.write_str(&self.address),
        }
    }
}
