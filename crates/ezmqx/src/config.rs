// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Context configuration and well-known constants.
//!
//! Supports both programmatic (`with_*` builders) and file-based (TOML)
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// First port of the dynamic port pool.
pub const LOCAL_PORT_START: u16 = 4000;

/// Number of ports in the dynamic port pool.
pub const LOCAL_PORT_MAX: u16 = 100;

/// Length of every encoded security key.
pub const KEY_LENGTH: usize = 40;

/// Naming-service port when reached directly.
pub const TNS_KNOWN_PORT: u16 = 48323;

/// Port of the node reverse proxy.
pub const REVERSE_PROXY_KNOWN_PORT: u16 = 80;

/// Path prefix of the naming service behind the reverse proxy.
pub const REVERSE_PROXY_PREFIX: &str = "/tns-server";

/// REST API version prefix shared by the node and the naming service.
pub const API_PREFIX: &str = "/api/v1";

/// Local node management endpoint, as seen from inside a container.
pub const DEFAULT_NODE_URL: &str = "http://172.17.0.1:48098";

/// Image name the naming-service container is deployed under.
pub const DEFAULT_TNS_IMAGE_NAME: &str = "system-tns-server-go/ubuntu_x86_64";

/// File holding this container's identity token.
pub const HOSTNAME_PATH: &str = "/etc/hostname";

/// Default timeout for every REST round trip.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for a [`Context`](crate::Context).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// First port of the dynamic pool.
    #[serde(default = "default_port_start")]
    pub port_start: u16,

    /// Number of ports in the dynamic pool.
    #[serde(default = "default_port_count")]
    pub port_count: u16,

    /// REST timeout (milliseconds).
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Orchestrated-mode bootstrap settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

fn default_port_start() -> u16 {
    LOCAL_PORT_START
}

fn default_port_count() -> u16 {
    LOCAL_PORT_MAX
}

fn default_http_timeout_ms() -> u64 {
    HTTP_TIMEOUT.as_millis() as u64
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            port_start: LOCAL_PORT_START,
            port_count: LOCAL_PORT_MAX,
            http_timeout_ms: default_http_timeout_ms(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl ContextConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder: set the dynamic port range.
    pub fn with_port_range(mut self, start: u16, count: u16) -> Self {
        self.port_start = start;
        self.port_count = count;
        self
    }

    /// Builder: set the REST timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder: set orchestrated-mode settings.
    pub fn with_orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_count == 0 {
            return Err(ConfigError::Invalid("port_count must be > 0".into()));
        }
        if u32::from(self.port_start) + u32::from(self.port_count) > u32::from(u16::MAX) + 1 {
            return Err(ConfigError::Invalid(format!(
                "port range {}+{} exceeds 65535",
                self.port_start, self.port_count
            )));
        }
        if self.http_timeout_ms == 0 {
            return Err(ConfigError::Invalid("http_timeout_ms must be > 0".into()));
        }
        self.orchestrator.validate()
    }
}

/// Where orchestrated-mode bootstrap looks for its inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Node management base URL (without the API prefix).
    #[serde(default = "default_node_url")]
    pub node_url: String,

    /// Image name used to locate the naming-service node.
    #[serde(default = "default_tns_image_name")]
    pub tns_image_name: String,

    /// Identity token file.
    #[serde(default = "default_hostname_path")]
    pub hostname_path: PathBuf,

    /// Naming-service port when not proxied.
    #[serde(default = "default_tns_port")]
    pub tns_port: u16,

    /// Reverse-proxy port.
    #[serde(default = "default_reverse_proxy_port")]
    pub reverse_proxy_port: u16,

    /// Reverse-proxy path prefix.
    #[serde(default = "default_reverse_proxy_prefix")]
    pub reverse_proxy_prefix: String,
}

fn default_node_url() -> String {
    DEFAULT_NODE_URL.to_string()
}

fn default_tns_image_name() -> String {
    DEFAULT_TNS_IMAGE_NAME.to_string()
}

fn default_hostname_path() -> PathBuf {
    PathBuf::from(HOSTNAME_PATH)
}

fn default_tns_port() -> u16 {
    TNS_KNOWN_PORT
}

fn default_reverse_proxy_port() -> u16 {
    REVERSE_PROXY_KNOWN_PORT
}

fn default_reverse_proxy_prefix() -> String {
    REVERSE_PROXY_PREFIX.to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            node_url: default_node_url(),
            tns_image_name: default_tns_image_name(),
            hostname_path: default_hostname_path(),
            tns_port: TNS_KNOWN_PORT,
            reverse_proxy_port: REVERSE_PROXY_KNOWN_PORT,
            reverse_proxy_prefix: default_reverse_proxy_prefix(),
        }
    }
}

/// Naming-service deployment file: `{"imageName": "..."}`.
#[derive(Debug, Deserialize)]
struct TnsDeployment {
    #[serde(rename = "imageName")]
    image_name: String,
}

impl OrchestratorConfig {
    /// Builder: set the node management URL.
    pub fn with_node_url(mut self, url: impl Into<String>) -> Self {
        self.node_url = url.into();
        self
    }

    /// Builder: set the naming-service image name.
    pub fn with_image_name(mut self, image: impl Into<String>) -> Self {
        self.tns_image_name = image.into();
        self
    }

    /// Builder: read the naming-service image name from a JSON deployment file.
    pub fn with_image_name_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let deployment: TnsDeployment = serde_json::from_str(&content)?;
        if deployment.image_name.trim().is_empty() {
            return Err(ConfigError::Invalid("imageName is empty".into()));
        }
        self.tns_image_name = deployment.image_name;
        Ok(self)
    }

    /// Builder: set the identity token file.
    pub fn with_hostname_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.hostname_path = path.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.node_url.starts_with("http://") && !self.node_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "node_url '{}' is not an http(s) URL",
                self.node_url
            )));
        }
        if self.tns_image_name.is_empty() {
            return Err(ConfigError::Invalid("tns_image_name is empty".into()));
        }
        Ok(())
    }
}
