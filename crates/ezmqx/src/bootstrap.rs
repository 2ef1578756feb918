// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Orchestrated-mode bootstrap.
//!
//! Five sequential steps, each consuming the previous step's result:
//!
//! 1. node configuration → anchor endpoint + this node's address
//! 2. anchor node search → naming-service base URL
//! 3. identity file → container id
//! 4. running apps → app ids
//! 5. app details → private→public port table
//!
//! Any failure aborts with a single `BootstrapError` naming the step.

use crate::config::{OrchestratorConfig, API_PREFIX};
use crate::error::{Error, ErrorKind, Result};
use crate::rest::RestClient;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

const CONFIG_PATH: &str = "/management/device/configuration";
const APPS_PATH: &str = "/management/apps";
const SEARCH_NODES_PATH: &str = "/search/nodes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    NodeConfiguration,
    NamingServiceLookup,
    ContainerIdentity,
    RunningApps,
    PortMappings,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NodeConfiguration => "node configuration",
            Self::NamingServiceLookup => "naming service lookup",
            Self::ContainerIdentity => "container identity",
            Self::RunningApps => "running apps",
            Self::PortMappings => "port mappings",
        })
    }
}

fn step_error(step: Step, reason: impl fmt::Display) -> Error {
    Error::new(
        ErrorKind::BootstrapError,
        format!("bootstrap step '{step}' failed: {reason}"),
    )
}

/// Step 1 output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeConfig {
    pub anchor_endpoint: String,
    pub host_address: String,
}

/// Step 2 output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NamingService {
    pub address: String,
    pub proxied: bool,
}

/// Everything orchestrated mode needs once bootstrap succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OrchestratedEnv {
    pub host_address: String,
    pub tns_address: String,
    pub reverse_proxy: bool,
    pub port_map: HashMap<u16, u16>,
}

/// Run every step in order.
pub(crate) fn run(rest: &dyn RestClient, cfg: &OrchestratorConfig) -> Result<OrchestratedEnv> {
    let node = fetch_node_config(rest, cfg)?;
    let tns = locate_naming_service(rest, cfg, &node)?;
    let container_id = read_container_id(&cfg.hostname_path)?;
    let apps = list_running_apps(rest, cfg)?;
    let port_map = collect_port_mappings(rest, cfg, &apps, &container_id)?;

    log::info!(
        "[BOOTSTRAP] host={} tns={} proxied={} ports={}",
        node.host_address,
        tns.address,
        tns.proxied,
        port_map.len()
    );
    Ok(OrchestratedEnv {
        host_address: node.host_address,
        tns_address: tns.address,
        reverse_proxy: tns.proxied,
        port_map,
    })
}

fn node_api(cfg: &OrchestratorConfig, path: &str) -> String {
    format!("{}{}{}", cfg.node_url.trim_end_matches('/'), API_PREFIX, path)
}

fn get_json(rest: &dyn RestClient, step: Step, url: &str) -> Result<Value> {
    let response = rest.get(url).map_err(|e| step_error(step, e))?;
    if !response.is_success() {
        return Err(step_error(
            step,
            format!("GET {} returned {}", url, response.status),
        ));
    }
    serde_json::from_str(&response.body).map_err(|e| step_error(step, e))
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn lenient_port(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Step 1: anchor endpoint and node address from the local node.
pub(crate) fn fetch_node_config(
    rest: &dyn RestClient,
    cfg: &OrchestratorConfig,
) -> Result<NodeConfig> {
    let step = Step::NodeConfiguration;
    let root = get_json(rest, step, &node_api(cfg, CONFIG_PATH))?;

    let mut anchor_endpoint = None;
    let mut host_address = None;
    for property in array(&root, "properties") {
        if let Some(v) = property.get("anchorendpoint").and_then(Value::as_str) {
            anchor_endpoint = Some(v.trim_end_matches('/').to_string());
        }
        if let Some(v) = property.get("nodeaddress").and_then(Value::as_str) {
            host_address = Some(v.to_string());
        }
    }

    Ok(NodeConfig {
        anchor_endpoint: anchor_endpoint.ok_or_else(|| step_error(step, "no anchorendpoint"))?,
        host_address: host_address.ok_or_else(|| step_error(step, "no nodeaddress"))?,
    })
}

/// Step 2: first connected node running the naming-service image.
pub(crate) fn locate_naming_service(
    rest: &dyn RestClient,
    cfg: &OrchestratorConfig,
    node: &NodeConfig,
) -> Result<NamingService> {
    let step = Step::NamingServiceLookup;
    let url = format!(
        "{}{}?imageName={}",
        node.anchor_endpoint, SEARCH_NODES_PATH, cfg.tns_image_name
    );
    let root = get_json(rest, step, &url)?;

    let connected = array(&root, "nodes").iter().find(|n| {
        n.get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| s.eq_ignore_ascii_case("connected"))
    });
    let Some(found) = connected else {
        return Err(step_error(step, "no connected naming-service node"));
    };
    let ip = found
        .get("ip")
        .and_then(Value::as_str)
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| step_error(step, "connected node has no ip"))?;

    let proxied = found
        .get("config")
        .map(|c| array(c, "properties"))
        .unwrap_or_default()
        .iter()
        .filter_map(|p| p.get("reverseproxy")?.get("enabled")?.as_bool())
        .last()
        .unwrap_or(false);

    let address = if proxied {
        format!(
            "http://{}:{}{}",
            ip, cfg.reverse_proxy_port, cfg.reverse_proxy_prefix
        )
    } else {
        format!("http://{}:{}", ip, cfg.tns_port)
    };
    Ok(NamingService { address, proxied })
}

/// Step 3: first line of the identity file.
pub(crate) fn read_container_id(path: &Path) -> Result<String> {
    let step = Step::ContainerIdentity;
    let content = std::fs::read_to_string(path)
        .map_err(|e| step_error(step, format!("{}: {}", path.display(), e)))?;
    let id = content.lines().next().unwrap_or_default().trim();
    if id.is_empty() {
        return Err(step_error(step, format!("{} is empty", path.display())));
    }
    Ok(id.to_string())
}

/// Step 4: ids of apps in the `running` state.
pub(crate) fn list_running_apps(
    rest: &dyn RestClient,
    cfg: &OrchestratorConfig,
) -> Result<Vec<String>> {
    let root = get_json(rest, Step::RunningApps, &node_api(cfg, APPS_PATH))?;
    Ok(array(&root, "apps")
        .iter()
        .filter(|app| {
            app.get("state")
                .and_then(Value::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case("running"))
        })
        .filter_map(|app| app.get("id")?.as_str().map(str::to_string))
        .collect())
}

/// Step 5: port table of the service whose container id starts with ours.
pub(crate) fn collect_port_mappings(
    rest: &dyn RestClient,
    cfg: &OrchestratorConfig,
    apps: &[String],
    container_id: &str,
) -> Result<HashMap<u16, u16>> {
    let mut port_map = HashMap::new();
    for app in apps {
        let url = node_api(cfg, &format!("{APPS_PATH}/{app}"));
        let root = get_json(rest, Step::PortMappings, &url)?;

        let ours = array(&root, "services").iter().filter(|service| {
            service
                .get("cid")
                .and_then(Value::as_str)
                .is_some_and(|cid| cid.starts_with(container_id))
        });
        for service in ours {
            for port in array(service, "ports") {
                let private = port.get("PrivatePort").and_then(lenient_port);
                let public = port.get("PublicPort").and_then(lenient_port);
                if let (Some(private), Some(public)) = (private, public) {
                    log::debug!("[BOOTSTRAP] port {} -> {}", private, public);
                    port_map.insert(private, public);
                }
            }
        }
    }
    Ok(port_map)
}
