//! Typed snapshot of a container, decoded from `docker inspect` output.

use serde::Deserialize;
use std::collections::BTreeMap;

/// One host binding of a published container port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default)]
    pub host_ip: Option<String>,
    #[serde(default)]
    pub host_port: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunState {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub running: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    /// `"<port>/<protocol>"` to host bindings; unpublished ports map to null.
    #[serde(default)]
    pub ports: Option<BTreeMap<String, Option<Vec<PortBinding>>>>,
}

/// The parts of an inspection document the manager cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectState {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<RunState>,
    #[serde(default)]
    pub network_settings: Option<NetworkSettings>,
}

impl InspectState {
    /// Container name without the leading `/` docker adds.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().map(|n| n.trim_start_matches('/'))
    }

    pub fn status(&self) -> Option<&str> {
        self.state.as_ref()?.status.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false)
    }

    /// Published ports paired with their host bindings.
    pub fn ports(&self) -> impl Iterator<Item = (&str, &[PortBinding])> {
        self.network_settings
            .as_ref()
            .and_then(|n| n.ports.as_ref())
            .into_iter()
            .flatten()
            .map(|(port, bindings)| (port.as_str(), bindings.as_deref().unwrap_or_default()))
    }

    /// Host ports bound to `<container_port>/tcp`, skipping unparsable ones.
    pub fn host_ports_to(&self, container_port: u16) -> Vec<u16> {
        let key = format!("{}/tcp", container_port);
        self.ports()
            .filter(|(port, _)| *port == key)
            .flat_map(|(_, bindings)| bindings)
            .filter_map(|b| b.host_port.as_deref()?.parse().ok())
            .collect()
    }
}

/// Decode `docker inspect` stdout.
///
/// Docker prints a JSON array with zero or one element. An empty output,
/// an empty array or an empty object all mean the container does not
/// exist and yield `None`.
pub fn parse_inspect(stdout: &str) -> serde_json::Result<Option<InspectState>> {
    if stdout.trim().is_empty() {
        return Ok(None);
    }

    let documents: Vec<serde_json::Value> = serde_json::from_str(stdout)?;
    match documents.into_iter().next() {
        None => Ok(None),
        Some(serde_json::Value::Object(map)) if map.is_empty() => Ok(None),
        Some(document) => serde_json::from_value(document).map(Some),
    }
}
