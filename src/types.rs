//! Registry data model.
//!
//! These types mirror the JSON documents exchanged with a Eureka-style
//! registry.  Only the fields the agent reads or publishes are modelled;
//! everything else in a registry payload is ignored on deserialisation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle status of an instance as understood by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceStatus {
    Up,
    Down,
    Starting,
    OutOfService,
    #[default]
    Unknown,
}

impl InstanceStatus {
    /// Parses a registry status string; anything unrecognised is `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            "UP" => InstanceStatus::Up,
            "DOWN" => InstanceStatus::Down,
            "STARTING" => InstanceStatus::Starting,
            "OUT_OF_SERVICE" => InstanceStatus::OutOfService,
            _ => InstanceStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::OutOfService => "OUT_OF_SERVICE",
            InstanceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl Serialize for InstanceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InstanceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(InstanceStatus::parse(&value))
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port as the registry encodes it: `{"$": 8080, "@enabled": "true"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    #[serde(rename = "$")]
    pub port: u16,
    #[serde(rename = "@enabled", default = "enabled_true")]
    pub enabled: String,
}

impl PortInfo {
    pub fn enabled(port: u16) -> Self {
        Self {
            port,
            enabled: "true".into(),
        }
    }

    pub fn disabled(port: u16) -> Self {
        Self {
            port,
            enabled: "false".into(),
        }
    }
}

fn enabled_true() -> String {
    "true".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCenterInfo {
    #[serde(rename = "@class")]
    pub class: String,
    pub name: String,
}

impl Default for DataCenterInfo {
    fn default() -> Self {
        Self {
            class: "com.netflix.appinfo.InstanceInfo$DefaultDataCenterInfo".into(),
            name: "MyOwn".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseInfo {
    #[serde(default)]
    pub renewal_interval_in_secs: u64,
    #[serde(default)]
    pub duration_in_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_renewal_timestamp: Option<u64>,
}

/// One registered process of an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub instance_id: String,
    #[serde(default)]
    pub host_name: String,
    pub app: String,
    #[serde(default)]
    pub ip_addr: String,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_port: Option<PortInfo>,
    #[serde(default)]
    pub home_page_url: String,
    #[serde(default)]
    pub status_page_url: String,
    #[serde(default)]
    pub health_check_url: String,
    #[serde(default)]
    pub vip_address: String,
    #[serde(default)]
    pub data_center_info: DataCenterInfo,
    #[serde(default)]
    pub lease_info: LeaseInfo,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Instance {
    /// Home URL with trailing `/` removed, ready to have a request path appended.
    pub fn base_url(&self) -> &str {
        self.home_page_url.trim_end_matches('/')
    }
}

/// A named group of instances providing one logical service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    #[serde(rename = "instance", default, deserialize_with = "one_or_many")]
    pub instances: Vec<Instance>,
}

/// Snapshot of every application known to the registry.
///
/// A snapshot is never edited in place: each refresh produces a new value
/// that replaces the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Applications {
    #[serde(rename = "versions__delta", default)]
    pub versions_delta: String,
    #[serde(rename = "apps__hashcode", default)]
    pub apps_hashcode: String,
    #[serde(rename = "application", default, deserialize_with = "one_or_many")]
    pub applications: Vec<Application>,
}

impl Applications {
    /// Looks an application up by name, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&Application> {
        self.applications
            .iter()
            .find(|app| app.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    pub fn instance_count(&self) -> usize {
        self.applications.iter().map(|a| a.instances.len()).sum()
    }
}

// The registry collapses single-element lists into a bare object.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
        None => Vec::new(),
    })
}
