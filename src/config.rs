use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

use crate::types::{DataCenterInfo, Instance, InstanceStatus, LeaseInfo, PortInfo};

pub const DEFAULT_ZONE: &str = "http://localhost:8761/eureka/";
pub const DEFAULT_APP: &str = "server";
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_RENEWAL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_FETCH_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 90;
pub const DEFAULT_BALANCE_STRATEGY: &str = "random";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Comma separated registry base URLs.
    pub default_zone: String,
    pub app: String,
    pub port: u16,
    pub renewal_interval_secs: u64,
    pub registry_fetch_interval_secs: u64,
    pub lease_duration_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub balance_strategy: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_zone: DEFAULT_ZONE.into(),
            app: DEFAULT_APP.into(),
            port: DEFAULT_PORT,
            renewal_interval_secs: DEFAULT_RENEWAL_INTERVAL_SECS,
            registry_fetch_interval_secs: DEFAULT_FETCH_INTERVAL_SECS,
            lease_duration_secs: DEFAULT_LEASE_DURATION_SECS,
            ip_address: None,
            hostname: None,
            balance_strategy: DEFAULT_BALANCE_STRATEGY.into(),
            metadata: HashMap::new(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("eureka-agent.toml"))
                .merge(Json::file("eureka-agent.json"))
                .merge(Env::prefixed("EUREKA_")),
        )
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        Ok(config.normalized())
    }

    /// Fills empty or zero values with defaults and lower-cases the app name.
    pub fn normalized(mut self) -> Self {
        if self.default_zone.trim().is_empty() {
            self.default_zone = DEFAULT_ZONE.into();
        }
        self.app = self.app.trim().to_lowercase();
        if self.app.is_empty() {
            self.app = DEFAULT_APP.into();
        }
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.renewal_interval_secs == 0 {
            self.renewal_interval_secs = DEFAULT_RENEWAL_INTERVAL_SECS;
        }
        if self.registry_fetch_interval_secs == 0 {
            self.registry_fetch_interval_secs = DEFAULT_FETCH_INTERVAL_SECS;
        }
        if self.lease_duration_secs == 0 {
            self.lease_duration_secs = DEFAULT_LEASE_DURATION_SECS;
        }
        if self.balance_strategy.trim().is_empty() {
            self.balance_strategy = DEFAULT_BALANCE_STRATEGY.into();
        }
        self
    }

    /// Registry endpoints, each guaranteed to end with `/`.
    pub fn registry_endpoints(&self) -> Vec<String> {
        self.default_zone
            .split(',')
            .map(str::trim)
            .filter(|zone| !zone.is_empty())
            .map(|zone| {
                if zone.ends_with('/') {
                    zone.to_string()
                } else {
                    format!("{}/", zone)
                }
            })
            .collect()
    }

    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_interval_secs)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.registry_fetch_interval_secs)
    }

    /// Builds the descriptor this process registers under.
    pub fn instance(&self) -> Instance {
        let ip = match &self.ip_address {
            Some(ip) => ip.clone(),
            None => local_ip().to_string(),
        };
        let host = self.hostname.clone().unwrap_or_else(|| ip.clone());
        let home = format!("http://{}:{}/", ip, self.port);

        Instance {
            instance_id: format!("{}:{}:{}", ip, self.app, self.port),
            host_name: host,
            app: self.app.to_uppercase(),
            ip_addr: ip,
            status: InstanceStatus::Up,
            port: Some(PortInfo::enabled(self.port)),
            secure_port: Some(PortInfo::disabled(443)),
            status_page_url: format!("{}info", home),
            health_check_url: format!("{}health", home),
            home_page_url: home,
            vip_address: self.app.clone(),
            data_center_info: DataCenterInfo::default(),
            lease_info: LeaseInfo {
                renewal_interval_in_secs: self.renewal_interval_secs,
                duration_in_secs: self.lease_duration_secs,
                last_renewal_timestamp: None,
            },
            metadata: self.metadata.clone(),
        }
    }
}

/// Primary outbound IPv4 address of this host.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
pub fn local_ip() -> IpAddr {
    let detected = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip());

    match detected {
        Ok(ip) if !ip.is_loopback() && !ip.is_unspecified() => ip,
        Ok(ip) => {
            warn!("Detected non-routable local address {}, using loopback", ip);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        Err(e) => {
            warn!("Unable to detect local IP address: {}. Using loopback", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}
