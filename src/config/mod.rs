use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::detector::{Member, MemberId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("probe interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub detector: DetectorSettings,
    #[serde(default)]
    pub members: Vec<MemberConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    pub label: Option<String>,
}

/// Raw `[detector]` table. All values are milliseconds.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DetectorSettings {
    pub interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub ping_req_timeout_ms: u64,
    pub ping_req_group_size: usize,
    pub relay_leg_timeout_ms: Option<u64>,
    pub suspect_without_relays: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        let defaults = DetectorConfig::default();
        Self {
            interval_ms: defaults.interval.as_millis() as u64,
            ping_timeout_ms: defaults.ping_timeout.as_millis() as u64,
            ping_req_timeout_ms: defaults.ping_req_timeout.as_millis() as u64,
            ping_req_group_size: defaults.ping_req_group_size,
            relay_leg_timeout_ms: None,
            suspect_without_relays: defaults.suspect_without_relays,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemberConfig {
    pub id: String,
    pub addr: SocketAddr,
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn detector_config(&self) -> Result<DetectorConfig, ConfigError> {
        let settings = &self.detector;
        let config = DetectorConfig {
            interval: Duration::from_millis(settings.interval_ms),
            ping_timeout: Duration::from_millis(settings.ping_timeout_ms),
            ping_req_timeout: Duration::from_millis(settings.ping_req_timeout_ms),
            ping_req_group_size: settings.ping_req_group_size,
            relay_leg_timeout: settings.relay_leg_timeout_ms.map(Duration::from_millis),
            suspect_without_relays: settings.suspect_without_relays,
            label: self
                .node
                .label
                .clone()
                .unwrap_or_else(|| format!("detector-{}", self.node.bind_addr)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn local_member(&self) -> Member {
        let id = match &self.node.label {
            Some(label) => MemberId::new(label.clone()),
            None => MemberId::generate(self.node.bind_addr),
        };
        Member::new(id, self.node.bind_addr)
    }

    pub fn peers(&self) -> Vec<Member> {
        self.members
            .iter()
            .map(|m| Member::new(MemberId::new(m.id.clone()), m.addr))
            .collect()
    }
}

/// Timing and fan-out parameters of one detector instance.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Period between direct probes.
    pub interval: Duration,
    /// Deadline for a direct ack, both for our own probes and for probes run on behalf of a requester.
    pub ping_timeout: Duration,
    /// Suspicion deadline of an indirect-probe round.
    pub ping_req_timeout: Duration,
    /// Number of relay peers asked per round.
    pub ping_req_group_size: usize,
    /// Local cleanup deadline of each relay leg. `None` reuses `ping_req_timeout`.
    pub relay_leg_timeout: Option<Duration>,
    /// Arm the suspicion timer even when no relay peer is available.
    pub suspect_without_relays: bool,
    pub label: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(20),
            ping_timeout: Duration::from_millis(4),
            ping_req_timeout: Duration::from_millis(12),
            ping_req_group_size: 3,
            relay_leg_timeout: None,
            suspect_without_relays: false,
            label: "detector".to_string(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    pub fn relay_leg_timeout(&self) -> Duration {
        self.relay_leg_timeout.unwrap_or(self.ping_req_timeout)
    }
}
