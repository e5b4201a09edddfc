//! Configuration module
//!
//! Handles loading and saving LanChat configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::engine::EngineConfig;
use crate::network::NetworkConfig as NetConfig;
use crate::protocol::{DEFAULT_DISCOVERY_PORT, DEFAULT_TCP_PORT, MAX_FRAME_SIZE};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Message transport settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Presence and liveness settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Display name announced to peers
    pub name: String,
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            verbose: false,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP port to accept messages on
    #[serde(default = "default_tcp_port")]
    pub port: u16,
    /// Connect/send timeout in ms
    #[serde(default = "default_timeout")]
    pub connect_timeout_ms: u64,
    /// Inbound frame read timeout in ms
    #[serde(default = "default_timeout")]
    pub read_timeout_ms: u64,
    /// Largest accepted frame in bytes
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_timeout() -> u64 {
    5000
}

fn default_max_frame_size() -> usize {
    MAX_FRAME_SIZE
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_tcp_port(),
            connect_timeout_ms: default_timeout(),
            read_timeout_ms: default_timeout(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// UDP port announcements are sent to and received on
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    /// Destination address of announcements
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: IpAddr,
    /// First destination port of announcements (defaults to `port`)
    pub broadcast_port: Option<u16>,
    /// Also announce to this many ports above the broadcast port
    #[serde(default)]
    pub broadcast_port_span: u16,
    /// Address used to recognise our own announcements
    /// (resolved automatically if not set)
    pub local_address: Option<IpAddr>,
    /// Announcement interval in ms
    #[serde(default = "default_announce_interval")]
    pub announce_interval_ms: u64,
    /// Liveness sweep interval in ms
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
    /// Silence after which a peer is marked offline, in ms
    #[serde(default = "default_offline_after")]
    pub offline_after_ms: u64,
    /// Peers seen within this window receive group messages, in ms
    #[serde(default = "default_group_window")]
    pub group_window_ms: u64,
}

fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}

fn default_broadcast_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::BROADCAST)
}

fn default_announce_interval() -> u64 {
    5000
}

fn default_sweep_interval() -> u64 {
    2000
}

fn default_offline_after() -> u64 {
    15_000
}

fn default_group_window() -> u64 {
    30_000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            broadcast_address: default_broadcast_address(),
            broadcast_port: None,
            broadcast_port_span: 0,
            local_address: None,
            announce_interval_ms: default_announce_interval(),
            sweep_interval_ms: default_sweep_interval(),
            offline_after_ms: default_offline_after(),
            group_window_ms: default_group_window(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("lanchat/config.toml")),
            Some(PathBuf::from("./lanchat.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Build the engine settings
    pub fn engine_config(&self) -> EngineConfig {
        let d = &self.discovery;
        EngineConfig {
            name: self.general.name.clone(),
            network: NetConfig {
                port: self.network.port,
                connect_timeout_ms: self.network.connect_timeout_ms,
                read_timeout_ms: self.network.read_timeout_ms,
                max_frame_size: self.network.max_frame_size,
            },
            discovery_port: d.port,
            broadcast_address: d.broadcast_address,
            broadcast_port: d.broadcast_port.unwrap_or(d.port),
            broadcast_port_span: d.broadcast_port_span,
            local_address: d.local_address,
            announce_interval: Duration::from_millis(d.announce_interval_ms),
            sweep_interval: Duration::from_millis(d.sweep_interval_ms),
            offline_after: Duration::from_millis(d.offline_after_ms),
            group_window: Duration::from_millis(d.group_window_ms),
        }
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        general: GeneralConfig {
            name: "alice".to_string(),
            verbose: false,
        },
        discovery: DiscoveryConfig {
            broadcast_port_span: 2,
            ..Default::default()
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}
