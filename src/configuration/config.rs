use super::types::BroadcastSchedule;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line arguments of the server binary.
///
/// Every flag is optional: values given here take precedence over the ones read from the
/// configuration file, which themselves take precedence over the built-in defaults.
#[derive(Parser, Debug, Clone)]
#[command(name = "voxlink-server")]
#[command(version)]
#[command(about = "Toy TCP/WebSocket/UDP server for the voxlink assistant")]
pub struct Args {
    /// Path to a TOML configuration file
    pub config_file: Option<PathBuf>,

    /// Address every listener binds to
    ///
    /// # Command Line
    /// Use `--bind-address <ADDRESS>` to set this value from the CLI
    #[arg(long, env = "VOXLINK_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Port of the TCP profile listener
    #[arg(long)]
    pub tcp_port: Option<u16>,

    /// Port of the WebSocket broadcast service
    #[arg(long)]
    pub ws_port: Option<u16>,

    /// Port of the UDP hint listener
    #[arg(long)]
    pub udp_port: Option<u16>,
}

/// Server configuration.
///
/// # Fields Overview
///
/// - `bind_address`: IP address shared by the three listeners
/// - `tcp_port` / `ws_port` / `udp_port`: one port per protocol, all distinct
/// - `session_timeout_secs`: idle time after which a session is swept
/// - `event_cache_size`: capacity of the server-side diagnostic event ring buffer
/// - `broadcast_min_interval_secs` / `broadcast_max_interval_secs`: bounds of the random pause
///   between two broadcast cycles
/// - `data_update_delay_secs`: pause between the `day_event` and the `data_update` of a cycle
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub tcp_port: u16,
    pub ws_port: u16,
    pub udp_port: u16,
    pub session_timeout_secs: u64,
    pub event_cache_size: usize,
    pub broadcast_min_interval_secs: u64,
    pub broadcast_max_interval_secs: u64,
    pub data_update_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0"),
            tcp_port: 5000,
            ws_port: 8765,
            udp_port: 5002,
            session_timeout_secs: 30 * 60,
            event_cache_size: 20,
            broadcast_min_interval_secs: 60,
            broadcast_max_interval_secs: 300,
            data_update_delay_secs: 5,
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file. Missing keys fall back to their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the effective configuration: file (if any), then command-line overrides.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config_file {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };

        if let Some(ref addr) = args.bind_address {
            config.bind_address = addr.clone();
        }
        if let Some(port) = args.tcp_port {
            config.tcp_port = port;
        }
        if let Some(port) = args.ws_port {
            config.ws_port = port;
        }
        if let Some(port) = args.udp_port {
            config.udp_port = port;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_ip()?;

        // Port 0 asks the OS for an ephemeral port, so it may repeat
        let ports = [self.tcp_port, self.ws_port, self.udp_port];
        let fixed: Vec<u16> = ports.iter().copied().filter(|p| *p != 0).collect();
        for (i, port) in fixed.iter().enumerate() {
            if fixed[i + 1..].contains(port) {
                return Err(ConfigError::BadPortsRange(format!(
                    "port {} is assigned to more than one listener",
                    port
                )));
            }
        }

        if self.session_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "session_timeout_secs must be greater than 0",
            )));
        }
        if self.event_cache_size == 0 || self.event_cache_size > 1000 {
            return Err(ConfigError::NotInRange(format!(
                "event_cache_size must be in 1..=1000, got {}",
                self.event_cache_size
            )));
        }
        if self.broadcast_min_interval_secs > self.broadcast_max_interval_secs {
            return Err(ConfigError::NotInRange(format!(
                "broadcast interval bounds are inverted ({} > {})",
                self.broadcast_min_interval_secs, self.broadcast_max_interval_secs
            )));
        }

        Ok(())
    }

    fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.bind_address
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::BadIPFormatting(format!("{}: {}", self.bind_address, e)))
    }

    pub fn tcp_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.tcp_port))
    }

    pub fn ws_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.ws_port))
    }

    pub fn udp_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.udp_port))
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn broadcast_schedule(&self) -> BroadcastSchedule {
        BroadcastSchedule {
            min_interval: Duration::from_secs(self.broadcast_min_interval_secs),
            max_interval: Duration::from_secs(self.broadcast_max_interval_secs),
            data_update_delay: Duration::from_secs(self.data_update_delay_secs),
        }
    }
}
