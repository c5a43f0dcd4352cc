//! Command-line arguments and the TOML configuration file.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;

/// Media relay statistics daemon.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "relay.toml", env = "RELAY_CONFIG")]
    pub config: PathBuf,

    /// Control and metrics listen address (overrides config file)
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Reporting interval in seconds (overrides config file)
    #[arg(short, long)]
    pub interval: Option<u64>,
}

mod defaults {
    use std::net::{Ipv4Addr, SocketAddr};

    pub fn listen() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 2225))
    }

    pub fn interval_seconds() -> u64 {
        60
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "defaults::listen")]
    pub listen: SocketAddr,

    /// Reporting interval; 0 disables rotation and duration rollback.
    #[serde(default = "defaults::interval_seconds")]
    pub interval_seconds: u64,

    /// `tracing` filter directive; `RUST_LOG` wins when set.
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

/// One address of a logical interface. Several entries may share a name;
/// the first one's family is the interface's preferred family.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    pub name: String,
    pub address: IpAddr,
    pub port_min: u16,
    pub port_max: u16,
}

impl InterfaceConfig {
    pub fn loopback() -> Self {
        Self {
            name: "default".into(),
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port_min: 30000,
            port_max: 40000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            interval_seconds: defaults::interval_seconds(),
            log_level: None,
            interfaces: vec![InterfaceConfig::loopback()],
        }
    }
}

impl Config {
    /// Read `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        if config.interfaces.is_empty() {
            config.interfaces.push(InterfaceConfig::loopback());
        }
        Ok(config)
    }

    /// Command-line values take precedence over the file.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(listen) = args.listen {
            self.listen = listen;
        }
        if let Some(interval) = args.interval {
            self.interval_seconds = interval;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (i, lif) in self.interfaces.iter().enumerate() {
            if lif.name.trim().is_empty() {
                bail!("Interface {} has an empty name", i);
            }
            if lif.port_min > lif.port_max {
                bail!(
                    "Interface '{}' ({}): port_min {} exceeds port_max {}",
                    lif.name,
                    lif.address,
                    lif.port_min,
                    lif.port_max
                );
            }
        }
        Ok(())
    }
}
