use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "framebridge.toml";

/// Configuration for the bridge runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// EtherType the bridge binds its raw sockets to
    #[serde(default = "default_protocol")]
    pub protocol: u16,

    /// Receive-buffer capacity per device, in bytes
    #[serde(default = "default_rx_buffer_size")]
    pub rx_buffer_size: usize,

    /// Receive attempts per device and poll pass
    #[serde(default = "default_poll_budget")]
    pub poll_budget: usize,

    /// Only offer interfaces whose name is listed; empty offers all
    /// discovered Ethernet interfaces.
    #[serde(default)]
    pub interfaces: Vec<String>,

    /// Delay between poll passes
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Delay between health log lines
    #[serde(with = "humantime_serde", default = "default_health_interval")]
    pub health_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            rx_buffer_size: default_rx_buffer_size(),
            poll_budget: default_poll_budget(),
            interfaces: Vec::new(),
            poll_interval: default_poll_interval(),
            health_interval: default_health_interval(),
        }
    }
}

fn default_protocol() -> u16 {
    framebridge_core::DEFAULT_PROTOCOL
}

fn default_rx_buffer_size() -> usize {
    framebridge_core::DEFAULT_RX_BUFFER_SIZE
}

fn default_poll_budget() -> usize {
    framebridge_core::DEFAULT_POLL_BUDGET
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1)
}

fn default_health_interval() -> Duration {
    Duration::from_secs(5)
}

pub fn default_config_path() -> Result<PathBuf> {
    let proj = ProjectDirs::from("io", "Framebridge", "Framebridge")
        .context("could not determine platform config directory")?;
    Ok(proj.config_dir().join(CONFIG_FILE_NAME))
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory: {}", parent.display()))?;
    }
    Ok(())
}

pub fn load(path: &Path) -> Result<BridgeConfig> {
    if !path.exists() {
        return Ok(BridgeConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: BridgeConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
    Ok(cfg)
}

pub fn save(path: &Path, cfg: &BridgeConfig, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        anyhow::bail!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    ensure_parent_dir(path)?;
    let raw = toml::to_string_pretty(cfg).context("failed to serialize config to TOML")?;
    fs::write(path, raw).with_context(|| format!("failed to write config: {}", path.display()))?;
    Ok(())
}
