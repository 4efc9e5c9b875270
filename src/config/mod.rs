//! Configuration management for the show-control hub
//!
//! Handles loading, parsing, and validation of the YAML configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tokio::fs;

use crate::drivers::DriverError;

/// Prefixes handled by the hub itself; drivers may not claim them
pub const RESERVED_PREFIXES: &[&str] = &["fade", "system"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub drivers: Vec<DriverConfig>,
}

/// Hub-level settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HubConfig {
    /// UDP address for incoming OSC commands (`null` disables the listener)
    #[serde(default = "default_osc_listen")]
    pub osc_listen: Option<String>,
    /// Fade engine tick cadence
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            osc_listen: default_osc_listen(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Status API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_bind")]
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_api_bind(),
        }
    }
}

/// Transport family of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum TransportKind {
    /// OSC datagrams over UDP
    #[serde(rename = "osc")]
    OscUdp,
    /// OSC over a persistent TCP stream
    #[serde(rename = "osc-tcp")]
    OscTcp,
    /// Line-based text commands over TCP
    #[serde(rename = "tcp-text")]
    TcpText,
}

impl TransportKind {
    /// Canonical name, also the default driver name
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::OscUdp => "osc",
            TransportKind::OscTcp => "osc-tcp",
            TransportKind::TcpText => "tcp-text",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Packet framing for OSC over TCP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OscFraming {
    /// OSC 1.0: 32-bit big-endian size prefix
    #[default]
    Length,
    /// OSC 1.1: double-END SLIP
    Slip,
}

/// One device driver
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
    #[serde(rename = "type")]
    pub kind: TransportKind,
    /// Leading address segment owned by this driver (e.g. "lights")
    pub prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// `osc-tcp` only
    #[serde(default)]
    pub framing: OscFraming,
    /// `tcp-text` only
    #[serde(default = "default_terminator")]
    pub terminator: String,
}

impl DriverConfig {
    /// Config with defaults for everything but the essentials
    pub fn new(kind: TransportKind, prefix: &str, host: &str, port: u16) -> Self {
        Self {
            kind,
            prefix: prefix.to_string(),
            host: Some(host.to_string()),
            port: Some(port),
            name: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            framing: OscFraming::default(),
            terminator: default_terminator(),
        }
    }

    /// Driver name: explicit, or the canonical transport name
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.as_str())
    }

    /// Prefix without surrounding slashes
    pub fn prefix(&self) -> &str {
        self.prefix.trim_matches('/')
    }

    /// Remote host (empty when missing; `validate` rejects that)
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or_default()
    }

    /// Remote port (0 when missing; `validate` rejects that)
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_default()
    }

    /// `host:port`
    pub fn target(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }

    /// Reject configurations a driver can never work with
    pub fn validate(&self) -> Result<(), DriverError> {
        let name = self.name();
        let prefix = self.prefix();

        if name.trim().is_empty() {
            return Err(DriverError::invalid(name, "name cannot be empty"));
        }
        if prefix.is_empty() {
            return Err(DriverError::invalid(name, "prefix cannot be empty"));
        }
        if prefix.contains('/') {
            return Err(DriverError::invalid(
                name,
                format!("prefix '{}' must be a single path segment", prefix),
            ));
        }
        if RESERVED_PREFIXES.contains(&prefix) {
            return Err(DriverError::invalid(
                name,
                format!("prefix '{}' is reserved by the hub", prefix),
            ));
        }
        if self.host().trim().is_empty() {
            return Err(DriverError::invalid(name, "host is required"));
        }
        if self.port() == 0 {
            return Err(DriverError::invalid(name, "port is required"));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(DriverError::invalid(name, "reconnect_delay_ms must be > 0"));
        }
        if self.kind == TransportKind::TcpText && self.terminator.is_empty() {
            return Err(DriverError::invalid(name, "terminator cannot be empty"));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.hub.tick_interval_ms == 0 {
            anyhow::bail!("hub.tick_interval_ms must be greater than 0");
        }
        if self.api.enabled && self.api.bind.trim().is_empty() {
            anyhow::bail!("api.bind cannot be empty when the API is enabled");
        }

        let mut prefixes = HashSet::new();
        let mut names = HashSet::new();
        for (idx, driver) in self.drivers.iter().enumerate() {
            driver
                .validate()
                .with_context(|| format!("Invalid driver #{}", idx))?;

            if !prefixes.insert(driver.prefix().to_string()) {
                anyhow::bail!(
                    "Driver '{}' reuses prefix '{}'",
                    driver.name(),
                    driver.prefix()
                );
            }
            if !names.insert(driver.name().to_string()) {
                anyhow::bail!("Duplicate driver name '{}'", driver.name());
            }
        }

        Ok(())
    }
}

// Default value functions
fn default_osc_listen() -> Option<String> { Some("0.0.0.0:9000".to_string()) }
fn default_tick_interval_ms() -> u64 { 10 }
fn default_true() -> bool { true }
fn default_api_bind() -> String { "127.0.0.1:8125".to_string() }
fn default_reconnect_delay_ms() -> u64 { 2000 }
fn default_connect_timeout_ms() -> u64 { 3000 }
fn default_terminator() -> String { "\n".to_string() }
