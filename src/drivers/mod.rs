//! Device drivers (OSC over UDP, OSC over TCP, line-based TCP text)
//!
//! A driver owns one address prefix and one remote device. Commands arrive
//! with the prefix already stripped; fade ticks arrive with their full key
//! minus the prefix. All variants share the lifecycle in [`lifecycle`].

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::command::Command;
use crate::config::{DriverConfig, TransportKind};
use crate::hub::HubContext;
use crate::signal::Signal;

pub mod args;
pub mod error;
pub mod lifecycle;
pub mod link;
pub mod osc;
pub mod osc_tcp;
pub mod osc_udp;
pub mod text;

pub use self::args::{normalize_args, numeric_value, Arg, ArgError, ArgKind};
pub use self::lifecycle::{Transport, TransportDriver};
pub use self::error::DriverError;
pub use self::link::{Link, LinkListener};
pub use self::osc_tcp::OscTcpTransport;
pub use self::osc_udp::OscUdpTransport;
pub use self::text::TextTransport;

/// Lifecycle and traffic notifications of a driver
///
/// Listeners run synchronously on the emitting task and must not block.
#[derive(Debug)]
pub struct DriverEvents {
    pub connected: Signal<()>,
    pub disconnected: Signal<()>,
    /// Human-readable failure reason
    pub error: Signal<String>,
    /// Inbound device traffic, address relative to the driver prefix
    pub message: Signal<Command>,
}

impl DriverEvents {
    pub fn new() -> Self {
        Self {
            connected: Signal::new("connected"),
            disconnected: Signal::new("disconnected"),
            error: Signal::new("error"),
            message: Signal::new("message"),
        }
    }
}

impl Default for DriverEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver trait - every device integration implements this
///
/// All methods take `&self` so drivers can live behind `Arc<dyn Driver>`.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver name (explicit from config, or the transport name)
    fn name(&self) -> &str;

    /// Prefix this driver is registered under, without slashes
    fn prefix(&self) -> &str;

    /// The config the driver was built from
    fn config(&self) -> &DriverConfig;

    fn events(&self) -> &DriverEvents;

    /// Open the link. A failed attempt is reported and retried in the
    /// background until it succeeds or `disconnect` is called.
    async fn connect(&self) -> Result<(), DriverError>;

    /// Close the link and stop reconnecting. Queued commands are kept.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Send a command, or queue it until the link is up
    fn handle_osc(&self, address: &str, args: &[Value]);

    /// Send one fade step. Dropped while offline; repeats are suppressed.
    fn handle_fade_tick(&self, key: &str, value: f64);

    /// Commands waiting for a link
    fn queued_len(&self) -> usize {
        0
    }

    /// Give the driver access to the hub's fade and value table
    fn attach_context(&self, _context: Arc<dyn HubContext>) {
        // Default: driver has no use for the context
    }
}

/// Build a driver for `config`, rejecting invalid configs up front
pub fn build(config: DriverConfig) -> Result<Arc<dyn Driver>, DriverError> {
    let driver: Arc<dyn Driver> = match config.kind {
        TransportKind::OscUdp => Arc::new(TransportDriver::<OscUdpTransport>::new(config)?),
        TransportKind::OscTcp => Arc::new(TransportDriver::<OscTcpTransport>::new(config)?),
        TransportKind::TcpText => Arc::new(TransportDriver::<TextTransport>::new(config)?),
    };
    Ok(driver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_selects_transport() {
        for kind in [TransportKind::OscUdp, TransportKind::OscTcp, TransportKind::TcpText] {
            let driver = build(DriverConfig::new(kind, "/dev/", "127.0.0.1", 7000)).unwrap();
            assert_eq!(driver.name(), kind.as_str());
            assert_eq!(driver.prefix(), "dev");
            assert!(!driver.is_connected());
            assert_eq!(driver.queued_len(), 0);
        }
    }

    #[test]
    fn test_build_rejects_missing_host() {
        let config = DriverConfig {
            host: None,
            ..DriverConfig::new(TransportKind::TcpText, "cam", "", 5678)
        };
        let err = build(config).err().unwrap();
        assert!(err.to_string().contains("host is required"));
    }
}
