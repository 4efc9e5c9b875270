//! OSC over UDP
//!
//! The socket is bound to an ephemeral local port and connected to the
//! device, so replies come back on the same socket. UDP has no session: the
//! link is up as soon as the socket is. A failed send, or a refused port
//! reported back through ICMP, drops the link so the error is recorded and the
//! socket is reopened by the reconnect loop.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::args::Arg;
use super::error::DriverError;
use super::lifecycle::Transport;
use super::link::{Link, LinkListener};
use super::osc;
use crate::config::{DriverConfig, TransportKind};

const MAX_DATAGRAM: usize = 65_536;

/// OSC datagram transport
#[derive(Debug, Default)]
pub struct OscUdpTransport;

/// Resolve `host:port`, bounded by the configured connect timeout
pub(crate) async fn resolve(config: &DriverConfig) -> Result<SocketAddr, DriverError> {
    let target = config.target();
    let timeout = Duration::from_millis(config.connect_timeout_ms);

    let mut addrs = tokio::time::timeout(timeout, lookup_host(target.clone()))
        .await
        .map_err(|_| DriverError::ConnectTimeout {
            target: target.clone(),
            timeout_ms: config.connect_timeout_ms,
        })?
        .map_err(|source| DriverError::Connect {
            target: target.clone(),
            source,
        })?;

    addrs.next().ok_or_else(|| DriverError::Connect {
        target,
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"),
    })
}

#[async_trait]
impl Transport for OscUdpTransport {
    const KIND: TransportKind = TransportKind::OscUdp;

    fn from_config(_config: &DriverConfig) -> Result<Self, DriverError> {
        Ok(Self)
    }

    async fn open(
        &self,
        config: &DriverConfig,
        listener: Arc<dyn LinkListener>,
    ) -> Result<Link, DriverError> {
        let remote = resolve(config).await?;
        let local = if remote.is_ipv6() {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        };

        let connect_err = |source: std::io::Error| DriverError::Connect {
            target: remote.to_string(),
            source,
        };
        let socket = UdpSocket::bind(local).await.map_err(connect_err)?;
        socket.connect(remote).await.map_err(connect_err)?;
        let socket = Arc::new(socket);
        debug!(
            "OSC/UDP socket {:?} -> {}",
            socket.local_addr().ok(),
            remote
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

        let writer_socket = Arc::clone(&socket);
        let writer_listener = Arc::clone(&listener);
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = writer_socket.send(&frame).await {
                    warn!("OSC/UDP send to {} failed: {}", remote, e);
                    writer_listener.on_lost(format!("send to {} failed: {}", remote, e));
                    return;
                }
            }
        });

        let reader = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match socket.recv(&mut buf).await {
                    Ok(len) => match osc::decode_packet(&buf[..len]) {
                        Ok(commands) => {
                            for command in commands {
                                listener.on_inbound(command);
                            }
                        },
                        Err(e) => trace!("OSC/UDP undecodable datagram from {}: {:?}", remote, e),
                    },
                    // ICMP port unreachable from an earlier send surfaces here
                    Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                        listener.on_lost(format!("{} refused datagrams: {}", remote, e));
                        return;
                    },
                    Err(e) => {
                        trace!("OSC/UDP recv from {} failed: {}", remote, e);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    },
                }
            }
        });

        Ok(Link::new(tx, vec![writer, reader]))
    }

    fn encode(&self, address: &str, args: &[Arg]) -> Result<Bytes, DriverError> {
        osc::encode_message(address, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{Driver, TransportDriver};
    use crate::fade::FadeEngine;
    use crate::hub::EngineContext;
    use crate::stats::StatsRegistry;
    use rosc::{OscMessage, OscPacket, OscType};
    use serde_json::json;

    async fn recv_message(socket: &UdpSocket) -> (OscMessage, SocketAddr) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("no datagram")
            .unwrap();
        match rosc::decoder::decode_udp(&buf[..len]).unwrap().1 {
            OscPacket::Message(msg) => (msg, from),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    async fn device() -> (UdpSocket, TransportDriver<OscUdpTransport>) {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = device.local_addr().unwrap().port();
        let driver = TransportDriver::<OscUdpTransport>::new(DriverConfig::new(
            TransportKind::OscUdp,
            "lights",
            "127.0.0.1",
            port,
        ))
        .unwrap();
        (device, driver)
    }

    #[tokio::test]
    async fn test_sends_typed_arguments() {
        let (device, driver) = device().await;
        driver.connect().await.unwrap();
        assert!(driver.is_connected());

        driver.handle_osc("/mix/3/fader", &[json!(0.5), json!(2), json!("on")]);
        let (msg, _) = recv_message(&device).await;
        assert_eq!(msg.addr, "/mix/3/fader");
        assert_eq!(
            msg.args,
            vec![
                OscType::Float(0.5),
                OscType::Int(2),
                OscType::String("on".into())
            ]
        );

        driver.handle_fade_tick("/mix/3/fader", 0.25);
        let (msg, _) = recv_message(&device).await;
        assert_eq!(msg.args, vec![OscType::Float(0.25)]);

        driver.disconnect().await;
    }

    #[tokio::test]
    async fn test_replies_reach_context() {
        let (device, driver) = device().await;
        let engine = Arc::new(FadeEngine::new());
        driver.attach_context(Arc::new(EngineContext::new(Arc::clone(&engine))));
        driver.connect().await.unwrap();

        driver.handle_osc("/ping", &[]);
        let (_, from) = recv_message(&device).await;

        let reply = rosc::encoder::encode(&OscPacket::Message(OscMessage {
            addr: "/mix/1/fader".into(),
            args: vec![OscType::Float(0.75)],
        }))
        .unwrap();
        device.send_to(&reply, from).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while engine.get_current_value("/lights/mix/1/fader").is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("feedback not recorded");
        assert_eq!(engine.get_current_value("/lights/mix/1/fader"), Some(0.75));

        driver.disconnect().await;
    }

    #[tokio::test]
    async fn test_send_failure_is_recorded_and_link_reopened() {
        let (_device, driver) = device().await;
        let config = DriverConfig {
            reconnect_delay_ms: 50,
            ..driver.config().clone()
        };
        let driver: Arc<dyn Driver> =
            Arc::new(TransportDriver::<OscUdpTransport>::new(config).unwrap());
        let stats = StatsRegistry::new();
        stats.attach(&driver);
        driver.connect().await.unwrap();

        // Larger than any UDP datagram, so the kernel rejects the send
        let oversized = "x".repeat(MAX_DATAGRAM + 1024);
        driver.handle_osc("/text/1", &[json!(oversized)]);

        tokio::time::timeout(Duration::from_secs(2), async {
            while stats.get("lights").and_then(|s| s.last_error).is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("send failure not recorded");
        let recorded = stats.get("lights").unwrap();
        assert!(recorded.last_error.unwrap().contains("send to"));

        // The reconnect loop brings a fresh socket up
        tokio::time::timeout(Duration::from_secs(2), async {
            while stats.get("lights").map_or(0, |s| s.reconnect_count) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("link not reopened");
        assert!(driver.is_connected());

        driver.disconnect().await;
    }

    #[tokio::test]
    async fn test_unresolvable_host_fails_connect() {
        let config = DriverConfig {
            connect_timeout_ms: 500,
            reconnect_delay_ms: 60_000,
            ..DriverConfig::new(TransportKind::OscUdp, "lights", "host.invalid", 9000)
        };
        let driver = TransportDriver::<OscUdpTransport>::new(config).unwrap();
        assert!(driver.connect().await.is_err());
        assert!(!driver.is_connected());
        driver.disconnect().await;
    }
}
