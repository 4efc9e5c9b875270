//! OSC command ingress
//!
//! Listens for OSC over UDP, flattens bundles and hands every message to the
//! hub. Arguments travel as tagged values so an OSC float `1.0` stays a float.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::drivers::osc;
use crate::hub::Hub;

const MAX_DATAGRAM: usize = 65_536;

/// Bound ingress socket, ready to be run
pub struct OscIngress {
    socket: UdpSocket,
}

impl OscIngress {
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind OSC listener on {}", addr))?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until the task is aborted
    pub fn spawn(self, hub: Arc<Hub>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Ok(addr) = self.socket.local_addr() {
                info!("📡 OSC listener on udp://{}", addr);
            }
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (len, from) = match self.socket.recv_from(&mut buf).await {
                    Ok(r) => r,
                    Err(e) => {
                        debug!("OSC listener recv error: {}", e);
                        continue;
                    },
                };

                let commands = match osc::decode_packet(&buf[..len]) {
                    Ok(commands) => commands,
                    Err(e) => {
                        warn!("Ignoring undecodable OSC packet from {}: {:?}", from, e);
                        continue;
                    },
                };
                for command in commands {
                    trace!("IN {} {}", from, command);
                    // Failures are logged by the hub
                    let _ = hub.dispatch(&command);
                }
            }
        })
    }
}
