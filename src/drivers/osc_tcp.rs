//! OSC over a persistent TCP stream
//!
//! Packets are framed either with a 32-bit big-endian length prefix
//! (OSC 1.0) or with double-END SLIP (OSC 1.1). EOF or a socket error ends
//! the link and the driver reconnects.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::args::Arg;
use super::error::DriverError;
use super::lifecycle::Transport;
use super::link::{Link, LinkListener};
use super::osc;
use crate::config::{DriverConfig, OscFraming, TransportKind};

const SLIP_END: u8 = 0xC0;
const SLIP_ESC: u8 = 0xDB;
const SLIP_ESC_END: u8 = 0xDC;
const SLIP_ESC_ESC: u8 = 0xDD;

/// Largest length-prefixed packet we accept from a device
const MAX_PACKET: usize = 1 << 20;

/// OSC stream transport
#[derive(Debug)]
pub struct OscTcpTransport {
    framing: OscFraming,
}

impl OscTcpTransport {
    pub fn new(framing: OscFraming) -> Self {
        Self { framing }
    }
}

/// Wrap one encoded packet in a frame
pub fn frame_packet(framing: OscFraming, packet: &[u8]) -> Bytes {
    match framing {
        OscFraming::Length => {
            let mut out = BytesMut::with_capacity(packet.len() + 4);
            out.put_u32(packet.len() as u32);
            out.put_slice(packet);
            out.freeze()
        },
        OscFraming::Slip => {
            let mut out = BytesMut::with_capacity(packet.len() + 2);
            out.put_u8(SLIP_END);
            for &b in packet {
                match b {
                    SLIP_END => out.put_slice(&[SLIP_ESC, SLIP_ESC_END]),
                    SLIP_ESC => out.put_slice(&[SLIP_ESC, SLIP_ESC_ESC]),
                    _ => out.put_u8(b),
                }
            }
            out.put_u8(SLIP_END);
            out.freeze()
        },
    }
}

/// Incremental frame splitter for the read side
#[derive(Debug)]
pub struct FrameDecoder {
    framing: OscFraming,
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new(framing: OscFraming) -> Self {
        Self {
            framing,
            buf: BytesMut::new(),
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next complete packet, if buffered. Errors mean the stream is unusable.
    pub fn next_packet(&mut self) -> Result<Option<Bytes>, String> {
        match self.framing {
            OscFraming::Length => self.next_length_prefixed(),
            OscFraming::Slip => Ok(self.next_slip()),
        }
    }

    fn next_length_prefixed(&mut self) -> Result<Option<Bytes>, String> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_PACKET {
            return Err(format!("packet of {} bytes exceeds limit", len));
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        self.buf.advance(4);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    fn next_slip(&mut self) -> Option<Bytes> {
        loop {
            let end = self.buf.iter().position(|&b| b == SLIP_END)?;
            let raw = self.buf.split_to(end + 1);
            let body = &raw[..end];
            if body.is_empty() {
                // Leading END of a double-END frame
                continue;
            }

            let mut packet = BytesMut::with_capacity(body.len());
            let mut escaped = false;
            for &b in body {
                if escaped {
                    packet.put_u8(match b {
                        SLIP_ESC_END => SLIP_END,
                        SLIP_ESC_ESC => SLIP_ESC,
                        other => other,
                    });
                    escaped = false;
                } else if b == SLIP_ESC {
                    escaped = true;
                } else {
                    packet.put_u8(b);
                }
            }
            return Some(packet.freeze());
        }
    }
}

#[async_trait]
impl Transport for OscTcpTransport {
    const KIND: TransportKind = TransportKind::OscTcp;

    fn from_config(config: &DriverConfig) -> Result<Self, DriverError> {
        Ok(Self::new(config.framing))
    }

    async fn open(
        &self,
        config: &DriverConfig,
        listener: Arc<dyn LinkListener>,
    ) -> Result<Link, DriverError> {
        let stream = connect_stream(config).await?;
        let peer = config.target();
        let (mut read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

        let writer_listener = Arc::clone(&listener);
        let writer_peer = peer.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = write_half.write_all(&frame).await {
                    warn!("OSC/TCP write to {} failed: {}", writer_peer, e);
                    writer_listener.on_lost(format!("write failed: {}", e));
                    return;
                }
            }
        });

        let framing = self.framing;
        let reader = tokio::spawn(async move {
            let mut decoder = FrameDecoder::new(framing);
            let mut chunk = vec![0u8; 8192];
            loop {
                let n = match read_half.read(&mut chunk).await {
                    Ok(0) => {
                        listener.on_lost(format!("{} closed the connection", peer));
                        return;
                    },
                    Ok(n) => n,
                    Err(e) => {
                        listener.on_lost(format!("read failed: {}", e));
                        return;
                    },
                };
                decoder.extend(&chunk[..n]);

                loop {
                    match decoder.next_packet() {
                        Ok(Some(packet)) => match osc::decode_packet(&packet) {
                            Ok(commands) => {
                                for command in commands {
                                    listener.on_inbound(command);
                                }
                            },
                            Err(e) => trace!("OSC/TCP undecodable packet from {}: {:?}", peer, e),
                        },
                        Ok(None) => break,
                        Err(reason) => {
                            listener.on_lost(reason);
                            return;
                        },
                    }
                }
            }
        });

        Ok(Link::new(tx, vec![writer, reader]))
    }

    fn encode(&self, address: &str, args: &[Arg]) -> Result<Bytes, DriverError> {
        let packet = osc::encode_message(address, args)?;
        Ok(frame_packet(self.framing, &packet))
    }
}

/// TCP connect bounded by the configured timeout; shared with the text transport
pub(crate) async fn connect_stream(config: &DriverConfig) -> Result<TcpStream, DriverError> {
    let target = config.target();
    let timeout = Duration::from_millis(config.connect_timeout_ms);

    let stream = tokio::time::timeout(timeout, TcpStream::connect(target.clone()))
        .await
        .map_err(|_| DriverError::ConnectTimeout {
            target: target.clone(),
            timeout_ms: config.connect_timeout_ms,
        })?
        .map_err(|source| DriverError::Connect {
            target: target.clone(),
            source,
        })?;

    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay on {} failed: {}", target, e);
    }
    Ok(stream)
}
