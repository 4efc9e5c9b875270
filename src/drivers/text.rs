//! Line-based text commands over TCP
//!
//! Outbound: `address arg arg…` followed by the configured terminator.
//! Strings that are empty or contain whitespace or quotes go out
//! double-quoted with `\"` and `\\` escapes. Floats always carry a decimal
//! point so the peer can tell `1.0` from `1`.
//!
//! Inbound lines are tokenized the same way and classified back into
//! int, float or string arguments.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use super::args::Arg;
use super::error::DriverError;
use super::lifecycle::Transport;
use super::link::{Link, LinkListener};
use super::osc_tcp::connect_stream;
use crate::command::Command;
use crate::config::{DriverConfig, TransportKind};

/// Longest inbound line kept before the buffer is discarded
const MAX_LINE: usize = 64 * 1024;

/// Text-command transport
#[derive(Debug)]
pub struct TextTransport {
    terminator: String,
}

impl TextTransport {
    pub fn new(terminator: impl Into<String>) -> Self {
        Self {
            terminator: terminator.into(),
        }
    }

    /// Render one command as a line, terminator included
    pub fn format_line(&self, address: &str, args: &[Arg]) -> Result<String, DriverError> {
        if address.chars().any(char::is_whitespace) {
            return Err(DriverError::Encode(format!(
                "address '{}' contains whitespace",
                address
            )));
        }

        let mut line = address.to_string();
        for arg in args {
            line.push(' ');
            match arg {
                Arg::Int(i) => line.push_str(&i.to_string()),
                Arg::Float(f) => line.push_str(&format_float(*f)?),
                Arg::Str(s) => line.push_str(&quote(s)),
            }
        }
        line.push_str(&self.terminator);
        Ok(line)
    }
}

fn format_float(value: f32) -> Result<String, DriverError> {
    if !value.is_finite() {
        return Err(DriverError::Encode(format!("non-finite float {}", value)));
    }
    let text = value.to_string();
    if text.contains('.') {
        Ok(text)
    } else {
        Ok(format!("{}.0", text))
    }
}

fn quote(s: &str) -> String {
    let needs_quotes =
        s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\');
    if !needs_quotes {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Split a line into tokens, honoring double quotes. The flag marks tokens
/// that were quoted (always strings).
fn tokenize(line: &str) -> Vec<(String, bool)> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut token = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            token.push(escaped);
                        }
                    },
                    '"' => break,
                    other => token.push(other),
                }
            }
            tokens.push((token, true));
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push((token, false));
        }
    }
    tokens
}

fn classify(token: String, quoted: bool) -> Arg {
    if quoted {
        return Arg::Str(token);
    }
    if let Ok(i) = token.parse::<i32>() {
        return Arg::Int(i);
    }
    let looks_float = token.contains(['.', 'e', 'E']);
    match token.parse::<f32>() {
        Ok(f) if looks_float && f.is_finite() => Arg::Float(f),
        _ => Arg::Str(token),
    }
}

/// Parse one inbound line; blank lines yield `None`
pub fn parse_line(line: &str) -> Option<Command> {
    let mut tokens = tokenize(line).into_iter();
    let (address, _) = tokens.next()?;
    let args = tokens
        .map(|(token, quoted)| classify(token, quoted).to_tagged())
        .collect();
    Some(Command::new(address, args))
}

/// Pull complete lines out of `buf`
fn split_lines(buf: &mut BytesMut, terminator: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buf
        .windows(terminator.len())
        .position(|w| w == terminator)
    {
        let raw = buf.split_to(pos + terminator.len());
        let text = String::from_utf8_lossy(&raw[..pos]);
        lines.push(text.trim_end_matches('\r').to_string());
    }
    lines
}

#[async_trait]
impl Transport for TextTransport {
    const KIND: TransportKind = TransportKind::TcpText;

    fn from_config(config: &DriverConfig) -> Result<Self, DriverError> {
        Ok(Self::new(config.terminator.clone()))
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
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = write_half.write_all(&frame).await {
                    writer_listener.on_lost(format!("write failed: {}", e));
                    return;
                }
            }
        });

        let terminator = self.terminator.clone().into_bytes();
        let reader = tokio::spawn(async move {
            let mut buf = BytesMut::new();
            let mut chunk = vec![0u8; 4096];
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
                buf.extend_from_slice(&chunk[..n]);

                for line in split_lines(&mut buf, &terminator) {
                    trace!("TEXT RX {}: {}", peer, line);
                    if let Some(command) = parse_line(&line) {
                        listener.on_inbound(command);
                    }
                }
                if buf.len() > MAX_LINE {
                    warn!("Discarding {} bytes of unterminated input from {}", buf.len(), peer);
                    buf.clear();
                }
            }
        });

        Ok(Link::new(tx, vec![writer, reader]))
    }

    fn encode(&self, address: &str, args: &[Arg]) -> Result<Bytes, DriverError> {
        self.format_line(address, args).map(Bytes::from)
    }
}
