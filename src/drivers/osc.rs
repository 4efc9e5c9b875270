//! OSC packet codec shared by the OSC transports and the hub ingress

use bytes::Bytes;
use rosc::{OscMessage, OscPacket};
use tracing::trace;

use super::args::Arg;
use super::error::DriverError;
use crate::command::Command;

/// Encode one OSC message
pub fn encode_message(address: &str, args: &[Arg]) -> Result<Bytes, DriverError> {
    let packet = OscPacket::Message(OscMessage {
        addr: address.to_string(),
        args: args.iter().cloned().map(Into::into).collect(),
    });
    rosc::encoder::encode(&packet)
        .map(Bytes::from)
        .map_err(|e| DriverError::Encode(format!("{} ({})", address, e)))
}

/// Decode one OSC packet into commands, flattening bundles in order.
/// Arguments become tagged values; kinds we don't relay are skipped.
pub fn decode_packet(data: &[u8]) -> Result<Vec<Command>, rosc::OscError> {
    let (_, packet) = rosc::decoder::decode_udp(data)?;
    let mut out = Vec::new();
    flatten(packet, &mut out);
    Ok(out)
}

fn flatten(packet: OscPacket, out: &mut Vec<Command>) {
    match packet {
        OscPacket::Message(msg) => {
            let args = msg
                .args
                .iter()
                .filter_map(|a| match Arg::from_osc(a) {
                    Some(arg) => Some(arg.to_tagged()),
                    None => {
                        trace!("Skipping unsupported OSC argument {:?} on {}", a, msg.addr);
                        None
                    },
                })
                .collect();
            out.push(Command::new(msg.addr, args));
        },
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        },
    }
}
