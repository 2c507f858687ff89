use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::net::Ipv4Addr;

use crate::types::*;

/// Why a datagram could not be read as an ArtPollReply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyError {
    #[error("missing Art-Net signature")]
    MalformedSignature,
    #[error("unexpected opcode 0x{0:04x}")]
    UnexpectedOpcode(u16),
    #[error("truncated packet: {len} bytes, need {needed}")]
    TruncatedPacket { len: usize, needed: usize },
}

/// Build an ArtPoll packet.
///
/// Format: "Art-Net\0" + u16 LE(OpPoll) + u16 BE(ProtVer) + TalkToMe + Priority
pub fn build_poll_packet() -> Vec<u8> {
    let mut packet = [0u8; 14];
    packet[..8].copy_from_slice(HEADER);
    LittleEndian::write_u16(&mut packet[8..10], OpCode::Poll as u16);
    BigEndian::write_u16(&mut packet[10..12], PROTOCOL_VERSION);
    packet[12] = TALK_TO_ME_REPLY_ON_CHANGE;
    packet[13] = DIAGNOSTICS_PRIORITY;
    packet.to_vec()
}

/// Fields we care about from an ArtPollReply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReply {
    /// IP the node reports for itself. May differ from the datagram source.
    pub ip: Ipv4Addr,
    pub port: u16,
    pub short_name: String,
    pub long_name: String,
    /// SwOut byte for each reported port.
    pub universes: Vec<u8>,
}

impl PollReply {
    pub fn universe_count(&self) -> usize {
        self.universes.len()
    }
}

/// Read the opcode of any Art-Net packet after checking its signature.
pub fn parse_opcode(data: &[u8]) -> Result<u16, ReplyError> {
    if data.get(..HEADER.len()) != Some(&HEADER[..]) {
        return Err(ReplyError::MalformedSignature);
    }
    let needed = HEADER.len() + 2;
    if data.len() < needed {
        return Err(ReplyError::TruncatedPacket {
            len: data.len(),
            needed,
        });
    }
    Ok(LittleEndian::read_u16(&data[8..10]))
}

/// Parse an ArtPollReply packet.
pub fn parse_poll_reply(data: &[u8]) -> Result<PollReply, ReplyError> {
    let opcode = parse_opcode(data)?;
    if OpCode::from_u16(opcode) != Some(OpCode::PollReply) {
        return Err(ReplyError::UnexpectedOpcode(opcode));
    }

    // Everything up to and including NumPorts must be present before the
    // variable part can be located.
    let fixed_len = REPLY_NUM_PORTS_OFFSET + 1;
    if data.len() < fixed_len {
        return Err(ReplyError::TruncatedPacket {
            len: data.len(),
            needed: fixed_len,
        });
    }

    let port_count = data[REPLY_NUM_PORTS_OFFSET] as usize;
    let needed = REPLY_SW_OUT_OFFSET + port_count;
    if data.len() < needed {
        return Err(ReplyError::TruncatedPacket {
            len: data.len(),
            needed,
        });
    }

    let ip_bytes = &data[REPLY_IP_OFFSET..REPLY_IP_OFFSET + 4];
    Ok(PollReply {
        ip: Ipv4Addr::new(ip_bytes[0], ip_bytes[1], ip_bytes[2], ip_bytes[3]),
        port: LittleEndian::read_u16(&data[REPLY_PORT_OFFSET..REPLY_PORT_OFFSET + 2]),
        short_name: read_name(data, REPLY_SHORT_NAME_OFFSET, REPLY_SHORT_NAME_LEN),
        long_name: read_name(data, REPLY_LONG_NAME_OFFSET, REPLY_LONG_NAME_LEN),
        universes: data[REPLY_SW_OUT_OFFSET..needed].to_vec(),
    })
}

/// Read a fixed-width, null padded ASCII field. Invalid bytes are replaced.
fn read_name(data: &[u8], offset: usize, len: usize) -> String {
    String::from_utf8_lossy(&data[offset..offset + len])
        .trim_end_matches('\0')
        .to_string()
}

/// Build an ArtPollReply, as a node would send it.
pub fn build_poll_reply(ip: Ipv4Addr, short_name: &str, long_name: &str, universes: &[u8]) -> Vec<u8> {
    // 239 bytes is the Art-Net 4 reply size; grow if more ports are reported.
    let len = (REPLY_SW_OUT_OFFSET + universes.len()).max(239);
    let mut packet = vec![0u8; len];
    packet[..8].copy_from_slice(HEADER);
    LittleEndian::write_u16(&mut packet[8..10], OpCode::PollReply as u16);
    packet[REPLY_IP_OFFSET..REPLY_IP_OFFSET + 4].copy_from_slice(&ip.octets());
    LittleEndian::write_u16(
        &mut packet[REPLY_PORT_OFFSET..REPLY_PORT_OFFSET + 2],
        ARTNET_PORT,
    );
    write_name(&mut packet, REPLY_SHORT_NAME_OFFSET, REPLY_SHORT_NAME_LEN, short_name);
    write_name(&mut packet, REPLY_LONG_NAME_OFFSET, REPLY_LONG_NAME_LEN, long_name);
    packet[REPLY_NUM_PORTS_OFFSET] = universes.len().min(u8::MAX as usize) as u8;
    packet[REPLY_SW_OUT_OFFSET..REPLY_SW_OUT_OFFSET + universes.len()].copy_from_slice(universes);
    packet
}

// Keeps at least one trailing NUL, as nodes do.
fn write_name(packet: &mut [u8], offset: usize, len: usize, name: &str) {
    let bytes = name.as_bytes();
    let n = bytes.len().min(len - 1);
    packet[offset..offset + n].copy_from_slice(&bytes[..n]);
}
