/// Art-Net packet identifier, always the first 8 bytes of a packet.
pub const HEADER: &[u8; 8] = b"Art-Net\0";

/// UDP port used by every Art-Net node for both polls and replies.
pub const ARTNET_PORT: u16 = 6454;

/// Protocol revision we advertise in outgoing packets.
pub const PROTOCOL_VERSION: u16 = 14;

/// Number of channels in one universe.
pub const UNIVERSE_SIZE: u16 = 512;

/// OpCodes are transmitted low byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OpCode {
    Poll = 0x2000,
    PollReply = 0x2100,
}

impl OpCode {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x2000 => Some(Self::Poll),
            0x2100 => Some(Self::PollReply),
            _ => None,
        }
    }
}

/// ArtPoll TalkToMe flag: ask nodes to reply whenever their conditions change.
pub const TALK_TO_ME_REPLY_ON_CHANGE: u8 = 0b0000_0010;

/// Diagnostics priority sent in the poll. 0 = DpAll.
pub const DIAGNOSTICS_PRIORITY: u8 = 0x00;

// ArtPollReply field offsets.
pub const REPLY_IP_OFFSET: usize = 10;
pub const REPLY_PORT_OFFSET: usize = 14;
pub const REPLY_SHORT_NAME_OFFSET: usize = 26;
pub const REPLY_SHORT_NAME_LEN: usize = 18;
pub const REPLY_LONG_NAME_OFFSET: usize = 44;
pub const REPLY_LONG_NAME_LEN: usize = 64;
/// Low byte of NumPorts. The high byte at 172 is reserved.
pub const REPLY_NUM_PORTS_OFFSET: usize = 173;
/// SwOut: one universe descriptor byte per port.
pub const REPLY_SW_OUT_OFFSET: usize = 190;

/// Receive buffer size for one discovery datagram.
pub const RECV_BUFFER_SIZE: usize = 1024;

/// Pause after a failed receive so a socket stuck in an error state does
/// not spin until the deadline.
pub const RECV_ERROR_BACKOFF_MS: u64 = 10;

pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 2000;
