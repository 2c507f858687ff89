//! Art-Net node discovery.
//!
//! `protocol` encodes ArtPoll and decodes ArtPollReply packets without doing
//! any I/O. `discovery` owns the UDP socket for one poll round.

pub mod discovery;
pub mod protocol;
pub mod types;

pub use discovery::{
    broadcast_address, default_local_addr, discover, DiscoveryConfig, DiscoveryError,
    NodeDescriptor,
};
pub use protocol::{build_poll_packet, parse_poll_reply, PollReply, ReplyError};
