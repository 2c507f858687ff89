use std::net::SocketAddrV4;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Addressable channels in one universe, 1-indexed.
pub const UNIVERSE_CAPACITY: u16 = artnet::types::UNIVERSE_SIZE;

/// A controller reachable over the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub addr: SocketAddrV4,
    pub universe_count: usize,
}

/// A 512-channel address space hosted by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Universe {
    pub id: String,
    pub node_id: String,
    /// Ids of patched fixtures, in patch order.
    pub fixtures: Vec<String>,
}

/// A fixture instance occupying `channels` consecutive addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: String,
    pub name: String,
    pub channels: u16,
    pub universe_id: String,
    pub start_address: u16,
}

impl Fixture {
    pub fn end_address(&self) -> u16 {
        self.start_address + self.channels - 1
    }

    pub fn addresses(&self) -> RangeInclusive<u16> {
        self.start_address..=self.end_address()
    }
}
