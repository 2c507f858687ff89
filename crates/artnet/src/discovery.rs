use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use serde::Serialize;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, timeout_at, Duration, Instant};

use crate::protocol::{build_poll_packet, parse_poll_reply, PollReply, ReplyError};
use crate::types::*;

/// Only one discovery round may own the Art-Net port at a time.
static DISCOVERY_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery socket on {addr}: {source}")]
    Bind {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },
    #[error("failed to enable broadcast: {0}")]
    Broadcast(#[source] io::Error),
    #[error("failed to send ArtPoll to {addr}: {source}")]
    Send {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },
}

/// Parameters for one discovery round.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Our own address. Used to derive the broadcast address and to drop
    /// replies we receive from ourselves.
    pub local_addr: Ipv4Addr,
    pub port: u16,
    pub timeout: Duration,
}

impl DiscoveryConfig {
    pub fn new(local_addr: Ipv4Addr) -> Self {
        Self {
            local_addr,
            port: ARTNET_PORT,
            timeout: Duration::from_millis(DEFAULT_DISCOVERY_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// A node that answered our poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDescriptor {
    pub name: String,
    /// Source address of the reply datagram.
    pub ip: Ipv4Addr,
    pub universe_count: usize,
}

impl NodeDescriptor {
    fn from_reply(ip: Ipv4Addr, reply: &PollReply) -> Self {
        Self {
            name: reply.short_name.clone(),
            ip,
            universe_count: reply.universe_count(),
        }
    }
}

/// Broadcast address for `local`, assuming a /24 network.
///
/// Nodes on a wider subnet will not hear the poll unless they share the
/// first three octets with us.
pub fn broadcast_address(local: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = local.octets();
    Ipv4Addr::new(a, b, c, 255)
}

/// First non-loopback IPv4 address of this host, if any.
pub fn default_local_addr() -> Option<Ipv4Addr> {
    let interfaces = if_addrs::get_if_addrs().ok()?;
    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .find_map(|iface| match iface.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
}

/// Run one discovery round: broadcast an ArtPoll and collect replies until
/// `config.timeout` has elapsed.
///
/// Rounds are serialized process-wide; a second caller waits for the first
/// round to finish. Dropping the returned future ends the round early and
/// releases the socket.
pub async fn discover(config: &DiscoveryConfig) -> Result<Vec<NodeDescriptor>, DiscoveryError> {
    let _round = DISCOVERY_LOCK.lock().await;

    let broadcast = SocketAddrV4::new(broadcast_address(config.local_addr), config.port);
    let socket = bind_socket(config.port)?;

    info!(
        "[artnet::discovery] sending ArtPoll to {} (timeout {:?})",
        broadcast, config.timeout
    );
    socket
        .send_to(&build_poll_packet(), broadcast)
        .await
        .map_err(|source| DiscoveryError::Send {
            addr: broadcast,
            source,
        })?;

    let deadline = Instant::now() + config.timeout;
    let nodes = collect_replies(&socket, config.local_addr, deadline).await;

    info!("[artnet::discovery] discovery complete, {} node(s) found", nodes.len());
    Ok(nodes)
}

/// Bind to the Art-Net port on all interfaces. Broadcast replies are sent
/// to the Art-Net port, not back to the poller's source port, so an
/// ephemeral port would never see them.
fn bind_socket(port: u16) -> Result<UdpSocket, DiscoveryError> {
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    let bind_err = |source: io::Error| DiscoveryError::Bind { addr, source };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    socket
        .set_broadcast(true)
        .map_err(DiscoveryError::Broadcast)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&SockAddr::from(addr)).map_err(bind_err)?;

    let socket = UdpSocket::from_std(socket.into()).map_err(bind_err)?;
    info!("[artnet::discovery] bound to {}", addr);
    Ok(socket)
}

/// Receive ArtPollReply datagrams until `deadline`.
///
/// Bad datagrams and receive errors are logged and skipped. Each kind of
/// receive error is warned about once per round, and every failure is
/// followed by a short pause. Replies from `local_addr` are our own. Only
/// the first reply per source IP is kept.
pub(crate) async fn collect_replies(
    socket: &UdpSocket,
    local_addr: Ipv4Addr,
    deadline: Instant,
) -> Vec<NodeDescriptor> {
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let mut seen: HashSet<Ipv4Addr> = HashSet::new();
    let mut nodes = Vec::new();
    let mut error_kinds: HashSet<io::ErrorKind> = HashSet::new();

    loop {
        let (len, src) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(Err(e)) => {
                if error_kinds.insert(e.kind()) {
                    warn!("[artnet::discovery] receive error: {}", e);
                } else {
                    debug!("[artnet::discovery] receive error: {}", e);
                }
                let resume = Instant::now() + Duration::from_millis(RECV_ERROR_BACKOFF_MS);
                sleep_until(resume.min(deadline)).await;
                continue;
            }
            Ok(Ok(received)) => received,
        };

        let ip = match src {
            SocketAddr::V4(v4) => *v4.ip(),
            SocketAddr::V6(_) => continue,
        };
        let data = &buf[..len];

        match parse_poll_reply(data) {
            Ok(reply) => {
                if ip == local_addr {
                    debug!("[artnet::discovery] ignoring loopback reply from self ({})", ip);
                    continue;
                }
                if !seen.insert(ip) {
                    debug!("[artnet::discovery] duplicate reply from {}", ip);
                    continue;
                }
                info!(
                    "[artnet::discovery] node found: {:?} at {} with {} universe(s)",
                    reply.short_name,
                    ip,
                    reply.universe_count()
                );
                nodes.push(NodeDescriptor::from_reply(ip, &reply));
            }
            Err(ReplyError::MalformedSignature) => {
                let header: String = data.iter().take(8).map(|b| format!("{b:02x}")).collect();
                warn!("[artnet::discovery] non-Art-Net packet from {}: header={}", ip, header);
            }
            // Our own ArtPoll echoes back to us on the shared port.
            Err(ReplyError::UnexpectedOpcode(op)) => {
                debug!("[artnet::discovery] ignoring opcode 0x{:04x} from {}", op, ip);
            }
            Err(e) => {
                warn!("[artnet::discovery] bad reply from {}: {}", ip, e);
            }
        }
    }

    nodes
}
