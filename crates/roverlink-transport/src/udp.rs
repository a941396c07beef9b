use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A UDP socket paired with a fixed destination.
///
/// A transport is either *listening* (bound to a well-known local port so the
/// remote end can reach it) or *ephemeral* (bound to an OS-assigned port,
/// send-mostly).
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    listening: bool,
}

impl UdpTransport {
    /// Bind to `local` and send to `peer`.
    pub async fn bind(local: SocketAddr, peer: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Bind {
                addr: local,
                source,
            })?;
        info!(local = %local, peer = %peer, "listening on udp socket");
        Ok(Self {
            socket,
            peer,
            listening: true,
        })
    }

    /// Bind an OS-assigned port on the wildcard address matching `peer`'s family.
    pub async fn ephemeral(peer: SocketAddr) -> Result<Self> {
        let local = match peer {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Bind {
                addr: local,
                source,
            })?;
        debug!(peer = %peer, "bound ephemeral udp socket");
        Ok(Self {
            socket,
            peer,
            listening: false,
        })
    }

    /// Send one datagram to the configured destination.
    pub async fn send(&self, datagram: &[u8]) -> Result<usize> {
        self.send_to(datagram, self.peer).await
    }

    /// Send one datagram to an explicit address.
    pub async fn send_to(&self, datagram: &[u8], addr: SocketAddr) -> Result<usize> {
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::DatagramTooLarge {
                len: datagram.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        self.socket
            .send_to(datagram, addr)
            .await
            .map_err(|source| TransportError::Send { addr, source })
    }

    /// Wait for the next datagram.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Ok(self.socket.recv_from(buf).await?)
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Destination address for [`send`](Self::send).
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether this socket was bound to a well-known port.
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "udp"
    }
}

/// Resolve `host:port` to the first socket address returned by the resolver.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            source,
        })?;
    addrs.next().ok_or_else(|| TransportError::NoAddress {
        host: host.to_string(),
    })
}
