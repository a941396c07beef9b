use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use roverlink_crypto::{random_iv, Iv, Key, ZERO_IV};
use roverlink_frame::{open, seal, WireMode};
use roverlink_transport::UdpTransport;
use tracing::{debug, trace};

use crate::error::Result;

/// Callback that receives each successfully decoded inbound payload.
pub type InboundListener = Box<dyn FnMut(Vec<u8>, SocketAddr) + Send + Sync>;

/// Where a channel sends, whether it listens, and how it decodes.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Destination for outbound datagrams.
    pub peer: SocketAddr,
    /// Local address to listen on. `None` binds an ephemeral port.
    pub bind: Option<SocketAddr>,
    /// Inbound decoding strategy, fixed for the channel's lifetime.
    pub mode: WireMode,
}

impl ChannelConfig {
    /// Send-only raw channel, as used for media.
    pub fn raw(peer: SocketAddr) -> Self {
        Self {
            peer,
            bind: None,
            mode: WireMode::Raw,
        }
    }

    /// Listening framed channel, as used for telemetry and commands.
    pub fn framed(peer: SocketAddr, bind: SocketAddr) -> Self {
        Self {
            peer,
            bind: Some(bind),
            mode: WireMode::Framed,
        }
    }
}

/// One encrypted UDP flow.
///
/// Owns its socket, a handle to the shared key, and the rotating IV used by
/// [`send_framed`](Self::send_framed). The IV is only touched inside that
/// method, which takes `&mut self`, so at most one framed send per channel is
/// ever in flight.
pub struct EncryptedChannel {
    transport: UdpTransport,
    key: Arc<Key>,
    iv: Iv,
    mode: WireMode,
    listener: Option<InboundListener>,
}

impl EncryptedChannel {
    /// Bind the socket described by `config`.
    pub async fn open(config: ChannelConfig, key: Arc<Key>) -> Result<Self> {
        let transport = match config.bind {
            Some(local) => UdpTransport::bind(local, config.peer).await?,
            None => UdpTransport::ephemeral(config.peer).await?,
        };
        Ok(Self::from_transport(transport, key, config.mode))
    }

    /// Wrap an already bound transport.
    pub fn from_transport(transport: UdpTransport, key: Arc<Key>, mode: WireMode) -> Self {
        Self {
            transport,
            key,
            iv: random_iv(),
            mode,
            listener: None,
        }
    }

    /// Register the inbound callback, replacing any previous one.
    pub fn set_listener(
        &mut self,
        listener: impl FnMut(Vec<u8>, SocketAddr) + Send + Sync + 'static,
    ) {
        self.listener = Some(Box::new(listener));
    }

    /// Builder form of [`set_listener`](Self::set_listener).
    pub fn with_listener(
        mut self,
        listener: impl FnMut(Vec<u8>, SocketAddr) + Send + Sync + 'static,
    ) -> Self {
        self.set_listener(listener);
        self
    }

    /// Encrypt under the zero IV and send the bare ciphertext.
    ///
    /// The IV never changes on this path: identical plaintext prefixes give
    /// identical ciphertext prefixes. Only use it for perishable media.
    pub async fn send_raw(&self, payload: &[u8]) -> Result<usize> {
        let datagram = seal(WireMode::Raw, &self.key, &ZERO_IV, payload)?;
        Ok(self.transport.send(&datagram).await?)
    }

    /// Encrypt under the current IV, send `base64(iv),base64(ct)`, then rotate.
    ///
    /// The IV rotates after the send attempt whether or not it succeeded, so
    /// an IV that may have reached the wire is never used again. If sealing
    /// fails nothing was sent and the IV is kept.
    pub async fn send_framed(&mut self, payload: &[u8]) -> Result<usize> {
        let datagram = seal(WireMode::Framed, &self.key, &self.iv, payload)?;
        let sent = self.transport.send(&datagram).await;
        self.iv = random_iv();
        Ok(sent?)
    }

    /// Decode one datagram with this channel's strategy.
    pub fn decode(&self, datagram: &[u8]) -> roverlink_frame::Result<Vec<u8>> {
        open(self.mode, &self.key, datagram)
    }

    /// Decode one datagram and hand the payload to the listener.
    ///
    /// Undecodable datagrams are logged and returned as errors; the listener
    /// only ever sees valid payloads.
    pub fn on_receive(&mut self, datagram: &[u8], from: SocketAddr) -> roverlink_frame::Result<()> {
        match self.decode(datagram) {
            Ok(payload) => {
                match self.listener.as_mut() {
                    Some(listener) => listener(payload, from),
                    None => trace!(%from, len = payload.len(), "no listener; dropping payload"),
                }
                Ok(())
            }
            Err(err) => {
                debug!(
                    %from,
                    mode = %self.mode,
                    len = datagram.len(),
                    error = %err,
                    "dropping undecodable datagram"
                );
                Err(err)
            }
        }
    }

    /// Wait for the next datagram on this channel's socket.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Ok(self.transport.recv_from(buf).await?)
    }

    /// Wait for one datagram and run it through [`on_receive`](Self::on_receive).
    ///
    /// Returns `Ok(false)` when the datagram was dropped as undecodable.
    pub async fn recv_and_dispatch(&mut self, buf: &mut [u8]) -> Result<bool> {
        let (len, from) = self.recv_from(buf).await?;
        Ok(self.on_receive(&buf[..len], from).is_ok())
    }

    /// Inbound decoding strategy.
    pub fn mode(&self) -> WireMode {
        self.mode
    }

    /// IV the next framed send will use.
    pub fn current_iv(&self) -> &Iv {
        &self.iv
    }

    /// Local socket address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// Destination address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.transport.peer_addr()
    }
}

impl fmt::Debug for EncryptedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedChannel")
            .field("transport", &self.transport)
            .field("key", &self.key)
            .field("mode", &self.mode)
            .field("has_listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}
