use crate::error::TransportError;
use election_core::{MAX_DATAGRAM_LEN, Message, NodeId};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// Address of node `id`: `127.0.0.1:<base_port + id>`.
pub fn node_addr(base_port: u16, id: NodeId) -> Result<SocketAddr, TransportError> {
    let port = u64::from(base_port)
        .checked_add(id)
        .and_then(|port| u16::try_from(port).ok())
        .ok_or(TransportError::InvalidAddress(id))?;
    Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
}

/// Datagram transport over a localhost UDP socket.
///
/// Peers are addressed purely by id. Closing only flips a cancellation token,
/// so it is idempotent and wakes a pending `receive` immediately; the socket
/// itself is released when the transport is dropped.
#[derive(Debug)]
pub struct UdpTransport {
    node_id: NodeId,
    base_port: u16,
    socket: UdpSocket,
    closed: CancellationToken,
}

impl UdpTransport {
    /// Binds the socket of `node_id`. Fails if the address is in use.
    pub async fn bind(node_id: NodeId, base_port: u16) -> Result<Self, TransportError> {
        let addr = node_addr(base_port, node_id)?;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::Bind {
                node_id,
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(node_id, %addr, "UdpTransport bound");
        Ok(Self {
            node_id,
            base_port,
            socket,
            closed: CancellationToken::new(),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::Io(self.node_id, e.to_string()))
    }

    pub(crate) async fn send_impl(
        &self,
        peer_id: NodeId,
        message: Message,
    ) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed(self.node_id));
        }
        let addr = node_addr(self.base_port, peer_id)?;
        tracing::trace!(from = self.node_id, to = peer_id, datagram = %message, "Sending datagram");
        self.socket
            .send_to(&message.to_datagram(), addr)
            .await
            .map_err(|e| TransportError::Io(self.node_id, e.to_string()))?;
        Ok(())
    }

    pub(crate) async fn receive_impl(&self) -> Result<Option<Message>, TransportError> {
        // One spare byte so oversized datagrams are detected instead of truncated silently.
        let mut buf = [0u8; MAX_DATAGRAM_LEN + 1];
        loop {
            let (len, from) = tokio::select! {
                biased;
                _ = self.closed.cancelled() => return Ok(None),
                received = self.socket.recv_from(&mut buf) => {
                    received.map_err(|e| TransportError::Io(self.node_id, e.to_string()))?
                }
            };

            match Message::from_datagram(&buf[..len]) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => {
                    tracing::warn!(
                        node_id = self.node_id,
                        %from,
                        error = %e,
                        "Dropping malformed datagram"
                    );
                }
            }
        }
    }

    pub(crate) fn close_impl(&self) {
        if !self.closed.is_cancelled() {
            self.closed.cancel();
            tracing::debug!(node_id = self.node_id, "UdpTransport closed");
        }
    }
}
