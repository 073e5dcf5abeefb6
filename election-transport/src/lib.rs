//! Datagram transports for the election protocol: a localhost UDP transport
//! and an in-memory transport with simulated network faults for testing.

pub mod error;
pub mod mock;
pub mod network;
pub mod udp;

pub use error::TransportError;
pub use mock::MockTransport;
pub use mock::TransportRegistry;
pub use network::NetworkOptions;
pub use udp::{UdpTransport, node_addr};

use election_core::{Message, NodeId};
pub use election_core::Transport; // Re-export core trait

use async_trait::async_trait;

#[async_trait]
impl Transport for MockTransport {
    fn local_id(&self) -> NodeId {
        self.node_id()
    }

    async fn send(&self, target: NodeId, message: Message) -> anyhow::Result<()> {
        Ok(self.send_impl(target, message)?)
    }

    async fn receive(&self) -> anyhow::Result<Option<Message>> {
        Ok(self.receive_impl().await)
    }

    fn close(&self) {
        self.close_impl()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_id(&self) -> NodeId {
        self.node_id()
    }

    async fn send(&self, target: NodeId, message: Message) -> anyhow::Result<()> {
        Ok(self.send_impl(target, message).await?)
    }

    async fn receive(&self) -> anyhow::Result<Option<Message>> {
        Ok(self.receive_impl().await?)
    }

    fn close(&self) {
        self.close_impl()
    }
}
