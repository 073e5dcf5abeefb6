use election_core::NodeId;
use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Peer node {0} not found in the transport registry")]
    PeerNotFound(NodeId),

    #[error("Communication channel to peer {0} is closed")]
    ChannelClosed(NodeId),

    #[error("Inbox of peer {0} is full, message dropped")]
    InboxFull(NodeId),

    #[error("Network simulation error: Message dropped to peer {0}")]
    MessageDropped(NodeId),

    #[error("Network simulation error: Node {0} is partitioned from peer {1}")]
    Partitioned(NodeId, NodeId),

    #[error("Node {0} is already registered in the transport")]
    NodeAlreadyExists(NodeId),

    #[error("Transport of node {0} is closed")]
    Closed(NodeId),

    #[error("Node {0} has no valid port for the configured base port")]
    InvalidAddress(NodeId),

    #[error("Node {node_id} failed to bind {addr}: {reason}")]
    Bind {
        node_id: NodeId,
        addr: String,
        reason: String,
    },

    #[error("Socket error on node {0}: {1}")]
    Io(NodeId, String),
}
