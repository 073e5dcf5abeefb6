//! Leader election for a fixed cluster of peers.
//!
//! The crate holds everything that does not touch a socket: node ids and
//! roles, the wire messages, the timers, and the per-node election state
//! machine. Transports plug in through the [`Transport`] trait.

pub mod config;
pub mod error;
pub mod message;
pub mod state;
pub mod timer;

pub use config::ElectionConfig;
pub use error::{CodecError, ConfigError};
pub use message::{Message, Outbound, MAX_DATAGRAM_LEN};
pub use state::{ElectionState, NodeStatus};
pub use timer::{random_election_timeout, ElectionTimer, HeartbeatTicker};

use async_trait::async_trait;
use serde::Serialize;

/// Represents a unique identifier for a node in the cluster.
pub type NodeId = u64;

/// Represents the possible roles a node can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    /// The node is a follower, waiting for heartbeats from the leader
    Follower,
    /// The node is a candidate, trying to become the leader
    Candidate,
    /// The node is the leader, sending heartbeats to followers
    Leader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Follower => write!(f, "follower"),
            Role::Candidate => write!(f, "candidate"),
            Role::Leader => write!(f, "leader"),
        }
    }
}

/// Unreliable point-to-point delivery of election messages between nodes.
///
/// Implementations give no delivery or ordering guarantee. `send` may drop
/// silently; the protocol recovers through periodic heartbeats and
/// re-elections rather than retries.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The id of the node this transport belongs to.
    fn local_id(&self) -> NodeId;

    /// Fire-and-forget delivery of `message` to `target`.
    async fn send(&self, target: NodeId, message: Message) -> anyhow::Result<()>;

    /// Waits for the next inbound message.
    ///
    /// Returns `Ok(None)` once the transport has been closed.
    async fn receive(&self) -> anyhow::Result<Option<Message>>;

    /// Closes the transport. Idempotent; a pending `receive` returns `Ok(None)`.
    fn close(&self);
}

/// Full-mesh peer list for node `id` in a cluster of `cluster_size` nodes.
pub fn mesh_peers(id: NodeId, cluster_size: usize) -> Vec<NodeId> {
    (0..cluster_size as NodeId).filter(|peer| *peer != id).collect()
}
