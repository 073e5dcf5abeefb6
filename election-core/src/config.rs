use crate::error::ConfigError;
use crate::NodeId;
use std::collections::HashSet;
use std::time::Duration;

/// Represents the configuration of one election node: its identity, its peers,
/// and the protocol timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionConfig {
    /// The ID of the node
    pub id: NodeId,
    /// The other members of the cluster
    pub peers: Vec<NodeId>,
    /// How often a leader broadcasts heartbeats
    pub heartbeat_interval_ms: u64,
    /// Lower bound of the randomized election timeout
    pub election_timeout_min_ms: u64,
    /// Upper bound of the randomized election timeout
    pub election_timeout_max_ms: u64,
    /// How long a candidate waits for a majority before reverting to follower
    pub candidate_timeout_ms: u64,
}

impl ElectionConfig {
    /// Configuration with the default timings for node `id` and `peers`.
    pub fn new(id: NodeId, peers: Vec<NodeId>) -> Self {
        Self {
            id,
            peers,
            heartbeat_interval_ms: 2_000,
            election_timeout_min_ms: 5_000,
            election_timeout_max_ms: 10_000,
            candidate_timeout_ms: 2_000,
        }
    }

    /// Number of members including this node.
    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    /// Votes needed to win: strictly more than half of the cluster.
    pub fn quorum(&self) -> usize {
        self.cluster_size() / 2 + 1
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn election_timeout_min(&self) -> Duration {
        Duration::from_millis(self.election_timeout_min_ms)
    }

    pub fn election_timeout_max(&self) -> Duration {
        Duration::from_millis(self.election_timeout_max_ms)
    }

    pub fn candidate_timeout(&self) -> Duration {
        Duration::from_millis(self.candidate_timeout_ms)
    }

    /// Checks the peer list and the timing relationships the protocol
    /// relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::with_capacity(self.peers.len());
        for &peer in &self.peers {
            if peer == self.id {
                return Err(ConfigError::SelfInPeers(peer));
            }
            if !seen.insert(peer) {
                return Err(ConfigError::DuplicatePeer(peer));
            }
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("heartbeat interval"));
        }
        if self.election_timeout_min_ms == 0 {
            return Err(ConfigError::ZeroDuration("election timeout"));
        }
        if self.candidate_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("candidate timeout"));
        }
        if self.election_timeout_min_ms > self.election_timeout_max_ms {
            return Err(ConfigError::InvalidTimeoutRange {
                min_ms: self.election_timeout_min_ms,
                max_ms: self.election_timeout_max_ms,
            });
        }
        if self.heartbeat_interval_ms >= self.election_timeout_min_ms {
            return Err(ConfigError::HeartbeatTooSlow {
                heartbeat_ms: self.heartbeat_interval_ms,
                min_ms: self.election_timeout_min_ms,
            });
        }
        Ok(())
    }
}
