use clap::{Parser, ValueEnum};
use election_core::{mesh_peers, ConfigError, ElectionConfig, NodeId};
use std::time::Duration;

/// Which transport the cluster runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Localhost UDP sockets on `base_port + id`
    Udp,
    /// In-process channels with optional simulated loss
    Memory,
}

/// Process-level configuration of a simulated cluster.
///
/// Every option can also be supplied through the environment.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "election-cluster")]
#[command(version)]
#[command(about = "Run a leader-election cluster on this machine")]
pub struct ClusterConfig {
    /// Number of nodes in the cluster
    #[arg(long, env = "ELECTION_NODES", default_value_t = 5)]
    pub nodes: usize,

    /// Node `i` listens on `127.0.0.1:<base_port + i>`
    #[arg(long, env = "ELECTION_BASE_PORT", default_value_t = 5000)]
    pub base_port: u16,

    /// Leader heartbeat interval
    #[arg(long, env = "ELECTION_HEARTBEAT_MS", default_value_t = 2_000)]
    pub heartbeat_interval_ms: u64,

    /// Lower bound of the randomized election timeout
    #[arg(long, env = "ELECTION_TIMEOUT_MIN_MS", default_value_t = 5_000)]
    pub election_timeout_min_ms: u64,

    /// Upper bound of the randomized election timeout
    #[arg(long, env = "ELECTION_TIMEOUT_MAX_MS", default_value_t = 10_000)]
    pub election_timeout_max_ms: u64,

    /// How long a candidate waits for a majority
    #[arg(long, env = "ELECTION_CANDIDATE_TIMEOUT_MS", default_value_t = 2_000)]
    pub candidate_timeout_ms: u64,

    /// Total run time before the cluster is stopped
    #[arg(long, env = "ELECTION_DURATION_SECS", default_value_t = 30)]
    pub duration_secs: u64,

    /// Transport to run the nodes over
    #[arg(long, env = "ELECTION_TRANSPORT", value_enum, default_value_t = TransportKind::Udp)]
    pub transport: TransportKind,

    /// Simulated message loss probability (memory transport only)
    #[arg(long, env = "ELECTION_LOSS", default_value_t = 0.0)]
    pub loss: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: 5,
            base_port: 5000,
            heartbeat_interval_ms: 2_000,
            election_timeout_min_ms: 5_000,
            election_timeout_max_ms: 10_000,
            candidate_timeout_ms: 2_000,
            duration_secs: 30,
            transport: TransportKind::Udp,
            loss: 0.0,
        }
    }
}

impl ClusterConfig {
    /// Election configuration of node `id` with a full-mesh peer list.
    pub fn node_config(&self, id: NodeId) -> ElectionConfig {
        ElectionConfig {
            id,
            peers: mesh_peers(id, self.nodes),
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            election_timeout_min_ms: self.election_timeout_min_ms,
            election_timeout_max_ms: self.election_timeout_max_ms,
            candidate_timeout_ms: self.candidate_timeout_ms,
        }
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::EmptyCluster);
        }
        if u64::from(self.base_port) + (self.nodes as u64 - 1) > u64::from(u16::MAX) {
            return Err(ConfigError::PortOverflow {
                base_port: self.base_port,
                cluster_size: self.nodes,
            });
        }
        if !(0.0..=1.0).contains(&self.loss) {
            return Err(ConfigError::InvalidLoss(self.loss.to_string()));
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::ZeroDuration("run duration"));
        }
        self.node_config(0).validate()
    }
}
