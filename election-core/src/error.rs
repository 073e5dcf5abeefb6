use thiserror::Error;

/// Errors produced while decoding a datagram into a [`crate::Message`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Datagram is not valid UTF-8")]
    InvalidUtf8,

    #[error("Empty message")]
    Empty,

    #[error("Unknown message kind: {0}")]
    UnknownKind(String),

    #[error("Message {kind} expects {expected} fields, got {actual}")]
    FieldCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {field} value: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Datagram of {0} bytes exceeds the maximum size")]
    TooLarge(usize),
}

/// Errors produced when validating an [`crate::ElectionConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Cluster must contain at least one node")]
    EmptyCluster,

    #[error("Node {0} lists itself as a peer")]
    SelfInPeers(u64),

    #[error("Peer {0} is listed more than once")]
    DuplicatePeer(u64),

    #[error("Election timeout range is empty: min {min_ms}ms > max {max_ms}ms")]
    InvalidTimeoutRange { min_ms: u64, max_ms: u64 },

    #[error("Heartbeat interval {heartbeat_ms}ms must be shorter than the minimum election timeout {min_ms}ms")]
    HeartbeatTooSlow { heartbeat_ms: u64, min_ms: u64 },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Base port {base_port} cannot address {cluster_size} nodes")]
    PortOverflow { base_port: u16, cluster_size: usize },

    #[error("Loss probability {0} is outside [0, 1]")]
    InvalidLoss(String),
}
