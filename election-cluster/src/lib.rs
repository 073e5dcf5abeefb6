//! Runs a leader-election cluster: per-node runtimes over a transport and the
//! supervisor that starts and stops them together.

pub mod cluster;
pub mod config;
pub mod node;
pub mod shutdown;

pub use cluster::{Cluster, RunReport};
pub use config::{ClusterConfig, TransportKind};
pub use node::{Node, NodeHandle};
