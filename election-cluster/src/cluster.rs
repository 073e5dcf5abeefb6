use crate::config::ClusterConfig;
use crate::node::{Node, NodeHandle};
use anyhow::Context;
use election_core::{NodeId, NodeStatus, Role, Transport};
use election_transport::{MockTransport, NetworkOptions, TransportRegistry, UdpTransport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How often cluster-wide waits re-check node state.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Supervises a fixed set of nodes with symmetric full-mesh peer lists.
pub struct Cluster<T: Transport> {
    nodes: Vec<Arc<Node<T>>>,
    handles: Vec<Option<NodeHandle>>,
    shutdown: CancellationToken,
    started: bool,
}

impl Cluster<UdpTransport> {
    /// Binds one UDP socket per node. Nothing is started unless every bind
    /// succeeds.
    pub async fn bind(config: &ClusterConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let mut transports = Vec::with_capacity(config.nodes);
        for id in 0..config.nodes as NodeId {
            let transport = UdpTransport::bind(id, config.base_port)
                .await
                .with_context(|| format!("node {id} failed to start"))?;
            transports.push(transport);
        }
        Ok(Self::with_transports(config, transports))
    }
}

impl Cluster<MockTransport> {
    /// Builds the cluster over in-memory transports sharing one registry.
    pub fn in_memory(config: &ClusterConfig, options: NetworkOptions) -> anyhow::Result<Self> {
        config.validate()?;
        let registry = Arc::new(TransportRegistry::new());
        let transports = (0..config.nodes as NodeId)
            .map(|id| MockTransport::create_with_options(id, options.clone(), registry.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::with_transports(config, transports))
    }

    /// Cuts every link to and from `id`.
    pub fn isolate(&self, id: NodeId) {
        for node in &self.nodes {
            if node.id() == id {
                for peer in &self.nodes {
                    if peer.id() != id {
                        node.transport().partition_from(peer.id());
                    }
                }
            } else {
                node.transport().partition_from(id);
            }
        }
    }

    /// Removes every partition.
    pub fn heal(&self) {
        for node in &self.nodes {
            node.transport().heal_all();
        }
    }
}

impl<T: Transport> Cluster<T> {
    /// Builds nodes over `transports`, where `transports[i]` belongs to node `i`.
    pub fn with_transports(config: &ClusterConfig, transports: Vec<T>) -> Self {
        let shutdown = CancellationToken::new();
        let nodes: Vec<_> = transports
            .into_iter()
            .enumerate()
            .map(|(i, transport)| {
                debug_assert_eq!(transport.local_id(), i as NodeId);
                Node::new(
                    config.node_config(i as NodeId),
                    transport,
                    shutdown.child_token(),
                )
            })
            .collect();
        let handles = nodes.iter().map(|_| None).collect();
        Self {
            nodes,
            handles,
            shutdown,
            started: false,
        }
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<Node<T>>> {
        self.nodes.get(id as usize)
    }

    /// Starts the loops of every node. Calling it again has no effect.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        for (node, handle) in self.nodes.iter().zip(self.handles.iter_mut()) {
            *handle = Some(node.spawn());
        }
        tracing::info!(nodes = self.nodes.len(), "Cluster started");
    }

    /// Snapshots every node, one lock at a time.
    pub async fn statuses(&self) -> Vec<NodeStatus> {
        let mut statuses = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            statuses.push(node.status().await);
        }
        statuses
    }

    /// Running nodes that currently believe they are leader.
    pub async fn leaders(&self) -> Vec<NodeStatus> {
        let mut leaders = Vec::new();
        for node in self.nodes.iter().filter(|node| node.is_running()) {
            let status = node.status().await;
            if status.role == Role::Leader {
                leaders.push(status);
            }
        }
        leaders
    }

    /// Waits until exactly one running node is leader.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Option<NodeStatus> {
        let wait = async {
            loop {
                let mut leaders = self.leaders().await;
                if leaders.len() == 1 {
                    return leaders.pop();
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }

    /// Waits until every running node follows the same leader in the same term.
    pub async fn wait_for_agreement(&self, timeout: Duration) -> Option<NodeStatus> {
        let wait = async {
            loop {
                if let Some(leader) = self.agreed_leader().await {
                    return leader;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.ok()
    }

    async fn agreed_leader(&self) -> Option<NodeStatus> {
        let mut running = Vec::new();
        for node in self.nodes.iter().filter(|node| node.is_running()) {
            running.push(node.status().await);
        }
        let leader = running.iter().find(|s| s.role == Role::Leader)?.clone();
        running
            .iter()
            .all(|s| s.term == leader.term && s.leader_id == Some(leader.id))
            .then_some(leader)
    }

    /// Crashes one node: its loops exit and its transport closes while the
    /// rest of the cluster keeps running.
    pub async fn stop_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id as usize) else {
            return false;
        };
        node.stop().await;
        if let Some(handle) = self.handles[id as usize].take() {
            handle.join().await;
        }
        tracing::info!(node_id = id, "Node stopped");
        true
    }

    /// Stops every node and waits for all of their loops to exit.
    /// Returns the final status of each node.
    pub async fn stop(&mut self) -> Vec<NodeStatus> {
        for node in &self.nodes {
            node.stop().await;
        }
        self.shutdown.cancel();

        let handles: Vec<_> = self.handles.iter_mut().filter_map(Option::take).collect();
        futures::future::join_all(handles.into_iter().map(NodeHandle::join)).await;

        tracing::info!(nodes = self.nodes.len(), "Cluster stopped");
        self.statuses().await
    }

    /// Runs the cluster until `duration` elapses or `interrupt` fires, then
    /// stops it.
    pub async fn run(
        mut self,
        duration: Duration,
        interrupt: CancellationToken,
    ) -> Vec<NodeStatus> {
        self.start();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                tracing::info!(?duration, "Run duration elapsed");
            }
            _ = interrupt.cancelled() => {
                tracing::info!("Interrupted");
            }
        }
        self.stop().await
    }
}

impl<T: Transport> Drop for Cluster<T> {
    fn drop(&mut self) {
        // Loops exit on their own once the token is cancelled.
        self.shutdown.cancel();
    }
}

/// Summary printed at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The leader of the highest term, if any node still held leadership.
    pub leader: Option<NodeId>,
    /// The highest term reached by any node.
    pub term: u64,
    pub nodes: Vec<NodeStatus>,
}

impl RunReport {
    pub fn from_statuses(nodes: Vec<NodeStatus>) -> Self {
        let term = nodes.iter().map(|s| s.term).max().unwrap_or(0);
        let leader = nodes
            .iter()
            .find(|s| s.role == Role::Leader && s.term == term)
            .map(|s| s.id);
        Self {
            leader,
            term,
            nodes,
        }
    }
}
