use election_core::{ElectionConfig, ElectionState, NodeId, NodeStatus, Outbound, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Pause before receiving again after a transport error.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// A running cluster member: the election state plus the transport it talks
/// through.
///
/// Two tasks drive a node. The receive loop feeds inbound messages to the
/// state machine; the tick loop sleeps until the next election or heartbeat
/// deadline. Both go through the same state lock and never hold it while
/// sending.
pub struct Node<T: Transport> {
    id: NodeId,
    state: Mutex<ElectionState>,
    transport: T,
    // Wakes the tick loop when a message may have moved a deadline.
    reschedule: Notify,
    shutdown: CancellationToken,
}

/// Join handles of a node's two loops.
pub struct NodeHandle {
    id: NodeId,
    receiver: JoinHandle<()>,
    ticker: JoinHandle<()>,
}

impl NodeHandle {
    /// Waits until both loops have exited.
    pub async fn join(self) {
        for (task, handle) in [("receive", self.receiver), ("tick", self.ticker)] {
            if let Err(e) = handle.await {
                tracing::error!(node_id = self.id, task, error = %e, "Node task failed");
            }
        }
    }
}

impl<T: Transport> Node<T> {
    pub fn new(config: ElectionConfig, transport: T, shutdown: CancellationToken) -> Arc<Self> {
        let id = config.id;
        Arc::new(Self {
            id,
            state: Mutex::new(ElectionState::new(config, Instant::now())),
            transport,
            reschedule: Notify::new(),
            shutdown,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether the node's loops are still meant to run.
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    pub async fn status(&self) -> NodeStatus {
        self.state.lock().await.status()
    }

    /// Spawns the receive and tick loops.
    pub fn spawn(self: &Arc<Self>) -> NodeHandle {
        tracing::debug!(node_id = self.id, "Starting node");
        NodeHandle {
            id: self.id,
            receiver: tokio::spawn(self.clone().receive_loop()),
            ticker: tokio::spawn(self.clone().tick_loop()),
        }
    }

    /// Halts the state machine, cancels both loops and closes the transport.
    /// Safe to call more than once.
    pub async fn stop(&self) {
        self.state.lock().await.halt();
        self.shutdown.cancel();
        self.transport.close();
    }

    async fn receive_loop(self: Arc<Self>) {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                received = self.transport.receive() => received,
            };

            match received {
                Ok(Some(message)) => {
                    let outbound = {
                        let mut state = self.state.lock().await;
                        state.handle(message, Instant::now())
                    };
                    self.reschedule.notify_one();
                    self.dispatch(outbound).await;
                }
                Ok(None) => {
                    tracing::debug!(node_id = self.id, "Transport closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(node_id = self.id, error = %e, "Receive failed");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                    }
                }
            }
        }
        tracing::debug!(node_id = self.id, "Receive loop exited");
    }

    async fn tick_loop(self: Arc<Self>) {
        self.state.lock().await.arm(Instant::now());
        loop {
            let wake_at = self.state.lock().await.next_wakeup();

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = self.reschedule.notified() => continue,
                _ = sleep_until(wake_at) => {
                    let outbound = {
                        let mut state = self.state.lock().await;
                        state.tick(Instant::now())
                    };
                    self.dispatch(outbound).await;
                }
            }
        }
        tracing::debug!(node_id = self.id, "Tick loop exited");
    }

    async fn dispatch(&self, outbound: Vec<Outbound>) {
        for Outbound { to, message } in outbound {
            if let Err(e) = self.transport.send(to, message).await {
                tracing::warn!(
                    node_id = self.id,
                    to,
                    datagram = %message,
                    error = %e,
                    "Send failed"
                );
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
