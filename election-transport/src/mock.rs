use crate::error::TransportError;
use crate::network::NetworkOptions;
use election_core::{Message, NodeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Messages buffered per node before further deliveries are dropped.
const INBOX_CAPACITY: usize = 100;

type Inbox = mpsc::Sender<Message>;

/// A shared registry for MockTransport instances within one simulated network.
#[derive(Debug, Clone, Default)]
pub struct TransportRegistry {
    // Use std::sync::RwLock for synchronous access in Drop
    endpoints: Arc<RwLock<HashMap<NodeId, Inbox>>>,
}

impl TransportRegistry {
    /// Creates a new, empty transport registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, id: NodeId, inbox: Inbox) -> Result<(), TransportError> {
        let mut guard = self.endpoints.write().expect("Registry lock poisoned");
        if guard.contains_key(&id) {
            return Err(TransportError::NodeAlreadyExists(id));
        }
        guard.insert(id, inbox);
        tracing::trace!(node_id = id, "Registered transport endpoint");
        Ok(())
    }

    fn unregister(&self, id: NodeId) {
        let mut guard = self.endpoints.write().expect("Registry lock poisoned");
        if guard.remove(&id).is_some() {
            tracing::trace!(node_id = id, "Unregistered transport endpoint");
        }
    }

    fn lookup(&self, id: NodeId) -> Option<Inbox> {
        self.endpoints
            .read()
            .expect("Registry lock poisoned")
            .get(&id)
            .cloned() // Clone the Sender (cheap Arc clone)
    }

    /// Whether a live endpoint is registered for `id`.
    pub fn contains(&self, id: NodeId) -> bool {
        self.endpoints
            .read()
            .expect("Registry lock poisoned")
            .contains_key(&id)
    }
}

/// An in-memory datagram transport built on Tokio MPSC channels.
///
/// This transport simulates network conditions like delay, loss, and partitions.
/// It requires a shared `TransportRegistry` to discover peers. Like a UDP
/// socket, a full inbox drops the message instead of blocking the sender.
#[derive(Debug)]
pub struct MockTransport {
    node_id: NodeId,
    network_options: Arc<RwLock<NetworkOptions>>,
    registry: Arc<TransportRegistry>,
    inbox: Mutex<mpsc::Receiver<Message>>,
    closed: CancellationToken,
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.registry.unregister(self.node_id);
    }
}

impl MockTransport {
    /// Creates a new MockTransport with a perfect network.
    pub fn create(
        node_id: NodeId,
        registry: Arc<TransportRegistry>,
    ) -> Result<Self, TransportError> {
        Self::create_with_options(node_id, NetworkOptions::default(), registry)
    }

    /// Creates a new MockTransport with specific network simulation options
    /// and registers it with the provided registry.
    pub fn create_with_options(
        node_id: NodeId,
        options: NetworkOptions,
        registry: Arc<TransportRegistry>,
    ) -> Result<Self, TransportError> {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        registry.register(node_id, tx)?;

        let transport = MockTransport {
            node_id,
            network_options: Arc::new(RwLock::new(options)),
            registry,
            inbox: Mutex::new(rx),
            closed: CancellationToken::new(),
        };

        tracing::debug!(node_id, "MockTransport created and registered");
        Ok(transport)
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Updates the network simulation options for this transport.
    pub fn update_network_options(&self, options: NetworkOptions) {
        let mut current_options = self.network_options.write().expect("Options lock poisoned");
        *current_options = options;
        tracing::debug!(
            node_id = self.node_id,
            ?current_options,
            "Updated network options"
        );
    }

    /// Partitions this node from the specified peer (one-way).
    pub fn partition_from(&self, peer_id: NodeId) {
        let mut options = self.network_options.write().expect("Options lock poisoned");
        options.partitioned_links.insert((self.node_id, peer_id));
        tracing::info!(
            from = self.node_id,
            to = peer_id,
            "Network partition created"
        );
    }

    /// Removes a previously created partition from this node to the specified peer.
    pub fn heal_partition_from(&self, peer_id: NodeId) {
        let mut options = self.network_options.write().expect("Options lock poisoned");
        if options.partitioned_links.remove(&(self.node_id, peer_id)) {
            tracing::info!(
                from = self.node_id,
                to = peer_id,
                "Network partition healed"
            );
        }
    }

    /// Removes every partition originating at this node.
    pub fn heal_all(&self) {
        let mut options = self.network_options.write().expect("Options lock poisoned");
        options.partitioned_links.clear();
        tracing::info!(node_id = self.node_id, "All outgoing partitions healed");
    }

    pub(crate) fn send_impl(&self, peer_id: NodeId, message: Message) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed(self.node_id));
        }

        let options = self
            .network_options
            .read()
            .expect("Options lock poisoned")
            .clone();

        if options.is_partitioned(self.node_id, peer_id) {
            tracing::trace!(
                from = self.node_id,
                to = peer_id,
                datagram = %message,
                "Message blocked by partition"
            );
            return Err(TransportError::Partitioned(self.node_id, peer_id));
        }

        if options.should_drop_message() {
            tracing::trace!(
                from = self.node_id,
                to = peer_id,
                datagram = %message,
                "Message dropped due to simulated loss"
            );
            return Err(TransportError::MessageDropped(peer_id));
        }

        let inbox = self
            .registry
            .lookup(peer_id)
            .ok_or(TransportError::PeerNotFound(peer_id))?;

        tracing::trace!(from = self.node_id, to = peer_id, datagram = %message, "Sending");

        if let Some(delay) = options.sample_delay() {
            // Delayed messages are delivered independently, so they may overtake each other.
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = inbox.try_send(message);
            });
            return Ok(());
        }

        inbox.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::InboxFull(peer_id),
            mpsc::error::TrySendError::Closed(_) => TransportError::ChannelClosed(peer_id),
        })
    }

    pub(crate) async fn receive_impl(&self) -> Option<Message> {
        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            message = inbox.recv() => message,
        }
    }

    pub(crate) fn close_impl(&self) {
        if !self.closed.is_cancelled() {
            self.closed.cancel();
            self.registry.unregister(self.node_id);
            tracing::debug!(node_id = self.node_id, "MockTransport closed");
        }
    }
}
