use election_core::{Message, NodeId};
use election_transport::{
    MockTransport, NetworkOptions, Transport, TransportError, TransportRegistry, UdpTransport,
    node_addr,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout};

// Helper to initialize tracing for tests
fn init_tracing() {
    // Using try_init ignores errors if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter("election_transport=trace,integration_test=trace")
        .with_test_writer()
        .try_init();
}

fn heartbeat(leader_id: NodeId, term: u64) -> Message {
    Message::Heartbeat { leader_id, term }
}

async fn recv_within(transport: &impl Transport, wait: Duration) -> Option<Message> {
    timeout(wait, transport.receive())
        .await
        .ok()
        .and_then(|result| result.expect("receive should not fail"))
}

fn mock(id: NodeId, registry: &Arc<TransportRegistry>) -> MockTransport {
    MockTransport::create(id, registry.clone()).expect("register transport")
}

#[tokio::test]
async fn test_basic_send_recv() {
    init_tracing();
    let registry = Arc::new(TransportRegistry::new());

    let node1 = mock(1, &registry);
    let node2 = mock(2, &registry);

    node1.send(2, heartbeat(1, 3)).await.expect("send should succeed");
    node1
        .send(
            2,
            Message::VoteRequest {
                candidate_id: 1,
                term: 4,
            },
        )
        .await
        .expect("send should succeed");

    assert_eq!(node2.receive().await.unwrap(), Some(heartbeat(1, 3)));
    assert_eq!(
        node2.receive().await.unwrap(),
        Some(Message::VoteRequest {
            candidate_id: 1,
            term: 4
        })
    );
    assert_eq!(node2.local_id(), 2);
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    init_tracing();
    let registry = Arc::new(TransportRegistry::new());
    let _node1 = mock(1, &registry);

    let err = MockTransport::create(1, registry.clone()).unwrap_err();
    assert_eq!(err, TransportError::NodeAlreadyExists(1));
}

#[tokio::test]
async fn test_send_to_nonexistent_peer() {
    init_tracing();
    let registry = Arc::new(TransportRegistry::new());
    let node1 = mock(1, &registry);

    let result = node1.send(99, heartbeat(1, 1)).await;

    let err = result.unwrap_err().downcast::<TransportError>().unwrap();
    assert_eq!(err, TransportError::PeerNotFound(99));
}

#[tokio::test]
async fn test_network_partition() {
    init_tracing();
    let registry = Arc::new(TransportRegistry::new());

    let node1 = mock(1, &registry);
    let node2 = mock(2, &registry);
    let node3 = mock(3, &registry);

    // Partition 1 -> 2
    node1.partition_from(2);

    let res12 = node1.send(2, heartbeat(1, 1)).await;
    assert_eq!(
        res12.unwrap_err().downcast::<TransportError>().unwrap(),
        TransportError::Partitioned(1, 2)
    );

    // Send 1 -> 3 (should succeed)
    node1.send(3, heartbeat(1, 1)).await.unwrap();
    assert_eq!(node3.receive().await.unwrap(), Some(heartbeat(1, 1)));

    // Send 2 -> 1 (should succeed, partition is one-way)
    node2.send(1, heartbeat(2, 1)).await.unwrap();
    assert_eq!(node1.receive().await.unwrap(), Some(heartbeat(2, 1)));

    // Heal partition 1 -> 2
    node1.heal_partition_from(2);
    node1.send(2, heartbeat(1, 2)).await.unwrap();
    assert_eq!(node2.receive().await.unwrap(), Some(heartbeat(1, 2)));
}

#[tokio::test]
async fn test_message_delay() {
    init_tracing();
    let registry = Arc::new(TransportRegistry::new());
    let delay = Duration::from_millis(100);
    let node1 = MockTransport::create_with_options(
        1,
        NetworkOptions {
            min_delay: delay,
            max_delay: delay,
            ..Default::default()
        },
        registry.clone(),
    )
    .unwrap();
    let node2 = mock(2, &registry); // Receiver doesn't need delay

    let start = Instant::now();
    // Sending never waits for the delay.
    node1.send(2, heartbeat(1, 1)).await.unwrap();
    assert!(start.elapsed() < delay);

    let received = node2.receive().await.unwrap();
    let elapsed = start.elapsed();

    tracing::info!(?elapsed, ?delay, "Measured delay");
    assert_eq!(received, Some(heartbeat(1, 1)));
    assert!(
        elapsed >= delay,
        "Elapsed time should be at least the configured delay"
    );
    // Add a reasonable upper bound to catch unexpected hangs
    assert!(elapsed < delay * 5, "Elapsed time excessively long");
}

#[tokio::test]
async fn test_message_loss() {
    init_tracing();
    let registry = Arc::new(TransportRegistry::new());
    let node1 =
        MockTransport::create_with_options(1, NetworkOptions::lossy(1.0), registry.clone())
            .unwrap();
    let node2 = mock(2, &registry);

    // Test with 100% loss
    for _ in 0..5 {
        let result = node1.send(2, heartbeat(1, 1)).await;
        assert_eq!(
            result.unwrap_err().downcast::<TransportError>().unwrap(),
            TransportError::MessageDropped(2)
        );
    }
    assert_eq!(recv_within(&node2, Duration::from_millis(50)).await, None);

    // Update options to 0% loss
    node1.update_network_options(NetworkOptions::default());

    node1.send(2, heartbeat(1, 2)).await.unwrap();
    assert_eq!(node2.receive().await.unwrap(), Some(heartbeat(1, 2)));
}

#[tokio::test]
async fn test_full_inbox_drops() {
    init_tracing();
    let registry = Arc::new(TransportRegistry::new());
    let node1 = mock(1, &registry);
    let _node2 = mock(2, &registry);

    let mut dropped = 0;
    for term in 0..150 {
        if let Err(e) = node1.send(2, heartbeat(1, term)).await {
            assert_eq!(
                e.downcast::<TransportError>().unwrap(),
                TransportError::InboxFull(2)
            );
            dropped += 1;
        }
    }
    assert_eq!(dropped, 50);
}

#[tokio::test]
async fn test_close_is_clean_and_idempotent() {
    init_tracing();
    let registry = Arc::new(TransportRegistry::new());
    let node1 = Arc::new(mock(1, &registry));
    let node2 = mock(2, &registry);

    let waiting = {
        let node1 = node1.clone();
        tokio::spawn(async move { node1.receive().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    node1.close();
    node1.close();

    let result = timeout(Duration::from_secs(1), waiting)
        .await
        .expect("receive should wake up on close")
        .unwrap();
    assert_eq!(result.unwrap(), None);
    assert!(!registry.contains(1));

    let err = node1.send(2, heartbeat(1, 1)).await.unwrap_err();
    assert_eq!(
        err.downcast::<TransportError>().unwrap(),
        TransportError::Closed(1)
    );
    let err = node2.send(1, heartbeat(2, 1)).await.unwrap_err();
    assert_eq!(
        err.downcast::<TransportError>().unwrap(),
        TransportError::PeerNotFound(1)
    );
}

#[tokio::test]
async fn test_concurrent_sends() {
    init_tracing();
    let registry = Arc::new(TransportRegistry::new());

    let node1 = Arc::new(mock(1, &registry));
    let node2 = mock(2, &registry);

    let num_tasks = 20u64;
    let mut join_handles = Vec::new();

    for term in 0..num_tasks {
        let transport = node1.clone();
        join_handles.push(tokio::spawn(async move {
            transport.send(2, heartbeat(1, term)).await
        }));
    }

    let results = futures::future::join_all(join_handles).await;
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => panic!("Task {} failed: {:?}", i, e),
            Err(e) => panic!("Task {} panicked: {:?}", i, e),
        }
    }

    let mut terms = Vec::new();
    for _ in 0..num_tasks {
        match node2.receive().await.unwrap() {
            Some(message) => terms.push(message.term()),
            None => panic!("transport closed early"),
        }
    }
    terms.sort_unstable();
    assert_eq!(terms, (0..num_tasks).collect::<Vec<_>>());
}

// UDP tests use distinct base ports so they can run in parallel.

#[tokio::test]
async fn test_udp_send_recv() {
    init_tracing();
    let base_port = 47110;
    let node0 = UdpTransport::bind(0, base_port).await.unwrap();
    let node1 = UdpTransport::bind(1, base_port).await.unwrap();
    assert_eq!(node1.local_addr().unwrap(), node_addr(base_port, 1).unwrap());

    node0
        .send(
            1,
            Message::VoteRequest {
                candidate_id: 0,
                term: 1,
            },
        )
        .await
        .unwrap();
    let received = recv_within(&node1, Duration::from_secs(2)).await;
    assert_eq!(
        received,
        Some(Message::VoteRequest {
            candidate_id: 0,
            term: 1
        })
    );

    node1
        .send(
            0,
            Message::VoteGranted {
                voter_id: 1,
                term: 1,
            },
        )
        .await
        .unwrap();
    let received = recv_within(&node0, Duration::from_secs(2)).await;
    assert_eq!(
        received,
        Some(Message::VoteGranted {
            voter_id: 1,
            term: 1
        })
    );
}

#[tokio::test]
async fn test_udp_drops_malformed_datagrams() {
    init_tracing();
    let base_port = 47120;
    let node0 = UdpTransport::bind(0, base_port).await.unwrap();
    let target = node_addr(base_port, 0).unwrap();

    let raw = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(b"HEARTBEAT", target).await.unwrap();
    raw.send_to(b"GOSSIP|1|1", target).await.unwrap();
    raw.send_to(&[0xff, 0x00], target).await.unwrap();
    raw.send_to(&vec![b'9'; 2048], target).await.unwrap();
    raw.send_to(b"HEARTBEAT|3|7", target).await.unwrap();

    let received = recv_within(&node0, Duration::from_secs(2)).await;
    assert_eq!(received, Some(heartbeat(3, 7)));
}

#[tokio::test]
async fn test_udp_bind_conflict() {
    init_tracing();
    let base_port = 47130;
    let _first = UdpTransport::bind(0, base_port).await.unwrap();

    let err = UdpTransport::bind(0, base_port).await.unwrap_err();
    assert!(matches!(err, TransportError::Bind { node_id: 0, .. }));
}

#[tokio::test]
async fn test_udp_close_wakes_receiver() {
    init_tracing();
    let base_port = 47140;
    let node0 = Arc::new(UdpTransport::bind(0, base_port).await.unwrap());

    let waiting = {
        let node0 = node0.clone();
        tokio::spawn(async move { node0.receive().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    node0.close();

    let result = timeout(Duration::from_secs(1), waiting)
        .await
        .expect("receive should wake up on close")
        .unwrap();
    assert_eq!(result.unwrap(), None);

    let err = node0.send(1, heartbeat(0, 1)).await.unwrap_err();
    assert_eq!(
        err.downcast::<TransportError>().unwrap(),
        TransportError::Closed(0)
    );
}
