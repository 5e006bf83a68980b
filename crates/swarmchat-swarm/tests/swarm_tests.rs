//! Loopback tests for the topic swarm

use std::net::SocketAddr;
use std::time::Duration;

use swarmchat_core::{Direction, IncomingConnection, TransportError, TransportEvent};
use swarmchat_swarm::{Identity, Swarm, SwarmConfig, SwarmEvents, Topic};

fn loopback_config(bootstrap: Vec<SocketAddr>) -> SwarmConfig {
    SwarmConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        bootstrap_peers: bootstrap,
        connect_timeout_ms: 1_000,
        handshake_timeout_ms: 1_000,
        dial_attempts: 1,
        dial_retry_delay_ms: 50,
        ..SwarmConfig::default()
    }
}

async fn next_event(events: &mut SwarmEvents) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for swarm event")
        .expect("event channel closed")
}

async fn expect_connection(events: &mut SwarmEvents) -> IncomingConnection {
    match next_event(events).await {
        TransportEvent::Connection(connection) => connection,
        other => panic!("expected connection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_two_peers_connect_exchange_and_close() {
    let topic = Topic::new("swarm-test-lobby");
    let alice_identity = Identity::generate();
    let bob_identity = Identity::generate();

    let (alice, mut alice_events) = Swarm::join(loopback_config(vec![]), &alice_identity, topic.clone())
        .await
        .unwrap();
    let (bob, mut bob_events) = Swarm::join(
        loopback_config(vec![alice.local_addr()]),
        &bob_identity,
        topic,
    )
    .await
    .unwrap();

    let at_alice = expect_connection(&mut alice_events).await;
    let at_bob = expect_connection(&mut bob_events).await;

    assert_eq!(at_alice.direction, Direction::Inbound);
    assert_eq!(at_alice.public_key, bob_identity.public_key());
    assert_eq!(at_bob.direction, Direction::Outbound);
    assert_eq!(at_bob.public_key, alice_identity.public_key());

    at_bob.stream.write(b"hello alice").unwrap();
    match next_event(&mut alice_events).await {
        TransportEvent::Data { connection_id, bytes } => {
            assert_eq!(connection_id, at_alice.connection_id);
            assert_eq!(bytes, b"hello alice".to_vec());
        }
        other => panic!("expected data, got {:?}", other),
    }

    at_bob.stream.end().unwrap();
    match next_event(&mut alice_events).await {
        TransportEvent::Closed { connection_id } => assert_eq!(connection_id, at_alice.connection_id),
        other => panic!("expected close, got {:?}", other),
    }
    match next_event(&mut bob_events).await {
        TransportEvent::Closed { connection_id } => assert_eq!(connection_id, at_bob.connection_id),
        other => panic!("expected close, got {:?}", other),
    }

    alice.destroy().await;
    bob.destroy().await;
}

#[tokio::test]
async fn test_topic_mismatch_never_surfaces() {
    let (alice, mut alice_events) = Swarm::join(
        loopback_config(vec![]),
        &Identity::generate(),
        Topic::new("room-a"),
    )
    .await
    .unwrap();
    let (bob, mut bob_events) = Swarm::join(
        loopback_config(vec![alice.local_addr()]),
        &Identity::generate(),
        Topic::new("room-b"),
    )
    .await
    .unwrap();

    let quiet = Duration::from_millis(500);
    assert!(tokio::time::timeout(quiet, alice_events.recv()).await.is_err());
    assert!(tokio::time::timeout(quiet, bob_events.recv()).await.is_err());

    alice.destroy().await;
    bob.destroy().await;
}

#[tokio::test]
async fn test_destroy_is_idempotent_and_closes_sessions() {
    let topic = Topic::new("swarm-test-destroy");
    let (alice, mut alice_events) = Swarm::join(loopback_config(vec![]), &Identity::generate(), topic.clone())
        .await
        .unwrap();
    let (bob, mut bob_events) = Swarm::join(
        loopback_config(vec![alice.local_addr()]),
        &Identity::generate(),
        topic,
    )
    .await
    .unwrap();

    let at_alice = expect_connection(&mut alice_events).await;
    expect_connection(&mut bob_events).await;

    bob.destroy().await;
    bob.destroy().await;
    assert!(bob.is_destroyed());

    match next_event(&mut alice_events).await {
        TransportEvent::Closed { connection_id } => assert_eq!(connection_id, at_alice.connection_id),
        other => panic!("expected close, got {:?}", other),
    }

    alice.destroy().await;
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let (first, _events) = Swarm::join(loopback_config(vec![]), &Identity::generate(), Topic::new("bind"))
        .await
        .unwrap();

    let mut taken = loopback_config(vec![]);
    taken.listen_addr = first.local_addr();
    let result = Swarm::join(taken, &Identity::generate(), Topic::new("bind")).await;
    assert!(matches!(result, Err(swarmchat_swarm::SwarmError::Bind { .. })));

    first.destroy().await;
}

#[tokio::test]
async fn test_oversized_write_is_refused_and_session_survives() {
    let topic = Topic::new("swarm-test-frames");
    let small_frames = |bootstrap| SwarmConfig {
        max_frame_length: 1024,
        ..loopback_config(bootstrap)
    };

    let (alice, mut alice_events) = Swarm::join(small_frames(vec![]), &Identity::generate(), topic.clone())
        .await
        .unwrap();
    let (bob, mut bob_events) = Swarm::join(
        small_frames(vec![alice.local_addr()]),
        &Identity::generate(),
        topic,
    )
    .await
    .unwrap();

    let at_alice = expect_connection(&mut alice_events).await;
    let at_bob = expect_connection(&mut bob_events).await;

    let oversized = vec![b'x'; 2000];
    assert!(matches!(
        at_bob.stream.write(&oversized),
        Err(TransportError::FrameTooLarge { len: 2000, max: 1024 })
    ));

    at_bob.stream.write(b"small one").unwrap();
    match next_event(&mut alice_events).await {
        TransportEvent::Data { connection_id, bytes } => {
            assert_eq!(connection_id, at_alice.connection_id);
            assert_eq!(bytes, b"small one".to_vec());
        }
        other => panic!("expected data, got {:?}", other),
    }
    assert!(bob_events.try_recv().is_err());

    alice.destroy().await;
    bob.destroy().await;
}
