//! Application loop tests over loopback swarms

use std::io::{self, Write};
use std::time::Duration;

use tokio::sync::mpsc;

use swarmchat_cli::{AppConfig, CliError, SwarmchatApp};
use swarmchat_core::MessageKind;

fn loopback_config(name: &str, topic: &str, peers: Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();
    config.identity.display_name = name.to_string();
    config.swarm.topic = topic.to_string();
    config.swarm.listen_addr = "127.0.0.1:0".to_string();
    config.swarm.bootstrap_peers = peers;
    config.swarm.dial_attempts = 1;
    config.discovery.attempts = 1;
    config.discovery.interval_secs = 1;
    config
}

#[tokio::test]
async fn test_end_of_input_shuts_down_cleanly() {
    let mut app = SwarmchatApp::start(loopback_config("solo", "app-test-solo", vec![]))
        .await
        .unwrap();

    let (lines, input) = mpsc::unbounded_channel();
    lines.send("/status".to_string()).unwrap();
    lines.send("hello?".to_string()).unwrap();
    drop(lines);

    let mut out = Vec::new();
    app.run_with_input(input, &mut out).await.unwrap();

    let output = String::from_utf8(out).unwrap();
    assert!(output.contains("Name: solo"));
    assert!(output.contains("No peers connected"));
    assert!(app.is_stopped());
    assert!(app.node().is_shut_down());

    // second shutdown is a no-op
    app.shutdown().await;
}

/// Output sink that panics when a command prints `trigger`
struct TrippingWriter {
    trigger: &'static str,
    written: Vec<u8>,
}

impl Write for TrippingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if String::from_utf8_lossy(buf).contains(self.trigger) {
            panic!("output tripped on {}", self.trigger);
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_panicking_command_still_shuts_down() {
    let mut app = SwarmchatApp::start(loopback_config("fragile", "app-test-panic", vec![]))
        .await
        .unwrap();

    let (lines, input) = mpsc::unbounded_channel();
    lines.send("/status".to_string()).unwrap();
    lines.send("/help".to_string()).unwrap();

    let mut out = TrippingWriter {
        trigger: "Name:",
        written: Vec::new(),
    };
    let result = app.run_with_input(input, &mut out).await;

    match result {
        Err(CliError::EventPanic(reason)) => assert!(reason.contains("Name:")),
        other => panic!("expected a panic error, got {:?}", other),
    }
    assert!(app.is_stopped());
    assert!(app.node().is_shut_down());
    // the loop stopped before reading /help
    assert!(!String::from_utf8_lossy(&out.written).contains("/quit"));
    drop(lines);
}

#[tokio::test]
async fn test_two_apps_chat_over_loopback() {
    let topic = "app-test-pair";
    let alice = SwarmchatApp::start(loopback_config("alice", topic, vec![]))
        .await
        .unwrap();
    let alice_addr = alice.local_addr().to_string();
    let bob = SwarmchatApp::start(loopback_config("bob", topic, vec![alice_addr]))
        .await
        .unwrap();

    let mut alice_live = alice.live_count();
    let mut bob_live = bob.live_count();

    let (alice_lines, alice_input) = mpsc::unbounded_channel();
    let (bob_lines, bob_input) = mpsc::unbounded_channel();

    let alice_task = tokio::spawn(async move {
        let mut alice = alice;
        let mut out = Vec::new();
        let result = alice.run_with_input(alice_input, &mut out).await;
        (alice, result, out)
    });
    let bob_task = tokio::spawn(async move {
        let mut bob = bob;
        let mut out = Vec::new();
        let result = bob.run_with_input(bob_input, &mut out).await;
        (bob, result, out)
    });

    let connected = Duration::from_secs(5);
    tokio::time::timeout(connected, alice_live.wait_for(|count| *count > 0))
        .await
        .unwrap()
        .unwrap();
    tokio::time::timeout(connected, bob_live.wait_for(|count| *count > 0))
        .await
        .unwrap()
        .unwrap();

    bob_lines.send("hi alice".to_string()).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    alice_lines.send("/quit".to_string()).unwrap();
    bob_lines.send("/quit".to_string()).unwrap();

    let (alice, alice_result, _) = alice_task.await.unwrap();
    let (bob, bob_result, bob_out) = bob_task.await.unwrap();
    alice_result.unwrap();
    bob_result.unwrap();

    let received: Vec<_> = alice
        .node()
        .history()
        .entries()
        .iter()
        .map(|entry| (entry.message.kind(), entry.message.text().map(str::to_string)))
        .collect();
    assert!(received.contains(&(MessageKind::Welcome, Some("Hello from bob!".to_string()))));
    assert!(received.contains(&(MessageKind::Broadcast, Some("hi alice".to_string()))));

    assert!(String::from_utf8(bob_out).unwrap().contains("Sent to 1 peer(s), 0 failed"));
    assert!(bob.is_stopped());
}
