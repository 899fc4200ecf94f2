//! Relay client integration tests against in-process mock relays.
//!
//! Each mock relay is a real WebSocket server bound to a loopback
//! port, scripted to answer one subscription with a fixed set of
//! EVENT frames and (optionally) an EOSE.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use tributary_core::Filter;
use tributary_net::query_relays;

fn event_json(id: &str, pubkey: &str, created_at: u64) -> Value {
    json!({
        "id": id,
        "pubkey": pubkey,
        "created_at": created_at,
        "kind": 1,
        "tags": [],
        "content": format!("note {id}"),
        "sig": ""
    })
}

/// Behaviour script for one mock relay.
struct RelayScript {
    /// Events sent before the EOSE (if any).
    events: Vec<Value>,
    /// Whether to send EOSE after the events.
    send_eose: bool,
    /// Events sent after the EOSE.
    late_events: Vec<Value>,
    /// Delay before answering the subscription at all.
    response_delay: Duration,
}

impl RelayScript {
    fn with_events(events: Vec<Value>) -> Self {
        Self {
            events,
            send_eose: true,
            late_events: Vec::new(),
            response_delay: Duration::ZERO,
        }
    }
}

/// Spawn a mock relay serving a single connection, returning its URL.
async fn spawn_relay(script: RelayScript) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(ws) = accept_async(stream).await else {
            return;
        };
        let (mut sink, mut source) = ws.split();

        // Wait for the REQ and pull out the subscription id.
        let sub_id = loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => {
                    let frame: Value = serde_json::from_str(&text).unwrap();
                    if frame[0] == "REQ" {
                        break frame[1].as_str().unwrap().to_string();
                    }
                }
                Some(Ok(_)) => continue,
                _ => return,
            }
        };

        tokio::time::sleep(script.response_delay).await;

        for event in &script.events {
            let frame = json!(["EVENT", sub_id, event]).to_string();
            if sink.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
        if script.send_eose {
            let _ = sink
                .send(Message::Text(json!(["EOSE", sub_id]).to_string()))
                .await;
        }
        for event in &script.late_events {
            let frame = json!(["EVENT", sub_id, event]).to_string();
            if sink.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }

        // Hold the connection open; the client decides when to leave.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    format!("ws://{addr}")
}

#[tokio::test]
async fn merges_and_deduplicates_across_relays() {
    let shared = event_json("dup", "pk1", 100);
    let relay_a = spawn_relay(RelayScript::with_events(vec![
        shared.clone(),
        event_json("only-a", "pk1", 300),
    ]))
    .await;
    let relay_b = spawn_relay(RelayScript::with_events(vec![
        shared,
        event_json("only-b", "pk2", 200),
    ]))
    .await;

    let events = query_relays(
        &Filter::new().kinds([1]),
        &[relay_a, relay_b],
        Duration::from_secs(5),
    )
    .await;

    let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["only-a", "only-b", "dup"]);
    // Exactly one entry for the shared id.
    assert_eq!(ids.iter().filter(|id| **id == "dup").count(), 1);
    // Non-increasing created_at.
    for pair in events.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }
}

#[tokio::test]
async fn dead_relay_never_blocks_the_others() {
    let healthy = spawn_relay(RelayScript::with_events(vec![event_json(
        "alive", "pk1", 50,
    )]))
    .await;
    // Nothing listens here; connect fails immediately.
    let dead = "ws://127.0.0.1:1".to_string();

    let start = Instant::now();
    let events = query_relays(
        &Filter::new().kinds([1]),
        &[dead, healthy],
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "alive");
    // The dead relay fails fast rather than consuming the timeout.
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn global_timeout_bounds_a_relay_that_never_sends_eose() {
    let relay = spawn_relay(RelayScript {
        events: vec![event_json("partial", "pk1", 10)],
        send_eose: false,
        late_events: Vec::new(),
        response_delay: Duration::ZERO,
    })
    .await;

    let start = Instant::now();
    let events = query_relays(
        &Filter::new().kinds([1]),
        &[relay],
        Duration::from_millis(300),
    )
    .await;

    // Collected what arrived, gave up at the deadline.
    assert_eq!(events.len(), 1);
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn events_after_eose_are_not_collected() {
    let relay = spawn_relay(RelayScript {
        events: vec![event_json("before", "pk1", 10)],
        send_eose: true,
        late_events: vec![event_json("after", "pk1", 20)],
        response_delay: Duration::ZERO,
    })
    .await;

    let events = query_relays(&Filter::new().kinds([1]), &[relay], Duration::from_secs(5)).await;

    let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["before"]);
}

#[tokio::test]
async fn slow_relay_contributes_nothing_past_the_deadline() {
    let fast = spawn_relay(RelayScript::with_events(vec![event_json(
        "fast", "pk1", 30,
    )]))
    .await;
    let slow = spawn_relay(RelayScript {
        events: vec![event_json("slow", "pk2", 40)],
        send_eose: true,
        late_events: Vec::new(),
        response_delay: Duration::from_secs(10),
    })
    .await;

    let events = query_relays(
        &Filter::new().kinds([1]),
        &[fast, slow],
        Duration::from_millis(500),
    )
    .await;

    let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["fast"]);
}

#[tokio::test]
async fn all_relays_empty_is_an_empty_result_not_an_error() {
    let relay = spawn_relay(RelayScript::with_events(Vec::new())).await;
    let events = query_relays(&Filter::new().kinds([1]), &[relay], Duration::from_secs(5)).await;
    assert!(events.is_empty());
}
