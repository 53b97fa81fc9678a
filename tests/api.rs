// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP and WebSocket surface against a real listener

use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_test::assert_ok;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use microclimate::{web, AppConfig, Pipeline};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start() -> TestServer {
    // Default config: three synthetic demos, live sample disabled
    let config = AppConfig::default();
    let pipeline = Arc::new(Pipeline::from_config(&config).unwrap());
    let shutdown = CancellationToken::new();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_pipeline = Arc::clone(&pipeline);
    let token = shutdown.clone();
    tokio::spawn(async move {
        let cors = config.server.cors_origins;
        web::serve(listener, server_pipeline, &cors, async move { token.cancelled().await })
            .await
            .unwrap();
    });

    TestServer { addr, pipeline, shutdown }
}

async fn next_json(client: &mut Client) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");

        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn get(addr: SocketAddr, path: &str) -> (u16, serde_json::Value) {
    let response = reqwest::get(format!("http://{}{}", addr, path)).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_replay_then_live() {
    let server = start().await;
    server.pipeline.scheduler().run_cycle(1).await;

    let (mut client, _) = assert_ok!(connect_async(format!("ws://{}/ws", server.addr)).await);

    // Replay: one update per cached source, nothing else first
    let mut replayed = HashSet::new();
    for _ in 0..3 {
        let message = next_json(&mut client).await;
        assert_eq!(message["type"], "update");
        assert!(message["timestamp"].is_string());
        replayed.insert(message["data"]["webcam_id"].as_str().unwrap().to_string());
    }
    let expected: HashSet<String> = ["demo_1", "demo_2", "demo_3"].iter().map(|s| s.to_string()).collect();
    assert_eq!(replayed, expected);

    // Live: a new cycle brings three updates then a status message
    server.pipeline.scheduler().run_cycle(2).await;
    for _ in 0..3 {
        assert_eq!(next_json(&mut client).await["type"], "update");
    }
    let status = next_json(&mut client).await;
    assert_eq!(status["type"], "status");
    assert_eq!(status["data"]["status"], "cycle_complete");
    assert_eq!(status["data"]["message"], "Processed 3 of 3 sources");
}

#[tokio::test]
async fn test_connection_count_tracks_clients() {
    let server = start().await;

    let (mut client, _) = connect_async(format!("ws://{}/ws", server.addr)).await.unwrap();
    client.send(Message::Text("hello".to_string())).await.unwrap();

    // Registration happens after the upgrade; poll until it shows up
    let mut active = 0;
    for _ in 0..50 {
        let (_, body) = get(server.addr, "/health").await;
        active = body["active_websocket_connections"].as_u64().unwrap();
        if active == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(active, 1);

    client.close(None).await.unwrap();

    for _ in 0..50 {
        if server.pipeline.broadcaster().connection_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("connection was not removed after close");
}

#[tokio::test]
async fn test_rest_endpoints() {
    let server = start().await;

    let (status, body) = get(server.addr, "/api/latest").await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 0);

    server.pipeline.scheduler().run_cycle(1).await;

    let (_, body) = get(server.addr, "/api/latest").await;
    assert_eq!(body["count"], 3);

    let (status, body) = get(server.addr, "/api/latest/demo_2").await;
    assert_eq!(status, 200);
    assert_eq!(body["webcam_id"], "demo_2");

    let (status, _) = get(server.addr, "/api/latest/webcam_1").await;
    assert_eq!(status, 404);

    let (status, body) = get(server.addr, "/api/webcams").await;
    assert_eq!(status, 200);
    assert_eq!(body.as_array().unwrap().len(), 4);

    let (_, body) = get(server.addr, "/api/webcams/demo_3/test").await;
    assert_eq!(body["status"], "demo");
    assert_eq!(body["webcam_id"], "demo_3");

    let (_, body) = get(server.addr, "/health").await;
    assert_eq!(body["webcams_configured"], 4);
}
