mod common;

use std::time::Duration;

use chat_protocol::{decode, encode, Event, Frame};
use common::{connect_ws, TestServer, WsStream};
use futures_util::{SinkExt, StreamExt};
use server::batcher::BatcherConfig;
use tokio_tungstenite::tungstenite::Message as WsMessage;

async fn send(ws: &mut WsStream, frame: &Frame) {
    let text = encode(frame).expect("encode frame");
    ws.send(WsMessage::Text(text)).await.expect("send frame");
}

async fn recv_frame(ws: &mut WsStream) -> Frame {
    loop {
        let message = ws
            .next()
            .await
            .expect("stream ended before a frame arrived")
            .expect("websocket error");
        if let WsMessage::Text(text) = message {
            return decode(&text).expect("decode frame");
        }
    }
}

#[tokio::test]
async fn s1_echo() {
    let server = TestServer::start().await;
    server.create_account("alice", "password123").await;
    server.subscribe("alice", "welcome").await;
    let token = server.token_for("alice");

    let mut ws = connect_ws(&server.ws_url, &token).await;
    let announcement = recv_frame(&mut ws).await;
    assert_eq!(announcement.event, Event::ChannelSubscriptions);

    send(&mut ws, &Frame::message("welcome", "hi")).await;
    let reply = recv_frame(&mut ws).await;

    assert_eq!(reply.sender.as_deref(), Some("alice"));
    assert_eq!(reply.channel.as_deref(), Some("welcome"));
    assert_eq!(reply.content.as_deref(), Some("hi"));
    let sent_at = reply.sent_at.expect("sent_at present");
    chrono::DateTime::parse_from_rfc3339(&sent_at).expect("sent_at is UTC ISO-8601");
}

#[tokio::test]
async fn s2_fan_out_preserves_sender_order() {
    let server = TestServer::start().await;
    server.create_account("alice", "password123").await;
    server.create_account("bob", "password123").await;
    server.subscribe("alice", "room").await;
    server.subscribe("bob", "room").await;

    let alice_token = server.token_for("alice");
    let bob_token = server.token_for("bob");
    let mut alice_ws = connect_ws(&server.ws_url, &alice_token).await;
    let mut bob_ws = connect_ws(&server.ws_url, &bob_token).await;
    let _ = recv_frame(&mut alice_ws).await;
    let _ = recv_frame(&mut bob_ws).await;

    for content in ["a", "b", "c"] {
        send(&mut alice_ws, &Frame::message("room", content)).await;
    }

    for expected in ["a", "b", "c"] {
        let reply = recv_frame(&mut bob_ws).await;
        assert_eq!(reply.content.as_deref(), Some(expected));
    }
}

#[tokio::test]
async fn s3_add_then_leave_channel() {
    let server = TestServer::start().await;
    server.create_account("alice", "password123").await;
    server.create_account("carol", "password123").await;
    server.subscribe("alice", "welcome").await;

    let alice_token = server.token_for("alice");
    let carol_token = server.token_for("carol");
    let mut alice_ws = connect_ws(&server.ws_url, &alice_token).await;
    let _ = recv_frame(&mut alice_ws).await;

    send(&mut alice_ws, &Frame::add_channel("room")).await;
    let announcement = recv_frame(&mut alice_ws).await;
    assert_eq!(announcement.event, Event::ChannelSubscriptions);
    assert!(announcement.data.contains(&"room".to_owned()));

    send(&mut alice_ws, &Frame::leave_channel("room")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut carol_ws = connect_ws(&server.ws_url, &carol_token).await;
    let _ = recv_frame(&mut carol_ws).await;
    send(&mut carol_ws, &Frame::add_channel("room")).await;
    let _ = recv_frame(&mut carol_ws).await;
    send(&mut carol_ws, &Frame::message("room", "after leave")).await;

    let race = tokio::time::timeout(Duration::from_millis(500), alice_ws.next()).await;
    assert!(
        race.is_err(),
        "alice left the channel and should not receive this message"
    );
}

#[tokio::test]
async fn s4_batcher_flushes_by_age() {
    let server = TestServer::start_with(BatcherConfig {
        max_reconnect_attempts: 5,
        reconnect_delay: Duration::from_millis(500),
        cached_message_upload_timer: Duration::from_secs(2),
    })
    .await;
    server.create_account("alice", "password123").await;
    server.subscribe("alice", "welcome").await;
    let token = server.token_for("alice");
    let mut ws = connect_ws(&server.ws_url, &token).await;
    let _ = recv_frame(&mut ws).await;

    send(&mut ws, &Frame::message("welcome", "hi")).await;
    let _ = recv_frame(&mut ws).await;

    tokio::time::sleep(Duration::from_secs(3)).await;

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM messages")
        .fetch_one(&server.state.pool)
        .await
        .expect("count messages");
    assert_eq!(count, 1);
    assert_eq!(server.state.batcher.cache_len().await, 0);
}

#[tokio::test]
async fn s5_batcher_flushes_by_size() {
    let server = TestServer::start_with(BatcherConfig {
        max_reconnect_attempts: 5,
        reconnect_delay: Duration::from_millis(200),
        cached_message_upload_timer: Duration::from_secs(60),
    })
    .await;

    let mut sockets = Vec::new();
    for i in 0..10 {
        let username = format!("user{i}");
        server.create_account(&username, "password123").await;
        server.subscribe(&username, "room").await;
        let token = server.token_for(&username);
        let mut ws = connect_ws(&server.ws_url, &token).await;
        let _ = recv_frame(&mut ws).await;
        sockets.push(ws);
    }

    for ws in sockets.iter_mut() {
        send(ws, &Frame::message("room", "hi")).await;
    }
    for ws in sockets.iter_mut() {
        for _ in 0..10 {
            let _ = recv_frame(ws).await;
        }
    }

    tokio::time::sleep(Duration::from_millis(700)).await;

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM messages")
        .fetch_one(&server.state.pool)
        .await
        .expect("count messages");
    assert_eq!(count, 10);
}

#[tokio::test]
async fn s6_monitor_ping_reports_telemetry() {
    let server = TestServer::start().await;
    server.create_account("monitor", "password123").await;
    let token = server.token_for("monitor");
    let mut ws = connect_ws(&server.ws_url, &token).await;

    send(&mut ws, &Frame::perf_test(7)).await;
    let reply = recv_frame(&mut ws).await;

    assert_eq!(reply.perf_test_id, Some(7));
    assert_eq!(reply.active_connections, Some(0));
    assert!(!reply.cpu_load.expect("cpu_load present").is_empty());
    assert!(reply.mv_period.expect("mv_period present") >= 0.25);
    assert_eq!(reply.message_volume, Some(0));
}

#[tokio::test]
async fn s7_invalid_token_upgrades_then_closes_with_policy_violation() {
    let server = TestServer::start().await;
    let mut ws = connect_ws(&server.ws_url, "not-a-real-token").await;

    let message = ws
        .next()
        .await
        .expect("stream ended before a close frame arrived")
        .expect("websocket error");
    match message {
        WsMessage::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1008),
        other => panic!("expected a policy-violation close frame, got {other:?}"),
    }
}
