//! Gateway client integration tests
//!
//! Each test runs the client against an in-process mock gateway over a real socket.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::{Duration, Instant};

use gateway_client::protocol::{OpCode, Payload, StatusUpdatePayload};
use gateway_client::{ConnectionStatus, GatewayError, GatewayEvent, VoiceServerAssigned};
use integration_tests::*;
use serde_json::json;

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_identify_and_ready() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config());

    let (session, identify) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .expect("handshake failed");

    assert!(session.path.contains("encoding=json"));
    assert!(session.path.contains("v=6"));

    assert_eq!(identify.d["token"], TOKEN);
    assert_eq!(identify.d["compress"], true);
    assert_eq!(identify.d["large_threshold"], 250);
    assert!(identify.d["properties"]["$os"].is_string());

    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(client.session_id().as_deref(), Some(SESSION_ID));
    assert_eq!(client.sequence(), 1);

    match next_event(&mut events).await.unwrap() {
        GatewayEvent::Ready { session_id, payload } => {
            assert_eq!(session_id, SESSION_ID);
            assert_eq!(payload["user"]["username"], "tester");
        }
        other => panic!("expected Ready, got {other:?}"),
    }
    assert_eq!(next_event(&mut events).await.unwrap(), GatewayEvent::Connected);
}

#[tokio::test]
async fn test_handshake_timeout() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut config = test_config().with_handshake_timeout(Duration::from_millis(300));
    // The mock never answers our close frame
    config.transport.close_timeout = Duration::from_millis(200);
    let (client, _events) = client_for(&gateway, config);

    // Accept the socket but never send Hello
    let (result, session) = tokio::join!(client.connect(TOKEN), gateway.accept());
    let _session = session.unwrap();

    assert!(matches!(result, Err(GatewayError::HandshakeTimeout(_))));
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_authentication_failure_is_fatal() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, _events) = client_for(&gateway, test_config());

    let server = async {
        let mut session = gateway.accept().await?;
        session.send(&Payload::hello(QUIET_INTERVAL_MS)).await?;
        session.recv_op(OpCode::Identify).await?;
        session.close(4004, "Authentication failed").await?;
        Ok::<_, anyhow::Error>(())
    };
    let (result, served) = tokio::join!(client.connect("bad-token"), server);
    served.unwrap();

    let error = result.expect_err("connect should fail");
    assert!(error.is_fatal());
    assert_eq!(
        error.close_code(),
        Some(gateway_client::protocol::CloseCode::AuthenticationFailed)
    );
    assert_eq!(client.status(), ConnectionStatus::FatallyClosed);

    // No retry with a rejected token
    assert!(gateway.try_accept(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, _events) = client_for(&gateway, test_config());
    let (_session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    assert!(matches!(
        client.connect(TOKEN).await,
        Err(GatewayError::AlreadyConnected)
    ));
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_dispatch_forwarding_and_sequence() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    for seq in [2, 3] {
        session
            .send(&Payload::dispatch("MESSAGE_CREATE", seq, json!({ "id": seq.to_string() })))
            .await
            .unwrap();
    }
    // An older sequence is still routed but does not move the counter back
    session
        .send(&Payload::dispatch("TYPING_START", 2, json!({})))
        .await
        .unwrap();

    let mut names = Vec::new();
    while names.len() < 3 {
        if let GatewayEvent::Dispatch { name, .. } = next_event(&mut events).await.unwrap() {
            names.push(name);
        }
    }

    assert_eq!(names, ["MESSAGE_CREATE", "MESSAGE_CREATE", "TYPING_START"]);
    assert_eq!(client.sequence(), 3);
}

#[tokio::test]
async fn test_compressed_dispatch() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    let body = json!({ "guild_id": "42", "members": ["a", "b", "c"] });
    session
        .send_compressed(&Payload::dispatch("GUILD_MEMBERS_CHUNK", 2, body.clone()))
        .await
        .unwrap();

    let event = wait_for_event(&mut events, |e| matches!(e, GatewayEvent::Dispatch { .. }))
        .await
        .unwrap();
    assert_eq!(
        event,
        GatewayEvent::Dispatch {
            name: "GUILD_MEMBERS_CHUNK".to_string(),
            payload: body,
        }
    );
    assert_eq!(client.sequence(), 2);
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test]
async fn test_heartbeat_cadence() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, _events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, 100).await.unwrap();

    let started = Instant::now();
    for _ in 0..3 {
        let heartbeat = session.recv_op(OpCode::Heartbeat).await.unwrap();
        assert_eq!(heartbeat.d, json!(1));
        session.send(&Payload::heartbeat_ack()).await.unwrap();
    }
    let elapsed = started.elapsed();

    // Three beats at 100 ms, allowing for scheduling slack
    assert!(elapsed >= Duration::from_millis(200), "too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "too slow: {elapsed:?}");
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_server_heartbeat_request() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, _events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    session.send(&Payload::heartbeat(0)).await.unwrap();
    let heartbeat = session.recv_op(OpCode::Heartbeat).await.unwrap();
    assert_eq!(heartbeat.to_json().unwrap(), r#"{"op":1,"d":1}"#);
}

#[tokio::test]
async fn test_missed_acks_close_and_resume() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, 50).await.unwrap();

    // Never ACK; after five intervals the client gives up on this socket
    let code = session.expect_close().await.unwrap();
    assert_eq!(code, Some(1002));
    assert!(session.received().iter().any(|p| p.op == OpCode::Heartbeat));

    let mut second = gateway.accept().await.unwrap();
    second.send(&Payload::hello(QUIET_INTERVAL_MS)).await.unwrap();
    let resume = second.recv_op(OpCode::Resume).await.unwrap();
    assert_eq!(resume.d, json!({ "token": TOKEN, "session_id": SESSION_ID, "seq": 1 }));

    second
        .send(&Payload::dispatch("RESUMED", 2, json!({})))
        .await
        .unwrap();
    wait_for_event(&mut events, |e| *e == GatewayEvent::Resumed)
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await.unwrap(), GatewayEvent::Connected);
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

// ============================================================================
// Resume and reconnect
// ============================================================================

#[tokio::test]
async fn test_reconnect_opcode_resumes() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    session.send(&Payload::reconnect()).await.unwrap();
    let code = session.expect_close().await.unwrap();
    // Anything but a normal closure keeps the session resumable
    assert_ne!(code, Some(1000));

    let mut second = gateway.accept().await.unwrap();
    second.send(&Payload::hello(QUIET_INTERVAL_MS)).await.unwrap();
    let resume = second.recv_op(OpCode::Resume).await.unwrap();
    assert_eq!(resume.op, OpCode::Resume);
    assert_eq!(resume.d, json!({ "token": "T", "session_id": "xyz", "seq": 1 }));
    assert_eq!(client.status(), ConnectionStatus::Reconnecting);

    second
        .send(&Payload::dispatch("RESUMED", 2, json!({})))
        .await
        .unwrap();
    wait_for_event(&mut events, |e| *e == GatewayEvent::Resumed)
        .await
        .unwrap();
    assert_eq!(client.sequence(), 2);
}

#[tokio::test]
async fn test_invalid_session_identifies_afresh() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    session
        .send(&Payload::dispatch("MESSAGE_CREATE", 5, json!({})))
        .await
        .unwrap();
    session.send(&Payload::invalid_session(false)).await.unwrap();

    let identify = session.recv_op(OpCode::Identify).await.unwrap();
    assert_eq!(identify.d["token"], TOKEN);
    assert!(identify.d.get("session_id").is_none());
    assert!(identify.d.get("seq").is_none());
    assert!(client.session_id().is_none());
    assert_eq!(client.sequence(), 0);

    session
        .send(&Payload::dispatch("READY", 1, ready_body("abc")))
        .await
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, GatewayEvent::Ready { session_id, .. } if session_id == "abc")
    })
    .await
    .unwrap();
    assert_eq!(client.session_id().as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_ready_after_resume_starts_new_sequence() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    session
        .send(&Payload::dispatch("MESSAGE_CREATE", 50, json!({})))
        .await
        .unwrap();
    session.send(&Payload::reconnect()).await.unwrap();
    session.expect_close().await.unwrap();

    let mut second = gateway.accept().await.unwrap();
    second.send(&Payload::hello(QUIET_INTERVAL_MS)).await.unwrap();
    let resume = second.recv_op(OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["seq"], 50);

    // The server declines the resume and opens a new session
    second
        .send(&Payload::dispatch("READY", 1, ready_body("new")))
        .await
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, GatewayEvent::Ready { session_id, .. } if session_id == "new")
    })
    .await
    .unwrap();

    assert_eq!(client.session_id().as_deref(), Some("new"));
    assert_eq!(client.sequence(), 1);

    second.send(&Payload::heartbeat(0)).await.unwrap();
    let heartbeat = second.recv_op(OpCode::Heartbeat).await.unwrap();
    assert_eq!(heartbeat.d, json!(1));
}

#[tokio::test]
async fn test_resumable_close_resumes() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, _events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    session.close(4000, "Unknown error").await.unwrap();

    let mut second = gateway.accept().await.unwrap();
    second.send(&Payload::hello(QUIET_INTERVAL_MS)).await.unwrap();
    let resume = second.recv_op(OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["session_id"], SESSION_ID);
}

#[tokio::test]
async fn test_invalid_sequence_close_identifies_afresh() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, _events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    session.close(4007, "Invalid seq").await.unwrap();

    let mut second = gateway.accept().await.unwrap();
    second.send(&Payload::hello(QUIET_INTERVAL_MS)).await.unwrap();
    let next = second.recv().await.unwrap();
    assert_eq!(next.op, OpCode::Identify);
}

#[tokio::test]
async fn test_fatal_close_after_ready_is_reported_once() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    session.close(4004, "Authentication failed").await.unwrap();

    let fatal = wait_for_event(&mut events, |e| matches!(e, GatewayEvent::Fatal(_)))
        .await
        .unwrap();
    assert!(matches!(fatal, GatewayEvent::Fatal(reason) if reason.contains("4004")));

    assert!(gateway.try_accept(Duration::from_millis(300)).await.is_none());
    assert_eq!(client.status(), ConnectionStatus::FatallyClosed);
    assert!(drain_events(&mut events)
        .iter()
        .all(|e| !matches!(e, GatewayEvent::Fatal(_))));
}

#[tokio::test]
async fn test_retries_repeat_at_fixed_delay() {
    let delay = Duration::from_millis(200);
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config().with_reconnect_delay(delay));
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    // Turn the next attempts away before Hello; the default budget is unlimited
    for _ in 0..3 {
        let closed_at = Instant::now();
        session.close(4000, "Unknown error").await.unwrap();

        session = gateway.accept().await.unwrap();
        let gap = closed_at.elapsed();
        assert!(gap >= delay, "retried too early: {gap:?}");
        assert!(gap < delay + Duration::from_secs(2), "retried too late: {gap:?}");
        assert_ne!(client.status(), ConnectionStatus::FatallyClosed);
    }

    session.send(&Payload::hello(QUIET_INTERVAL_MS)).await.unwrap();
    let resume = session.recv_op(OpCode::Resume).await.unwrap();
    assert_eq!(resume.d["session_id"], SESSION_ID);
    session
        .send(&Payload::dispatch("RESUMED", 2, json!({})))
        .await
        .unwrap();
    wait_for_event(&mut events, |e| *e == GatewayEvent::Resumed)
        .await
        .unwrap();

    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert!(drain_events(&mut events)
        .iter()
        .all(|e| !matches!(e, GatewayEvent::Fatal(_))));
}

#[tokio::test]
async fn test_reconnect_budget_exhausted() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(
        &gateway,
        test_config().with_max_reconnect_attempts(Some(1)),
    );
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    // Further connection attempts are refused
    gateway.shutdown();
    session.close(4000, "Unknown error").await.unwrap();

    let fatal = wait_for_event(&mut events, |e| matches!(e, GatewayEvent::Fatal(_)))
        .await
        .unwrap();
    assert!(matches!(fatal, GatewayEvent::Fatal(reason) if reason.contains("reconnect")));
    assert_eq!(client.status(), ConnectionStatus::FatallyClosed);
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test]
async fn test_disconnect_after_fatal_close_is_silent() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    session.close(4004, "Authentication failed").await.unwrap();
    wait_for_event(&mut events, |e| matches!(e, GatewayEvent::Fatal(_)))
        .await
        .unwrap();

    client.disconnect().await;

    assert_eq!(client.status(), ConnectionStatus::FatallyClosed);
    assert!(drain_events(&mut events)
        .iter()
        .all(|e| *e != GatewayEvent::Disconnected));
}

#[tokio::test]
async fn test_disconnect_is_terminal_and_idempotent() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    let ((), code) = tokio::join!(client.disconnect(), session.expect_close());
    assert_eq!(code.unwrap(), Some(1000));

    client.disconnect().await;

    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(client.session_id().is_none());

    let disconnected = drain_events(&mut events)
        .into_iter()
        .filter(|e| *e == GatewayEvent::Disconnected)
        .count();
    assert_eq!(disconnected, 1);

    // No implicit reconnect after a manual disconnect
    assert!(gateway.try_accept(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, _events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    let ((), _) = tokio::join!(client.disconnect(), session.expect_close());

    // A fresh connect identifies rather than resuming the old session
    let (_second, identify) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();
    assert_eq!(identify.op, OpCode::Identify);
    assert_eq!(client.status(), ConnectionStatus::Connected);
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_voice_handoff() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, mut events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    client
        .send_voice_state_update("100", Some("200".to_string()))
        .unwrap();
    let request = session.recv_op(OpCode::VoiceStateUpdate).await.unwrap();
    assert_eq!(request.d["guild_id"], "100");
    assert_eq!(request.d["channel_id"], "200");
    assert_eq!(request.d["session_id"], SESSION_ID);

    session
        .send(&Payload::dispatch(
            "VOICE_SERVER_UPDATE",
            2,
            json!({ "token": "vt", "guild_id": "100", "endpoint": "voice.example.com:443" }),
        ))
        .await
        .unwrap();

    let event = wait_for_event(&mut events, |e| matches!(e, GatewayEvent::VoiceServerAssigned(_)))
        .await
        .unwrap();
    assert_eq!(
        event,
        GatewayEvent::VoiceServerAssigned(VoiceServerAssigned {
            guild_id: "100".to_string(),
            endpoint: "voice.example.com:443".to_string(),
            token: "vt".to_string(),
            session_id: Some(SESSION_ID.to_string()),
        })
    );
}

#[tokio::test]
async fn test_large_payload_is_fragmented_and_reassembled() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, _events) = client_for(&gateway, test_config().with_fragment_size(64));
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    let game = "x".repeat(10_000);
    client
        .update_status(&StatusUpdatePayload::new("online").with_game(game.clone()))
        .unwrap();

    let update = session.recv_op(OpCode::StatusUpdate).await.unwrap();
    assert_eq!(update.d["game"]["name"], game);
    assert_eq!(update.d["status"], "online");
}

#[tokio::test]
async fn test_request_guild_members() {
    let mut gateway = MockGateway::start().await.unwrap();
    let (client, _events) = client_for(&gateway, test_config());
    let (mut session, _) = connect_ready(&client, &mut gateway, QUIET_INTERVAL_MS)
        .await
        .unwrap();

    client.request_guild_members("42", "ab", 10).unwrap();
    let request = session.recv_op(OpCode::RequestGuildMembers).await.unwrap();
    assert_eq!(request.d, json!({ "guild_id": "42", "query": "ab", "limit": 10 }));
}
