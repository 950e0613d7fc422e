//! Reconnect behaviour: fixed delay, session resumption, orphaned calls.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{connect, start, start_with_rooms, test_config, Peer};
use realtime_rpc::protocol::Message;
use realtime_rpc::transport::Frame;
use realtime_rpc::{ConnectionState, RoomRegistry, SessionError};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Resume handshake on a fresh link: hello must be `session.resume`.
async fn resume(peer: &mut Peer) {
    assert_eq!(
        peer.expect_hello().await,
        Message::session_resume("s1", "k1")
    );
    peer.challenge(100);
    assert_eq!(peer.expect_answer().await, json!(101));
}

#[tokio::test(start_paused = true)]
async fn test_close_resets_call_and_reconnects_after_delay() {
    let config = test_config();
    let (session, mut listener) = start(config.clone());
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    session.on_closed(move |reason| {
        let _ = closed_tx.send(reason.to_string());
    });

    let mut peer = connect(&session, &mut listener, &config).await;
    let pending = session.caller().call("slow", Value::Null);
    let orphan = peer.recv_call().await;

    let lost_at = Instant::now();
    peer.link.close("server restart");

    assert_eq!(closed_rx.recv().await.unwrap(), "server restart");
    assert!(matches!(pending.await, Err(SessionError::ConnectionReset)));
    assert_eq!(session.state(), ConnectionState::Disconnected);

    let mut peer = Peer::accept(&mut listener, &config).await;
    let waited = lost_at.elapsed();
    assert!(waited >= Duration::from_secs(5), "reconnected after {waited:?}");
    assert!(waited < Duration::from_secs(6), "reconnected after {waited:?}");

    resume(&mut peer).await;
    session.ready().await.unwrap();

    // A late answer to the orphaned call must not resolve anything new.
    peer.send(&Message::call_ok(orphan.id, json!("stale")));
    let fresh = session.caller().call("fresh", Value::Null);
    let call = peer.recv_call().await;
    peer.send(&Message::call_ok(call.id, json!("fresh result")));
    assert_eq!(fresh.await.unwrap(), json!("fresh result"));
}

#[tokio::test(start_paused = true)]
async fn test_orphaned_call_left_pending_when_reset_disabled() {
    let mut config = test_config();
    config.reset_pending_on_disconnect = false;
    let (session, mut listener) = start(config.clone());

    let mut peer = connect(&session, &mut listener, &config).await;
    let pending = session.caller().call("slow", Value::Null);
    tokio::pin!(pending);
    let orphan = peer.recv_call().await;
    peer.link.close("gone");

    let mut peer = Peer::accept(&mut listener, &config).await;
    resume(&mut peer).await;
    session.ready().await.unwrap();

    assert!(tokio::time::timeout(Duration::from_secs(1), &mut pending)
        .await
        .is_err());

    peer.send(&Message::call_ok(orphan.id, json!("eventually")));
    assert_eq!(pending.await.unwrap(), json!("eventually"));
}

#[tokio::test(start_paused = true)]
async fn test_call_issued_while_disconnected_is_sent_after_resume() {
    let config = test_config();
    let (session, mut listener) = start(config.clone());
    let peer = connect(&session, &mut listener, &config).await;

    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    session.on_closed(move |_| {
        let _ = closed_tx.send(());
    });
    peer.link.close("bye");
    closed_rx.recv().await.unwrap();

    let pending = session.caller().call("queued", json!([1, 2]));

    let mut peer = Peer::accept(&mut listener, &config).await;
    resume(&mut peer).await;
    let call = peer.recv_call().await;
    assert_eq!(call.method, "user.queued");
    peer.send(&Message::call_ok(call.id, json!("ok")));
    assert_eq!(pending.await.unwrap(), json!("ok"));
}

#[tokio::test(start_paused = true)]
async fn test_refused_connection_retries_every_delay() {
    let config = test_config();
    let (session, mut listener) = start(config.clone());
    let errors = Arc::new(AtomicUsize::new(0));
    let closes = Arc::new(AtomicUsize::new(0));
    let e = Arc::clone(&errors);
    session.on_error(move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    });
    let c = Arc::clone(&closes);
    session.on_closed(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    listener.set_refusing(true);
    let connecting = session.connect();
    tokio::pin!(connecting);

    // attempts at t = 0, 5 and 10
    assert!(tokio::time::timeout(Duration::from_secs(12), &mut connecting)
        .await
        .is_err());
    assert_eq!(errors.load(Ordering::SeqCst), 3);
    assert_eq!(closes.load(Ordering::SeqCst), 3);

    listener.set_refusing(false);
    let (ready, _peer) = tokio::join!(&mut connecting, async {
        let mut peer = Peer::accept(&mut listener, &config).await;
        peer.handshake().await;
        peer
    });
    ready.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_frame_drops_connection() {
    let config = test_config();
    let (session, mut listener) = start(config.clone());
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    session.on_error(move |info| {
        let _ = error_tx.send(info.to_string());
    });

    let peer = connect(&session, &mut listener, &config).await;
    peer.send_raw(Frame::Binary(vec![0xde, 0xad, 0xbe, 0xef]));

    let info = error_rx.recv().await.unwrap();
    assert!(info.contains("Decompression failed"), "{info}");

    let mut peer = Peer::accept(&mut listener, &config).await;
    resume(&mut peer).await;
    session.ready().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rooms_and_listeners_survive_reconnect() {
    let config = test_config();
    let rooms = RoomRegistry::new();
    let (session, mut listener) = start_with_rooms(config.clone(), rooms.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let peer = connect(&session, &mut listener, &config).await;
    peer.event("hello", Value::Null, Some("lobby"));
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    session.on_closed(move |_| {
        let _ = closed_tx.send(());
    });

    // wait until the room exists, then subscribe inside it
    let lobby = loop {
        if let Some(room) = rooms.get("lobby") {
            break room;
        }
        tokio::task::yield_now().await;
    };
    lobby.on("chat", move |payload| {
        let _ = tx.send(payload.clone());
    });

    peer.link.close("blip");
    closed_rx.recv().await.unwrap();

    let mut peer = Peer::accept(&mut listener, &config).await;
    resume(&mut peer).await;
    peer.event("chat", json!("back"), Some("lobby"));

    assert_eq!(rx.recv().await.unwrap(), json!("back"));
    assert_eq!(session.rooms().names(), vec!["lobby".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_transport_and_fails_calls() {
    let config = test_config();
    let (mut session, mut listener) = start(config.clone());
    let mut peer = connect(&session, &mut listener, &config).await;

    let pending = session.caller().call("never", Value::Null);
    peer.recv_call().await;

    session.shutdown().await;
    assert!(matches!(pending.await, Err(SessionError::Closed)));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(peer.link.recv().await.is_none());
}
