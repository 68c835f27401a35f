//! Live client against a local WebSocket server.

use std::time::{Duration, Instant};

use classroom_client::ws::ReconnectConfig;
use classroom_client::{listener, ConnectionState, LiveClient, LiveStatus};
use classroom_shared::{ServerEvent, ASSIGNMENT_CREATED};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Accepted {
    query: String,
    socket: WebSocketStream<TcpStream>,
}

/// Accept WebSocket connections on a loopback port and hand each to the test.
async fn spawn_server() -> (String, mpsc::UnboundedReceiver<Accepted>) {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = tcp.accept().await {
            let mut query = String::new();
            let callback = |req: &Request, resp: Response| {
                query = req.uri().query().unwrap_or_default().to_string();
                Ok::<Response, ErrorResponse>(resp)
            };
            let Ok(socket) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                continue;
            };
            if tx.send(Accepted { query, socket }).is_err() {
                return;
            }
        }
    });

    (format!("ws://{addr}/ws"), rx)
}

async fn accept(rx: &mut mpsc::UnboundedReceiver<Accepted>) -> Accepted {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("no connection arrived")
        .expect("server stopped")
}

async fn wait_status(live: &LiveClient, pred: impl FnMut(&LiveStatus) -> bool) -> LiveStatus {
    let mut rx = live.watch_status();
    let status = tokio::time::timeout(TIMEOUT, rx.wait_for(pred))
        .await
        .expect("status never matched")
        .expect("status channel closed")
        .clone();
    status
}

async fn next_text(socket: &mut WebSocketStream<TcpStream>) -> Option<String> {
    loop {
        let frame = tokio::time::timeout(TIMEOUT, socket.next())
            .await
            .expect("no frame arrived");
        match frame {
            Some(Ok(Message::Text(text))) => return Some(text.as_str().to_string()),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        }
    }
}

fn fast_retry(base_ms: u64) -> ReconnectConfig {
    ReconnectConfig {
        max_attempts: 5,
        base_delay: Duration::from_millis(base_ms),
    }
}

fn assignment_frame(id: i64) -> String {
    json!({
        "type": ASSIGNMENT_CREATED,
        "payload": {
            "id": id,
            "subject_id": 3,
            "title": "Essay",
            "due_date": "2024-03-10T23:59:00",
            "submission_count": 0
        }
    })
    .to_string()
}

#[tokio::test]
async fn connects_with_token_and_dispatches_events() {
    let (endpoint, mut server) = spawn_server().await;
    let live = LiveClient::new(endpoint, fast_retry(50));

    let (events_tx, mut events) = mpsc::unbounded_channel();
    live.on(
        ASSIGNMENT_CREATED,
        listener(move |event| {
            let _ = events_tx.send(event.clone());
            Ok(())
        }),
    );

    live.connect("secret tok/1");
    let mut conn = accept(&mut server).await;
    let token: Vec<(String, String)> = url::form_urlencoded::parse(conn.query.as_bytes())
        .into_owned()
        .collect();
    assert_eq!(token, vec![("token".to_string(), "secret tok/1".to_string())]);

    let status = wait_status(&live, |s| s.state == ConnectionState::Connected).await;
    assert_eq!(status.reconnect_attempts, 0);

    conn.socket.send(Message::text("{garbage")).await.unwrap();
    conn.socket.send(Message::text(assignment_frame(42))).await.unwrap();

    let event = tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        ServerEvent::AssignmentCreated(a) => assert_eq!(a.id, 42),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(events.try_recv().is_err());
    assert!(live.is_connected());

    live.disconnect();
    assert_eq!(next_text(&mut conn.socket).await, None);
    assert_eq!(live.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn control_messages_reach_the_server() {
    let (endpoint, mut server) = spawn_server().await;
    let live = LiveClient::new(endpoint, fast_retry(50));
    live.connect("tok");
    let mut conn = accept(&mut server).await;
    wait_status(&live, |s| s.state == ConnectionState::Connected).await;

    live.subscribe_assignment(42);
    live.unsubscribe_attendance(7);

    let first: Value = serde_json::from_str(&next_text(&mut conn.socket).await.unwrap()).unwrap();
    assert_eq!(
        first,
        json!({"type": "subscribe_assignment", "payload": {"assignment_id": 42}})
    );
    let second: Value = serde_json::from_str(&next_text(&mut conn.socket).await.unwrap()).unwrap();
    assert_eq!(
        second,
        json!({"type": "unsubscribe_attendance", "payload": {"subject_id": 7}})
    );

    live.disconnect();
}

#[tokio::test]
async fn reconnects_after_server_drop_and_keeps_listeners() {
    let (endpoint, mut server) = spawn_server().await;
    let live = LiveClient::new(endpoint, fast_retry(150));

    let (events_tx, mut events) = mpsc::unbounded_channel();
    live.on(
        ASSIGNMENT_CREATED,
        listener(move |event| {
            let _ = events_tx.send(event.event_type().to_string());
            Ok(())
        }),
    );

    live.connect("tok");
    let mut first = accept(&mut server).await;
    wait_status(&live, |s| s.state == ConnectionState::Connected).await;

    first.socket.close(None).await.unwrap();
    drop(first);

    let mut second = accept(&mut server).await;
    let status = wait_status(&live, |s| s.state == ConnectionState::Connected).await;
    assert_eq!(status.reconnect_attempts, 0);
    assert!(!status.exhausted);

    second.socket.send(Message::text(assignment_frame(5))).await.unwrap();
    let received = tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, ASSIGNMENT_CREATED);

    // a successful reconnect resets the budget: the next drop retries as attempt 1
    let mut status = live.watch_status();
    let dropped_at = Instant::now();
    drop(second);
    let retry = tokio::time::timeout(TIMEOUT, status.wait_for(|s| s.reconnect_attempts > 0))
        .await
        .expect("no reconnect scheduled")
        .expect("status channel closed")
        .clone();
    assert_eq!(retry.reconnect_attempts, 1);
    assert_eq!(retry.state, ConnectionState::Disconnected);

    let _third = accept(&mut server).await;
    assert!(dropped_at.elapsed() >= Duration::from_millis(150));
    let status = wait_status(&live, |s| s.state == ConnectionState::Connected).await;
    assert_eq!(status.reconnect_attempts, 0);

    live.disconnect();
}

#[tokio::test]
async fn disconnect_cancels_pending_reconnect() {
    let (endpoint, mut server) = spawn_server().await;
    let live = LiveClient::new(endpoint, fast_retry(300));

    live.connect("tok");
    let first = accept(&mut server).await;
    wait_status(&live, |s| s.state == ConnectionState::Connected).await;

    drop(first);
    wait_status(&live, |s| s.reconnect_attempts == 1).await;

    live.disconnect();
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert!(server.try_recv().is_err(), "reconnect fired after disconnect");
    assert_eq!(live.status(), LiveStatus::default());
}

#[tokio::test]
async fn manual_connect_supersedes_open_connection() {
    let (endpoint, mut server) = spawn_server().await;
    let live = LiveClient::new(endpoint, fast_retry(50));

    live.connect("first");
    let mut old = accept(&mut server).await;
    wait_status(&live, |s| s.state == ConnectionState::Connected).await;

    live.connect("second");
    let new = accept(&mut server).await;
    assert!(new.query.ends_with("token=second"));
    wait_status(&live, |s| s.state == ConnectionState::Connected).await;

    // the replaced socket is closed rather than left dangling
    assert_eq!(next_text(&mut old.socket).await, None);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.try_recv().is_err());
    assert!(live.is_connected());

    live.disconnect();
}
