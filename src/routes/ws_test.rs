use crate::services::queue::spawn_drain_worker;
use crate::state::AppState;
use crate::state::test_helpers::{
    RecordingStore, expired_token, spawn_server, test_app_state, token_for, wait_for_connections, wait_for_members,
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(store: Arc<RecordingStore>) -> (AppState, SocketAddr) {
    let state = test_app_state(store);
    spawn_drain_worker(state.clone());
    let addr = spawn_server(state.clone()).await;
    (state, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _response) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("websocket handshake should succeed");
    client
}

async fn send_json(client: &mut Client, value: Value) {
    client
        .send(Message::text(value.to_string()))
        .await
        .expect("send should succeed");
}

async fn next_message(client: &mut Client) -> Message {
    loop {
        let msg = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("receive timed out")
            .expect("stream ended unexpectedly")
            .expect("websocket error");
        if !matches!(msg, Message::Ping(_) | Message::Pong(_)) {
            return msg;
        }
    }
}

async fn recv_json(client: &mut Client) -> Value {
    match next_message(client).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).expect("server sent json"),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn expect_close(client: &mut Client) -> (u16, String) {
    match next_message(client).await {
        Message::Close(Some(frame)) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
        other => panic!("expected close frame, got {other:?}"),
    }
}

async fn assert_silent(client: &mut Client) {
    assert!(
        timeout(Duration::from_millis(100), client.next()).await.is_err(),
        "expected no frame"
    );
}

async fn join(client: &mut Client, user_id: &str, room_id: &str) {
    send_json(client, json!({"type": "authenticate", "token": token_for(user_id)})).await;
    send_json(client, json!({"type": "join_room", "roomId": room_id})).await;
}

fn rect_frame(room_id: &str, x: u32) -> Value {
    json!({
        "type": "shape",
        "roomId": room_id,
        "shapeType": "rect",
        "shapeData": {"x": x, "y": 0, "width": 10, "height": 5}
    })
}

// =============================================================================
// broadcast
// =============================================================================

#[tokio::test]
async fn shape_is_persisted_once_and_broadcast_to_every_member() {
    let store = Arc::new(RecordingStore::new());
    let (state, addr) = start(store.clone()).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    join(&mut a, "alice", "r1").await;
    join(&mut b, "bob", "r1").await;
    wait_for_members(&state, "r1", 2).await;

    send_json(&mut a, rect_frame("r1", 3)).await;

    let expected = json!({
        "type": "shape",
        "shapeType": "rect",
        "shapeData": {"x": 3.0, "y": 0.0, "width": 10.0, "height": 5.0},
        "roomId": "r1"
    });
    assert_eq!(recv_json(&mut a).await, expected);
    assert_eq!(recv_json(&mut b).await, expected);

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].room_id, "r1");
    assert_eq!(records[0].created_by_id, "alice");
}

#[tokio::test]
async fn shapes_arrive_in_send_order_and_stay_in_their_room() {
    let store = Arc::new(RecordingStore::new().with_delay(Duration::from_millis(2)));
    let (state, addr) = start(store.clone()).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    let mut c = connect(addr).await;
    join(&mut a, "alice", "r1").await;
    join(&mut b, "bob", "r1").await;
    join(&mut c, "carol", "r2").await;
    wait_for_members(&state, "r1", 2).await;
    wait_for_members(&state, "r2", 1).await;

    for x in 0..5 {
        send_json(&mut a, rect_frame("r1", x)).await;
    }

    let mut xs = Vec::new();
    for _ in 0..5 {
        xs.push(recv_json(&mut b).await["shapeData"]["x"].as_f64().unwrap());
    }
    assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_silent(&mut c).await;
    assert_eq!(store.max_in_flight(), 1);
}

// =============================================================================
// protocol violations
// =============================================================================

#[tokio::test]
async fn expired_token_closes_and_leaves_no_registry_entry() {
    let (state, addr) = start(Arc::new(RecordingStore::new())).await;
    let mut client = connect(addr).await;

    send_json(&mut client, json!({"type": "authenticate", "token": expired_token("alice")})).await;
    assert_eq!(expect_close(&mut client).await, (1008, "Invalid token".to_owned()));
    wait_for_connections(&state, 0).await;
}

#[tokio::test]
async fn frame_before_authentication_closes() {
    let (state, addr) = start(Arc::new(RecordingStore::new())).await;
    let mut client = connect(addr).await;

    send_json(&mut client, json!({"type": "join_room", "roomId": "r1"})).await;
    assert_eq!(expect_close(&mut client).await, (1008, "Not authenticated".to_owned()));
    wait_for_connections(&state, 0).await;
    assert!(state.registry.members_of("r1").await.is_empty());
}

#[tokio::test]
async fn malformed_json_closes() {
    let (_state, addr) = start(Arc::new(RecordingStore::new())).await;
    let mut client = connect(addr).await;
    join(&mut client, "alice", "r1").await;

    client.send(Message::text("{\"type\": ".to_owned())).await.unwrap();
    assert_eq!(expect_close(&mut client).await, (1008, "Invalid message format".to_owned()));
}

// =============================================================================
// validation notices
// =============================================================================

#[tokio::test]
async fn shape_for_unjoined_room_gets_notice_and_connection_stays_open() {
    let store = Arc::new(RecordingStore::new());
    let (state, addr) = start(store.clone()).await;
    let mut client = connect(addr).await;
    join(&mut client, "alice", "r1").await;
    wait_for_members(&state, "r1", 1).await;

    send_json(&mut client, rect_frame("r9", 1)).await;
    assert_eq!(recv_json(&mut client).await, json!({"error": "User not in room", "code": "E_NOT_IN_ROOM"}));

    send_json(&mut client, rect_frame("r1", 2)).await;
    let frame = recv_json(&mut client).await;
    assert_eq!(frame["type"], "shape");
    assert_eq!(frame["roomId"], "r1");
    assert_eq!(store.records().len(), 1);
}

#[tokio::test]
async fn unknown_frame_types_are_ignored_once_authenticated() {
    let (state, addr) = start(Arc::new(RecordingStore::new())).await;
    let mut client = connect(addr).await;
    join(&mut client, "alice", "r1").await;
    wait_for_members(&state, "r1", 1).await;

    send_json(&mut client, json!({"type": "cursor", "x": 1, "y": 2})).await;
    assert_silent(&mut client).await;
    assert_eq!(state.registry.members_of("r1").await.len(), 1);
}

// =============================================================================
// lifecycle
// =============================================================================

#[tokio::test]
async fn disconnect_drops_membership() {
    let (state, addr) = start(Arc::new(RecordingStore::new())).await;
    let mut client = connect(addr).await;
    join(&mut client, "alice", "r1").await;
    wait_for_members(&state, "r1", 1).await;

    client.close(None).await.unwrap();
    wait_for_connections(&state, 0).await;
    assert!(state.registry.members_of("r1").await.is_empty());
}

#[tokio::test]
async fn shape_sent_right_before_disconnect_still_reaches_the_room() {
    let store = Arc::new(RecordingStore::new().with_delay(Duration::from_millis(20)));
    let (state, addr) = start(store.clone()).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    join(&mut a, "alice", "r1").await;
    join(&mut b, "bob", "r1").await;
    wait_for_members(&state, "r1", 2).await;

    send_json(&mut a, rect_frame("r1", 6)).await;
    a.close(None).await.unwrap();
    wait_for_members(&state, "r1", 1).await;

    let frame = recv_json(&mut b).await;
    assert_eq!(frame["roomId"], "r1");
    assert_eq!(frame["shapeData"]["x"], 6.0);
    assert_eq!(store.records()[0].created_by_id, "alice");
}
