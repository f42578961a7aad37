use crate::services::persistence::ShapeStore;
use crate::shape::{Circle, Rect, Shape};
use crate::state::test_helpers::{RecordingStore, spawn_server, test_app_state, token_for};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;

async fn get_shapes(addr: std::net::SocketAddr, room_id: &str, token: Option<&str>) -> reqwest::Response {
    let mut request = reqwest::Client::new().get(format!("http://{addr}/api/rooms/{room_id}/shapes"));
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    request.send().await.expect("request should complete")
}

#[tokio::test]
async fn lists_room_shapes_in_persistence_order() {
    let store = Arc::new(RecordingStore::new());
    let rect = Shape::Rect(Rect { x: 1.0, y: 2.0, width: 3.0, height: 4.0 });
    let circle = Shape::Circle(Circle { center_x: 5.0, center_y: 5.0, radius_x: 1.0, radius_y: 2.0 });
    store.create_shape("r1", &rect, "alice").await.unwrap();
    store.create_shape("r2", &rect, "bob").await.unwrap();
    store.create_shape("r1", &circle, "bob").await.unwrap();

    let addr = spawn_server(test_app_state(store)).await;
    let response = get_shapes(addr, "r1", Some(&token_for("carol"))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"shapes": [
            {"type": "rect", "x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0},
            {"type": "circle", "centerX": 5.0, "centerY": 5.0, "radiusX": 1.0, "radiusY": 2.0},
        ]})
    );
}

#[tokio::test]
async fn empty_room_lists_no_shapes() {
    let addr = spawn_server(test_app_state(Arc::new(RecordingStore::new()))).await;
    let body: Value = get_shapes(addr, "quiet", Some(&token_for("alice")))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"shapes": []}));
}

#[tokio::test]
async fn listing_requires_a_valid_bearer_token() {
    let addr = spawn_server(test_app_state(Arc::new(RecordingStore::new()))).await;
    assert_eq!(get_shapes(addr, "r1", None).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(get_shapes(addr, "r1", Some("garbage")).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn store_failure_is_internal_error() {
    let addr = spawn_server(test_app_state(Arc::new(RecordingStore::new().failing_list()))).await;
    let response = get_shapes(addr, "r1", Some(&token_for("alice"))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn healthz_is_ok() {
    let addr = spawn_server(test_app_state(Arc::new(RecordingStore::new()))).await;
    let response = reqwest::get(format!("http://{addr}/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
