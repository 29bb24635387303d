use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use shopline_lib::auth::PinSessions;
use shopline_lib::notify::ChangeNotifier;
use shopline_lib::queue::types::ShopConfig;
use shopline_lib::server::build_router;
use shopline_lib::service::QueueService;
use shopline_lib::state::AppState;
use shopline_lib::store::MemoryStore;

const STAFF_PIN: &str = "1234";

fn test_router() -> Router {
    let store = Arc::new(MemoryStore::new(ShopConfig::default()));
    let notifier = ChangeNotifier::new(16);
    let service = QueueService::new(store, notifier.clone());
    let sessions = PinSessions::new(STAFF_PIN.to_string(), None, Duration::hours(1));
    let state = Arc::new(AppState::new(
        service,
        sessions,
        notifier,
        CancellationToken::new(),
    ));
    build_router(state)
}

async fn send_json(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder
        .body(Body::from(body.to_string()))
        .expect("failed to build request");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should answer");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be JSON")
    };
    (status, value)
}

async fn get_json(router: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder.body(Body::empty()).expect("failed to build request");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should answer");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read body")
        .to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn staff_token(router: &Router) -> String {
    let (status, body) = send_json(
        router,
        "POST",
        "/api/login",
        None,
        json!({ "pin": STAFF_PIN }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "staff pin should log in: {body}");
    body["token"].as_str().expect("token in response").to_string()
}

async fn check_in(router: &Router, first_name: &str, last_initial: &str) -> Value {
    let (status, body) = send_json(
        router,
        "POST",
        "/api/checkin",
        None,
        json!({ "first_name": first_name, "last_initial": last_initial }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "check-in should succeed: {body}");
    body
}

#[tokio::test]
async fn kiosk_check_in_requires_no_session_and_reports_the_entry_id() {
    let router = test_router();
    let body = check_in(&router, "Sam", "Quinn").await;
    assert_eq!(body["ok"], json!(true));
    assert!(body["entry_id"].is_string(), "expected an entry id: {body}");
}

#[tokio::test]
async fn malformed_check_in_is_a_bad_request() {
    let router = test_router();
    let (status, body) = send_json(
        &router,
        "POST",
        "/api/checkin",
        None,
        json!({ "first_name": "  ", "last_initial": "Q" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("invalid_input"));
}

#[tokio::test]
async fn staff_commands_without_a_token_are_unauthorized() {
    let router = test_router();
    let (status, body) = send_json(
        &router,
        "POST",
        "/api/queue/call-next",
        None,
        json!({ "barber_id": "p1" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("unauthorized"));
}

#[tokio::test]
async fn wrong_pin_is_rejected() {
    let router = test_router();
    let (status, _) = send_json(&router, "POST", "/api/login", None, json!({ "pin": "0000" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn call_next_flow_surfaces_the_active_call_on_both_read_surfaces() {
    let router = test_router();
    let token = staff_token(&router).await;

    check_in(&router, "Ana", "B").await;
    check_in(&router, "Cal", "D").await;

    let (status, body) = send_json(
        &router,
        "POST",
        "/api/queue/call-next",
        Some(&token),
        json!({ "barber_id": "p1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "call-next should succeed: {body}");

    let (status, queue) = get_json(&router, "/api/queue", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        queue["active_call_id"].is_string(),
        "staff snapshot should expose the active call: {queue}"
    );

    let (status, display) = get_json(&router, "/api/display", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(display["active_call"]["display_name"], json!("Ana B."));
    // The remaining waiting client is in the highlight window.
    assert_eq!(display["highlight"][0]["display_name"], json!("Cal D."));
}

#[tokio::test]
async fn recall_on_an_idle_queue_reports_no_active_call() {
    let router = test_router();
    let token = staff_token(&router).await;

    let (status, body) = send_json(
        &router,
        "POST",
        "/api/queue/recall",
        Some(&token),
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("no_active_call"));
}

#[tokio::test]
async fn staff_snapshot_requires_a_session_but_display_does_not() {
    let router = test_router();

    let (status, _) = get_json(&router, "/api/queue", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, display) = get_json(&router, "/api/display", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(display["visible_count"], json!(10));
}

#[tokio::test]
async fn roster_and_visible_count_are_admin_writable() {
    let router = test_router();
    let token = staff_token(&router).await;

    let (status, _) = send_json(
        &router,
        "PUT",
        "/api/settings/barbers",
        Some(&token),
        json!([
            { "id": "p1", "name": "Pat", "working": true },
            { "id": "p2", "name": "Lou", "working": false }
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(
        &router,
        "PUT",
        "/api/settings/visible-count",
        Some(&token),
        json!({ "visible_count": 6 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, display) = get_json(&router, "/api/display", None).await;
    assert_eq!(display["visible_count"], json!(6));
    assert_eq!(
        display["barber_count"],
        json!(1),
        "only working barbers size the highlight window"
    );
}

#[tokio::test]
async fn duplicate_roster_ids_are_rejected() {
    let router = test_router();
    let token = staff_token(&router).await;

    let (status, body) = send_json(
        &router,
        "PUT",
        "/api/settings/barbers",
        Some(&token),
        json!([
            { "id": "p1", "name": "Pat", "working": true },
            { "id": "p1", "name": "Lou", "working": true }
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn skipping_an_any_barber_entry_is_an_invalid_state() {
    let router = test_router();
    let token = staff_token(&router).await;

    let body = check_in(&router, "Sam", "Q").await;
    let entry_id = body["entry_id"].as_str().expect("entry id").to_string();

    let (status, body) = send_json(
        &router,
        "POST",
        "/api/queue/skip",
        Some(&token),
        json!({ "entry_id": entry_id }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("invalid_state"));
}
