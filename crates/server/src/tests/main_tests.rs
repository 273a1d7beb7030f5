use super::*;
use axum::{body, body::Body, http::Request, response::Response};
use serde_json::{json, Value};
use shared::domain::NetStatus;
use tower::ServiceExt;

async fn test_app() -> (Router, Storage) {
    test_app_with_sessions(SessionRegistry::new(Duration::from_secs(1800), 100)).await
}

async fn test_app_with_sessions(sessions: SessionRegistry) -> (Router, Storage) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let state = AppState {
        api: ApiContext {
            storage: storage.clone(),
        },
        sessions,
    };
    (build_router(Arc::new(state), 16 * 1024), storage)
}

async fn json_body(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> Response {
    let payload = payload.to_string();
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .header("content-length", payload.len())
        .body(Body::from(payload))
        .expect("request");
    app.clone().oneshot(request).await.expect("response")
}

async fn open_session(app: &Router) -> String {
    let request = Request::post("/sessions")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await["session_id"]
        .as_str()
        .expect("session id")
        .to_string()
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _storage) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn report_claim_and_recover_through_routes() {
    let (app, storage) = test_app().await;
    let session_id = open_session(&app).await;

    let response = post_json(
        &app,
        &format!("/sessions/{session_id}/report"),
        json!({
            "gps_coordinates": "54.3, 10.1",
            "estimated_size": "15m",
            "anonymous": false,
            "reporter": { "name": "Ole", "phone_prefix": "+49", "phone_number": "112233" }
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "confirmation");

    let request = Request::get("/nets/open")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let open: Vec<NetSummary> =
        serde_json::from_value(json_body(response).await).expect("nets");
    assert_eq!(open.len(), 1);
    let net_id = open[0].net_id;
    assert!(open[0].reporter_id.is_some());

    let response = post_json(
        &app,
        &format!("/sessions/{session_id}/claims/prepare"),
        json!({ "net_id": net_id }),
    )
    .await;
    assert_eq!(json_body(response).await["outcome"], "claim");

    let response = post_json(
        &app,
        &format!("/sessions/{session_id}/claims/confirm"),
        json!({ "salvager": { "name": "Bergungsteam Kiel" } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "dashboard");

    let request = Request::post(format!("/sessions/{session_id}/nets/{net_id}/recovered"))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["outcome"].is_null());
    assert_eq!(body["messages"][0]["summary"], "Erfolgreich!");

    let net = storage
        .load_net(net_id)
        .await
        .expect("load")
        .expect("exists");
    assert_eq!(net.status, NetStatus::Recovered);
}

#[tokio::test]
async fn duplicate_coordinates_yield_one_map_marker() {
    let (app, _storage) = test_app().await;
    let session_id = open_session(&app).await;
    for size in ["a", "b"] {
        let response = post_json(
            &app,
            &format!("/sessions/{session_id}/report"),
            json!({ "gps_coordinates": "54.3, 10.1", "estimated_size": size }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = post_json(
        &app,
        &format!("/sessions/{session_id}/report"),
        json!({ "gps_coordinates": "unknown", "estimated_size": "c" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::get("/nets/map")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let markers: Vec<MapMarker> =
        serde_json::from_value(json_body(response).await).expect("markers");
    assert_eq!(markers.len(), 1);
    assert_eq!((markers[0].lat, markers[0].lng), (54.3, 10.1));
}

#[tokio::test]
async fn recovering_reported_net_returns_conflict() {
    let (app, storage) = test_app().await;
    let session_id = open_session(&app).await;
    post_json(
        &app,
        &format!("/sessions/{session_id}/report"),
        json!({ "gps_coordinates": "1.0 2.0" }),
    )
    .await;
    let net_id = storage.list_nets().await.expect("nets")[0].net_id;

    let request = Request::post(format!("/sessions/{session_id}/nets/{net_id}/recovered"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "conflict");
}

#[tokio::test]
async fn blank_report_is_a_bad_request() {
    let (app, _storage) = test_app().await;
    let session_id = open_session(&app).await;
    let response = post_json(
        &app,
        &format!("/sessions/{session_id}/report"),
        json!({ "gps_coordinates": "", "estimated_size": "1m" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn role_home_and_snapshot_reflect_session_state() {
    let (app, _storage) = test_app().await;
    let session_id = open_session(&app).await;

    let response = post_json(
        &app,
        &format!("/sessions/{session_id}/role"),
        json!({ "role": "salvager" }),
    )
    .await;
    assert_eq!(json_body(response).await["outcome"], "index");

    let request = Request::post(format!("/sessions/{session_id}/home"))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(json_body(response).await["outcome"], "index");

    let request = Request::get(format!("/sessions/{session_id}"))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let snapshot: SessionSnapshot =
        serde_json::from_value(json_body(response).await).expect("snapshot");
    assert_eq!(snapshot.user_role, Some(shared::domain::UserRole::Salvager));
    assert!(snapshot.anonymous);
}

#[tokio::test]
async fn unknown_and_ended_sessions_are_not_found() {
    let (app, _storage) = test_app().await;
    let request = Request::get(format!("/sessions/{}", Uuid::new_v4()))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let session_id = open_session(&app).await;
    let request = Request::delete(format!("/sessions/{session_id}"))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let request = Request::get(format!("/sessions/{session_id}/messages"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn claim_of_missing_net_warns_and_drains_once() {
    let (app, storage) = test_app().await;
    let session_id = open_session(&app).await;
    post_json(
        &app,
        &format!("/sessions/{session_id}/claims/prepare"),
        json!({ "net_id": 999 }),
    )
    .await;
    let response = post_json(
        &app,
        &format!("/sessions/{session_id}/claims/confirm"),
        json!({ "salvager": { "name": "Solo" } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["outcome"], "dashboard");
    assert_eq!(body["messages"][0]["severity"], "warn");
    assert_eq!(storage.count_persons().await.expect("count"), 1);

    let request = Request::get(format!("/sessions/{session_id}/messages"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    let messages: Vec<Notice> =
        serde_json::from_value(json_body(response).await).expect("messages");
    assert!(messages.is_empty());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (app, _storage) = test_app().await;
    let session_id = open_session(&app).await;
    let response = post_json(
        &app,
        &format!("/sessions/{session_id}/report"),
        json!({ "gps_coordinates": "1 2", "estimated_size": "x".repeat(32 * 1024) }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn session_limit_returns_service_unavailable() {
    let sessions = SessionRegistry::new(Duration::from_secs(1800), 1);
    let (app, _storage) = test_app_with_sessions(sessions).await;
    open_session(&app).await;

    let request = Request::post("/sessions")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
