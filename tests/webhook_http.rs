use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

use identity_sync::http_server::{
    self, ServerState, EVENT_ID_HEADER, HEALTH_PATH, SIGNATURE_HEADER, TIMESTAMP_HEADER,
    WEBHOOK_PATH,
};
use identity_sync::{
    InMemoryUserStore, SignatureVerifier, SqliteUserStore, UserStore, WebhookPipeline,
    WebhookSecret,
};

const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
const MAX_BODY: usize = 64 * 1024;

fn app(store: Arc<dyn UserStore>) -> Router {
    let verifier = SignatureVerifier::new(&WebhookSecret::new(SECRET));
    let pipeline = Arc::new(WebhookPipeline::new(verifier, store));
    http_server::router(ServerState::new(pipeline), MAX_BODY)
}

fn sign(msg_id: &str, timestamp: &str, body: &[u8]) -> String {
    let key = WebhookSecret::new(SECRET).signing_key().unwrap();
    let mut mac = Hmac::<Sha256>::new_from_slice(&key).unwrap();
    mac.update(format!("{msg_id}.{timestamp}.").as_bytes());
    mac.update(body);
    let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    format!("v1,{sig}")
}

fn signed_request(msg_id: &str, body: &Value) -> Request<Body> {
    let raw = serde_json::to_vec(body).unwrap();
    let ts = Utc::now().timestamp().to_string();
    Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json")
        .header(EVENT_ID_HEADER, msg_id)
        .header(TIMESTAMP_HEADER, &ts)
        .header(SIGNATURE_HEADER, sign(msg_id, &ts, &raw))
        .body(Body::from(raw))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn user_created(subject_id: &str, last_name: &str) -> Value {
    json!({
        "type": "user.created",
        "object": "event",
        "data": {
            "id": subject_id,
            "first_name": "Ada",
            "last_name": last_name,
            "profile_image_url": "https://img.example/ada.png",
            "primary_email_address_id": "e1",
            "email_addresses": [
                {
                    "id": "e1",
                    "email_address": "a@x.com",
                    "verification": { "status": "verified" }
                }
            ]
        }
    })
}

#[tokio::test]
async fn scenario_a_created_user_is_applied() {
    let store = Arc::new(InMemoryUserStore::new());
    let app = app(store.clone());

    let (status, body) = send(&app, signed_request("msg_a", &user_created("ext_1", "Lovelace"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "success" }));

    let record = store.find_by_external_id("ext_1").await.unwrap().unwrap();
    assert_eq!(record.email, "a@x.com");
    assert!(record.email_verified);
    assert!(record.account_enabled);
    assert_eq!(record.photo_url.as_deref(), Some("https://img.example/ada.png"));
}

#[tokio::test]
async fn scenario_b_replay_updates_same_record() {
    let store = Arc::new(InMemoryUserStore::new());
    let app = app(store.clone());

    send(&app, signed_request("msg_a", &user_created("ext_1", "Lovelace"))).await;
    let original = store.find_by_external_id("ext_1").await.unwrap().unwrap();

    let (status, _) = send(&app, signed_request("msg_b", &user_created("ext_1", "Byron"))).await;
    assert_eq!(status, StatusCode::OK);

    let updated = store.find_by_external_id("ext_1").await.unwrap().unwrap();
    assert_eq!(updated.id, original.id);
    assert_eq!(updated.last_name, "Byron");
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn scenario_c_no_email_is_ignored() {
    let store = Arc::new(InMemoryUserStore::new());
    let app = app(store.clone());

    let event = json!({ "type": "user.created", "data": { "id": "ext_2", "email_addresses": [] } });
    let (status, body) = send(&app, signed_request("msg_c", &event)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn scenario_d_delete_is_soft() {
    let store = Arc::new(InMemoryUserStore::new());
    let app = app(store.clone());

    send(&app, signed_request("msg_a", &user_created("ext_1", "Lovelace"))).await;
    let event = json!({ "type": "user.deleted", "data": { "id": "ext_1", "deleted": true } });
    let (status, body) = send(&app, signed_request("msg_d", &event)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "deleted");

    let record = store.find_by_external_id("ext_1").await.unwrap().unwrap();
    assert!(!record.account_enabled);
    assert!(record.deleted_at.is_some());
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn scenario_e_missing_timestamp_is_unauthorized() {
    let store = Arc::new(InMemoryUserStore::new());
    let app = app(store.clone());

    let raw = serde_json::to_vec(&user_created("ext_1", "Lovelace")).unwrap();
    let ts = Utc::now().timestamp().to_string();
    let request = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(EVENT_ID_HEADER, "msg_e")
        .header(SIGNATURE_HEADER, sign("msg_e", &ts, &raw))
        .body(Body::from(raw))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Invalid signature" }));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn tampered_body_is_unauthorized() {
    let app = app(Arc::new(InMemoryUserStore::new()));
    let raw = serde_json::to_vec(&user_created("ext_1", "Lovelace")).unwrap();
    let ts = Utc::now().timestamp().to_string();
    let signature = sign("msg_t", &ts, &raw);

    let tampered = serde_json::to_vec(&user_created("ext_666", "Lovelace")).unwrap();
    let request = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(EVENT_ID_HEADER, "msg_t")
        .header(TIMESTAMP_HEADER, &ts)
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(tampered))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stale_timestamp_is_unauthorized() {
    let app = app(Arc::new(InMemoryUserStore::new()));
    let raw = serde_json::to_vec(&user_created("ext_1", "Lovelace")).unwrap();
    let ts = (Utc::now().timestamp() - 600).to_string();
    let request = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(EVENT_ID_HEADER, "msg_s")
        .header(TIMESTAMP_HEADER, &ts)
        .header(SIGNATURE_HEADER, sign("msg_s", &ts, &raw))
        .body(Body::from(raw))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authentic_but_malformed_is_bad_request() {
    let app = app(Arc::new(InMemoryUserStore::new()));
    let (status, body) = send(&app, signed_request("msg_m", &json!({ "data": {} }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Malformed payload" }));
}

#[tokio::test]
async fn unknown_event_type_is_ok() {
    let app = app(Arc::new(InMemoryUserStore::new()));
    let event = json!({ "type": "organization.created", "data": { "id": "org_1" } });
    let (status, body) = send(&app, signed_request("msg_u", &event)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reason"], "unhandled event type");
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let app = app(Arc::new(InMemoryUserStore::new()));
    let padding = "x".repeat(MAX_BODY + 1);
    let event = json!({ "type": "user.created", "data": { "id": "ext_1", "pad": padding } });
    let (status, _) = send(&app, signed_request("msg_big", &event)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn sqlite_backed_sync_end_to_end() {
    let store = SqliteUserStore::connect("sqlite::memory:", 1).await.unwrap();
    store.migrate().await.unwrap();
    let store = Arc::new(store);
    let app = app(store.clone());

    send(&app, signed_request("msg_1", &user_created("ext_1", "Lovelace"))).await;
    send(&app, signed_request("msg_1", &user_created("ext_1", "Lovelace"))).await;
    let (status, _) = send(&app, signed_request("msg_2", &user_created("ext_1", "Byron"))).await;
    assert_eq!(status, StatusCode::OK);

    let record = store.find_by_external_id("ext_1").await.unwrap().unwrap();
    assert_eq!(record.last_name, "Byron");
    assert_eq!(store.find_by_email("a@x.com").await.unwrap().map(|r| r.id), Some(record.id));

    let event = json!({ "type": "user.deleted", "data": { "id": "ext_1" } });
    send(&app, signed_request("msg_3", &event)).await;
    let record = store.find_by_external_id("ext_1").await.unwrap().unwrap();
    assert!(!record.account_enabled);
}

#[tokio::test]
async fn health_is_served_under_api_prefix() {
    assert_eq!(HEALTH_PATH, "/api/v1/health");
    let app = app(Arc::new(InMemoryUserStore::new()));
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_up() {
    let app = app(Arc::new(InMemoryUserStore::new()));
    let request = Request::builder()
        .uri(HEALTH_PATH)
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok(), "{timestamp}");
}

#[tokio::test]
async fn health_reports_down_when_pool_closed() {
    let store = SqliteUserStore::connect("sqlite::memory:", 1).await.unwrap();
    store.db_pool.close().await;
    let app = app(Arc::new(store));

    let request = Request::builder()
        .uri(HEALTH_PATH)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "DOWN");
    assert!(body["timestamp"].is_string());
}
