//! End-to-end tests through the HTTP router, over the in-memory store and fake connectors.

use crate::api::models::{ApiResponse, ResponseType};
use crate::auth::API_KEY_HEADER;
use crate::db::memory::InMemoryStore;
use crate::db::models::{PingRecord, Service, ServiceStatus};
use crate::db::store::ServiceStore;
use crate::monitor::BatchSummary;
use crate::ping::PingResult;
use crate::test_utils::{TEST_API_KEY, create_test_app, create_test_app_with_config, create_test_config, service_with_url};
use std::sync::Arc;

const USER_HEADER: &str = "x-user-id";

fn seed(store: &InMemoryStore, url: &str) -> Service {
    let service = service_with_url(url);
    store.insert_service(service.clone());
    service
}

#[test_log::test(tokio::test)]
async fn trigger_requires_the_api_key() {
    let store = Arc::new(InMemoryStore::new());
    let service = seed(&store, "redis://up");
    let (server, _bg) = create_test_app(store.clone()).await;

    let missing = server.post("/api/v1/ping/trigger").await;
    assert_eq!(missing.status_code(), 401);
    let body: ApiResponse<()> = missing.json();
    assert!(!body.success);
    assert_eq!(body.kind, ResponseType::Error);
    assert_eq!(body.title, "Unauthorized");
    assert_eq!(body.message.as_deref(), Some("Invalid API key"));

    let wrong = server.post("/api/v1/ping/trigger").add_header(API_KEY_HEADER, "not-the-key").await;
    assert_eq!(wrong.status_code(), 401);

    // Rejected requests never reach the store
    assert!(store.ping_records(service.id).is_empty());
}

#[tokio::test]
async fn trigger_is_closed_when_no_key_is_configured() {
    let mut config = create_test_config();
    config.trigger.api_key = None;
    let (server, _bg) = create_test_app_with_config(Arc::new(InMemoryStore::new()), config).await;

    let response = server.post("/api/v1/ping/trigger").add_header(API_KEY_HEADER, TEST_API_KEY).await;
    assert_eq!(response.status_code(), 401);
}

#[test_log::test(tokio::test)]
async fn trigger_pings_due_services_and_reschedules_them() {
    let store = Arc::new(InMemoryStore::new());
    let up = seed(&store, "redis://up");
    let down = seed(&store, "mongodb://down");
    let (server, _bg) = create_test_app(store.clone()).await;

    let response = server.post("/api/v1/ping/trigger").add_header(API_KEY_HEADER, TEST_API_KEY).await;
    assert_eq!(response.status_code(), 200);
    let body: ApiResponse<BatchSummary> = response.json();
    assert!(body.success);
    assert_eq!(body.kind, ResponseType::Success);
    assert_eq!(body.title, "Ping processing complete");
    assert_eq!(body.data, Some(BatchSummary { successful: 1, failed: 1, total: 2 }));

    let up = store.find_service(up.id).await.unwrap().unwrap();
    assert_eq!(up.status, ServiceStatus::Online);
    // First check of a fresh service leaves its uptime where it was
    assert_eq!(up.uptime_percentage, 0.0);
    assert!(up.next_scheduled_check.is_some());

    let down = store.find_service(down.id).await.unwrap().unwrap();
    assert_eq!(down.status, ServiceStatus::Offline);
    assert_eq!(down.consecutive_failures, 1);
    assert_eq!(store.ping_records(down.id)[0].error_message.as_deref(), Some("Connection failed: connection refused"));

    // Both are now scheduled into the future
    let again = server.post("/api/v1/ping/trigger").add_header(API_KEY_HEADER, TEST_API_KEY).await;
    let body: ApiResponse<BatchSummary> = again.json();
    assert_eq!(body.kind, ResponseType::Info);
    assert_eq!(body.title, "No services to ping");
    assert_eq!(body.data, Some(BatchSummary::default()));
}

#[tokio::test]
async fn trigger_honours_batch_size_and_protocol() {
    let store = Arc::new(InMemoryStore::new());
    for url in ["redis://up", "redis://up", "redis://up", "postgres://up"] {
        seed(&store, url);
    }
    let (server, _bg) = create_test_app(store).await;

    let postgres = server
        .post("/api/v1/ping/trigger")
        .add_header(API_KEY_HEADER, TEST_API_KEY)
        .add_query_param("protocol", "postgres")
        .await;
    let body: ApiResponse<BatchSummary> = postgres.json();
    assert_eq!(body.data.map(|s| s.total), Some(1));

    let two = server
        .post("/api/v1/ping/trigger")
        .add_header(API_KEY_HEADER, TEST_API_KEY)
        .add_query_param("batchSize", 2)
        .await;
    let body: ApiResponse<BatchSummary> = two.json();
    assert_eq!(body.data.map(|s| s.total), Some(2));

    let rest = server.post("/api/v1/ping/trigger").add_header(API_KEY_HEADER, TEST_API_KEY).await;
    let body: ApiResponse<BatchSummary> = rest.json();
    assert_eq!(body.data.map(|s| s.total), Some(1));
}

#[tokio::test]
async fn trigger_rejects_bad_parameters() {
    let (server, _bg) = create_test_app(Arc::new(InMemoryStore::new())).await;

    for (name, value) in [
        ("batchSize", "0"),
        ("batchSize", "501"),
        ("batchSize", "ten"),
        ("protocol", "mysql"),
    ] {
        let response = server
            .post("/api/v1/ping/trigger")
            .add_header(API_KEY_HEADER, TEST_API_KEY)
            .add_query_param(name, value)
            .await;
        assert_eq!(response.status_code(), 400, "{name}={value}");
        let body: ApiResponse<()> = response.json();
        assert!(!body.success);
        assert_eq!(body.kind, ResponseType::Error);
    }
}

#[tokio::test]
async fn user_routes_require_identity() {
    let store = Arc::new(InMemoryStore::new());
    let service = seed(&store, "redis://up");
    let (server, _bg) = create_test_app(store).await;

    let anonymous = server.post(&format!("/api/v1/services/{}/ping", service.id)).await;
    assert_eq!(anonymous.status_code(), 401);

    let garbled = server
        .post(&format!("/api/v1/services/{}/ping", service.id))
        .add_header(USER_HEADER, "not-a-uuid")
        .await;
    assert_eq!(garbled.status_code(), 401);
}

#[test_log::test(tokio::test)]
async fn users_ping_and_read_only_their_own_services() {
    let store = Arc::new(InMemoryStore::new());
    let mine = seed(&store, "redis://up");
    let theirs = seed(&store, "redis://up");
    let (server, _bg) = create_test_app(store.clone()).await;
    let me = mine.user_id.to_string();

    let response = server
        .post(&format!("/api/v1/services/{}/ping", mine.id))
        .add_header(USER_HEADER, me.as_str())
        .await;
    assert_eq!(response.status_code(), 200);
    let body: ApiResponse<PingResult> = response.json();
    assert_eq!(body.kind, ResponseType::Success);
    assert_eq!(body.title, "Service is online");
    let result = body.data.unwrap();
    assert!(result.successful);
    assert_eq!(result.service_id, mine.id);

    let forbidden = server
        .post(&format!("/api/v1/services/{}/ping", theirs.id))
        .add_header(USER_HEADER, me.as_str())
        .await;
    assert_eq!(forbidden.status_code(), 404);
    let body: ApiResponse<()> = forbidden.json();
    assert_eq!(body.title, "Service not found");
    assert!(store.ping_records(theirs.id).is_empty());

    let history = server
        .get(&format!("/api/v1/services/{}/pings", mine.id))
        .add_header(USER_HEADER, me.as_str())
        .await;
    assert_eq!(history.status_code(), 200);
    let body: ApiResponse<Vec<PingRecord>> = history.json();
    let records = body.data.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].successful);

    let their_history = server
        .get(&format!("/api/v1/services/{}/pings", theirs.id))
        .add_header(USER_HEADER, me.as_str())
        .await;
    assert_eq!(their_history.status_code(), 404);
}

#[tokio::test]
async fn unreachable_service_is_reported_not_failed() {
    let store = Arc::new(InMemoryStore::new());
    let service = seed(&store, "postgres://down");
    let (server, _bg) = create_test_app(store).await;

    let response = server
        .post(&format!("/api/v1/services/{}/ping", service.id))
        .add_header(USER_HEADER, service.user_id.to_string().as_str())
        .await;

    assert_eq!(response.status_code(), 200);
    let body: ApiResponse<PingResult> = response.json();
    assert!(body.success);
    assert_eq!(body.kind, ResponseType::Info);
    assert_eq!(body.title, "Service is offline");
    assert_eq!(body.message.as_deref(), Some("Connection failed: connection refused"));
    assert!(!body.data.unwrap().successful);
}

#[tokio::test]
async fn repeated_failures_disable_the_service_once() {
    let store = Arc::new(InMemoryStore::new());
    let mut service = service_with_url("redis://down");
    service.disabled_on_consecutive_failure = true;
    service.failures_threshold = 2;
    store.insert_service(service.clone());
    let (server, _bg) = create_test_app(store.clone()).await;
    let owner = service.user_id.to_string();

    for _ in 0..3 {
        server
            .post(&format!("/api/v1/services/{}/ping", service.id))
            .add_header(USER_HEADER, owner.as_str())
            .await
            .assert_status_ok();
    }

    let stored = store.find_service(service.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ServiceStatus::Disabled);
    assert_eq!(stored.consecutive_failures, 3);
    assert_eq!(stored.uptime_percentage, 0.0);

    let logs = store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action_type, "AUTO_DISABLE");
    assert_eq!(logs[0].message, "Service automatically disabled after 2 consecutive failures");
}

#[tokio::test]
async fn users_ping_all_their_services() {
    let store = Arc::new(InMemoryStore::new());
    let first = seed(&store, "redis://up");
    let mut second = service_with_url("mongodb://down");
    second.user_id = first.user_id;
    store.insert_service(second);
    seed(&store, "redis://up");
    let (server, _bg) = create_test_app(store).await;
    let owner = first.user_id.to_string();

    let all = server.post("/api/v1/services/ping").add_header(USER_HEADER, owner.as_str()).await;
    assert_eq!(all.status_code(), 200);
    let body: ApiResponse<BatchSummary> = all.json();
    assert_eq!(body.data, Some(BatchSummary { successful: 1, failed: 1, total: 2 }));

    let postgres = server
        .post("/api/v1/services/ping")
        .add_header(USER_HEADER, owner.as_str())
        .add_query_param("protocol", "postgres")
        .await;
    let body: ApiResponse<BatchSummary> = postgres.json();
    assert_eq!(body.kind, ResponseType::Info);
    assert_eq!(body.title, "No services found");
}

#[tokio::test]
async fn history_limit_is_validated() {
    let store = Arc::new(InMemoryStore::new());
    let service = seed(&store, "redis://up");
    let (server, _bg) = create_test_app(store).await;

    let response = server
        .get(&format!("/api/v1/services/{}/pings", service.id))
        .add_header(USER_HEADER, service.user_id.to_string().as_str())
        .add_query_param("limit", 0)
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn health_reports_leadership() {
    let (server, bg) = create_test_app(Arc::new(InMemoryStore::new())).await;

    let response = server.get("/healthz").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["leader"], false);
    assert!(!bg.is_leader());
}

#[tokio::test(start_paused = true)]
async fn scheduler_runs_as_leader_without_a_database() {
    let store = Arc::new(InMemoryStore::new());
    let service = seed(&store, "redis://up");
    let mut config = create_test_config();
    config.scheduler.enabled = true;

    let (_server, bg) = create_test_app_with_config(store.clone(), config).await;
    assert!(bg.is_leader());

    // The first tick fires straight away
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(store.ping_records(service.id).len(), 1);

    bg.shutdown().await;
}
