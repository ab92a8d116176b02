use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use serde_json::{json, Value};
use watchtower_domain::model::Network;
use watchtower_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
use watchtower_monitor::{
    ChainBlock, ChainProvider, LogNotifier, MonitorError, ProviderSet, SessionRegistry,
};
use watchtower_storage::JsonlAuditLog;

use crate::handlers::{metrics_handler, session::StopSessionResponse, session_routes};
use crate::state::AppState;

const WATCHED: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

#[derive(Default)]
struct StubChain {
    head: AtomicU64,
    blocks: Mutex<HashMap<u64, ChainBlock>>,
}

#[async_trait]
impl ChainProvider for StubChain {
    async fn current_height(&self) -> Result<u64, MonitorError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn block_with_transactions(
        &self,
        height: u64,
    ) -> Result<Option<ChainBlock>, MonitorError> {
        Ok(self.blocks.lock().unwrap().get(&height).cloned())
    }
}

fn telemetry() -> TelemetryGuard {
    let config = TelemetryConfig::from_env("API_TEST");
    init_telemetry(&config).expect("telemetry inits")
}

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
        "watchtower-api-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

async fn build_state() -> (AppState, Arc<StubChain>) {
    let chain = Arc::new(StubChain::default());
    chain.head.store(500, Ordering::SeqCst);
    let audit = Arc::new(JsonlAuditLog::create(scratch_dir()).await.unwrap());
    let registry = SessionRegistry::new(
        ProviderSet::new().with(Network::Sepolia, chain.clone()),
        Arc::new(LogNotifier),
        audit,
    )
    .with_default_network(Network::Sepolia);
    let state = AppState::new(Arc::new(registry), telemetry(), Duration::from_secs(15));
    (state, chain)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(session_routes)
                .route("/metrics", web::get().to(metrics_handler)),
        )
        .await
    };
}

#[actix_web::test]
async fn starts_lists_and_stops_a_session() {
    let (state, _chain) = build_state().await;
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/sessions")
        .set_json(json!({
            "addresses": [WATCHED, "garbage"],
            "notify_target": "chat-9",
            "min_value": 0.1,
            "polling_interval_secs": 60
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let started: Value = test::read_body_json(resp).await;
    let id = started["session_id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 32);
    assert_eq!(started["network"], "sepolia");
    assert_eq!(started["start_height"], 500);
    assert_eq!(started["addresses"], json!([WATCHED]));

    let req = test::TestRequest::get().uri("/api/v1/sessions").to_request();
    let listed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["min_value"], "0.1");
    assert_eq!(listed[0]["polling_interval_secs"], 60);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/sessions/{id}"))
        .to_request();
    let one: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(one["status"], "active");
    assert_eq!(one["progress"]["last_processed_height"], 500);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/sessions/{id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let stopped: StopSessionResponse = test::read_body_json(resp).await;
    assert_eq!(stopped.session_id, id);
    assert_eq!(stopped.last_processed_height, 500);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/sessions/{id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/sessions/{id}/records"))
        .to_request();
    let records: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(records, json!([]));
}

#[actix_web::test]
async fn start_errors_map_to_statuses() {
    let (state, _chain) = build_state().await;
    let app = app!(state);

    let cases = [
        (json!({"addresses": [], "notify_target": "c"}), StatusCode::BAD_REQUEST),
        (
            json!({"addresses": ["0x1234"], "notify_target": "c"}),
            StatusCode::BAD_REQUEST,
        ),
        (
            json!({"addresses": [WATCHED], "notify_target": "c", "network": "base"}),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (
            json!({"addresses": [WATCHED], "notify_target": "c", "network": "nowhere"}),
            StatusCode::BAD_REQUEST,
        ),
        (
            json!({"addresses": [WATCHED], "notify_target": "c", "min_value": "abc"}),
            StatusCode::BAD_REQUEST,
        ),
        (
            json!({
                "addresses": [WATCHED],
                "notify_target": "c",
                "polling_interval_secs": u64::MAX
            }),
            StatusCode::BAD_REQUEST,
        ),
    ];
    for (body, expected) in cases {
        let req = test::TestRequest::post()
            .uri("/api/v1/sessions")
            .set_json(&body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), expected, "body: {body}");
    }
    assert!(state.registry().is_empty().await);
}

#[actix_web::test]
async fn unknown_session_is_not_found() {
    let (state, _chain) = build_state().await;
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/v1/sessions/00000000000000000000000000000000")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["kind"], "not_found");
}

#[actix_web::test]
async fn metrics_endpoint_renders_prometheus_text() {
    let (state, _chain) = build_state().await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
}
