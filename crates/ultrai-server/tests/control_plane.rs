use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use ultrai_gateway::{ChatCompletion, ChatMessage, Gateway, GatewayError, GatewayResult};
use ultrai_server::{app_router, AppState};
use ultrai_store::ArtifactStore;

/// One model flakes out mid-stream for its first two calls; everything else
/// answers immediately.
struct FlakyGateway {
    flaky_model: &'static str,
    flaky_calls: AtomicUsize,
}

#[async_trait]
impl Gateway for FlakyGateway {
    async fn call(
        &self,
        model: &str,
        _messages: &[ChatMessage],
        _timeout: Duration,
    ) -> GatewayResult<ChatCompletion> {
        if model == self.flaky_model && self.flaky_calls.fetch_add(1, Ordering::SeqCst) < 2 {
            return Err(GatewayError::MidStream(model.to_string()));
        }
        Ok(ChatCompletion {
            text: format!("draft from {model}"),
            finish_reason: "stop".to_string(),
            ms: 4,
        })
    }

    async fn ready_models(&self) -> GatewayResult<Vec<String>> {
        Ok(vec![
            "openai/gpt-4o-mini".to_string(),
            "anthropic/claude-3.5-haiku".to_string(),
            "google/gemini-2.0-flash-001".to_string(),
        ])
    }
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).expect("json body");
    (status, value)
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn flaky_primary_still_delivers_over_http() {
    let dir = TempDir::new().expect("temp dir");
    let store = ArtifactStore::new(dir.path().join("runs"));
    let state = AppState::new(
        store,
        Arc::new(FlakyGateway {
            flaky_model: "openai/gpt-4o-mini",
            flaky_calls: AtomicUsize::new(0),
        }),
    );
    let router = app_router(state);

    let (status, body) = send(
        &router,
        Request::builder()
            .method("POST")
            .uri("/runs")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"query": "compare the drafts", "cocktail": "SPEEDY"}).to_string(),
            ))
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let run_id = body["run_id"].as_str().expect("run id").to_string();

    let mut final_status = Value::Null;
    for _ in 0..300 {
        let (_, status_body) = send(&router, get(&format!("/runs/{run_id}/status"))).await;
        if status_body["completed"] == json!(true) {
            final_status = status_body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(final_status["current_phase"], "DELIVERED");
    assert_eq!(final_status["progress"], 100);

    // The flaky primary was replaced by its positional fallback.
    let (status, initial) = send(
        &router,
        get(&format!("/runs/{run_id}/artifacts/03_initial.json")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = initial.as_array().expect("records");
    assert_eq!(records[0]["model"], "openai/gpt-3.5-turbo");
    assert_eq!(records[0]["error"], false);

    let (_, r1_status) = send(
        &router,
        get(&format!("/runs/{run_id}/artifacts/03_initial_status.json")),
    )
    .await;
    assert!(r1_status["details"]["failed_models"]
        .as_array()
        .expect("failed models")
        .iter()
        .any(|m| m == "openai/gpt-4o-mini"));

    let (_, listing) = send(&router, get(&format!("/runs/{run_id}/artifacts"))).await;
    assert_eq!(listing["files"].as_array().expect("files").len(), 12);

    let (_, delivery) = send(
        &router,
        get(&format!("/runs/{run_id}/artifacts/delivery.json")),
    )
    .await;
    assert_eq!(delivery["status"], "COMPLETED");

    // The run already finished; cancel is a no-op acknowledgement.
    let (status, cancel) = send(
        &router,
        Request::builder()
            .method("POST")
            .uri(format!("/runs/{run_id}/cancel"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancel["status"], "not_running");
}
