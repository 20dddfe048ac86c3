use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use ultrai_core::{EngineError, RunRequest};
use ultrai_store::StoreError;
use ultrai_types::{RunId, ARTIFACT_STATUS, KNOWN_ARTIFACTS};

use crate::AppState;

#[derive(Debug, Deserialize)]
struct StartRunInput {
    query: String,
    cocktail: String,
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("ultrai control plane listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/runs", post(start_run))
        .route("/runs/{run_id}/status", get(run_status))
        .route("/runs/{run_id}/artifacts", get(list_artifacts))
        .route("/runs/{run_id}/artifacts/{name}", get(get_artifact))
        .route("/runs/{run_id}/cancel", post(cancel_run))
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Creates the run directory and its initial `status.json` synchronously,
/// then hands the run to a background task. Status polling is well-formed as
/// soon as this returns.
async fn start_run(
    State(state): State<AppState>,
    Json(input): Json<StartRunInput>,
) -> impl IntoResponse {
    let run_id = RunId::api_now(&input.cocktail);
    let request = RunRequest {
        run_id: run_id.clone(),
        query: input.query,
        cocktail: input.cocktail,
    };

    let handle = match state.coordinator.prepare_run(&request).await {
        Ok(handle) => handle,
        Err(err) => return engine_error_response(err),
    };

    state
        .active_runs
        .write()
        .await
        .insert(run_id.to_string(), handle.clone());

    let task_state = state.clone();
    tokio::spawn(async move {
        if let Err(err) = task_state.coordinator.execute(&request, &handle).await {
            error!(run_id = %request.run_id, error = %err, "run failed");
        }
        task_state
            .active_runs
            .write()
            .await
            .remove(request.run_id.as_str());
    });

    (StatusCode::OK, Json(json!({"run_id": run_id.to_string()})))
}

async fn run_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    let store = state.coordinator.store();
    let mut status = match store.read(&run_id, ARTIFACT_STATUS).await {
        Ok(value) => value,
        Err(err) => return store_error_response(err),
    };

    // Overlay the live step table for in-flight runs; the artifact alone is
    // only current as of the last phase transition.
    if let Some(handle) = state.active_runs.read().await.get(&run_id) {
        let (steps, progress) = handle.board.snapshot();
        if let Ok(steps) = serde_json::to_value(steps) {
            status["steps"] = steps;
        }
        status["progress"] = json!(progress);
    }

    let artifact_count = store
        .list(&run_id)
        .await
        .map(|files| files.len())
        .unwrap_or(0);
    status["artifact_count"] = json!(artifact_count);
    (StatusCode::OK, Json(status))
}

async fn list_artifacts(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.store().list(&run_id).await {
        Ok(files) => (
            StatusCode::OK,
            Json(json!({"run_id": run_id, "files": files})),
        ),
        Err(err) => store_error_response(err),
    }
}

async fn get_artifact(
    State(state): State<AppState>,
    Path((run_id, name)): Path<(String, String)>,
) -> impl IntoResponse {
    if !KNOWN_ARTIFACTS.contains(&name.as_str()) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"name": "UnknownArtifact", "message": format!("{name:?} is not a run artifact")}})),
        );
    }
    match state.coordinator.store().read(&run_id, &name).await {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(err) => store_error_response(err),
    }
}

async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    if let Some(handle) = state.active_runs.read().await.get(&run_id) {
        handle.cancel.cancel();
        return (
            StatusCode::ACCEPTED,
            Json(json!({"run_id": run_id, "status": "cancelling"})),
        );
    }
    match state.coordinator.store().run_exists(&run_id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({"run_id": run_id, "status": "not_running"})),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"name": "NotFound", "message": format!("no run {run_id:?}")}})),
        ),
        Err(err) => store_error_response(err),
    }
}

fn engine_error_response(err: EngineError) -> (StatusCode, Json<Value>) {
    let status = match err {
        EngineError::BadRunId(_) | EngineError::UserInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({"error": {"name": err.name(), "message": err.to_string()}})),
    )
}

fn store_error_response(err: StoreError) -> (StatusCode, Json<Value>) {
    let (status, name) = match &err {
        StoreError::BadRunId(_) => (StatusCode::BAD_REQUEST, "BadRunID"),
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
        StoreError::CorruptArtifact { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "CorruptArtifact"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "ArtifactError"),
    };
    (
        status,
        Json(json!({"error": {"name": name, "message": err.to_string()}})),
    )
}
