//! Reference HTTP transport over the Scheduler Façade (`spec.md` §6).
//!
//! A thin axum binding: the façade is the actual API, this module only
//! translates JSON requests/responses and maps [`SchedulerError`] variants
//! to status codes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;

use taskforge_core::error::SchedulerError;
use taskforge_core::facade::{SchedulerFacade, SubmitRequest};
use taskforge_db::models::{Task, TaskStatus};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError(SchedulerError);

impl From<SchedulerError> for AppError {
    fn from(err: SchedulerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            SchedulerError::NotFound(_) => StatusCode::NOT_FOUND,
            SchedulerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SchedulerError::IllegalTransition { .. } => StatusCode::BAD_REQUEST,
            SchedulerError::StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SchedulerError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request/response DTOs
// ---------------------------------------------------------------------------

/// The wire-shape task record (`spec.md` §6): the `Task` row's own fields
/// (already `#[serde(rename)]`d onto the documented names) plus
/// `dependencies`, which lives in a separate join table.
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: Task,
    pub dependencies: Vec<i64>,
}

async fn to_task_response(
    facade: &SchedulerFacade,
    task: Task,
) -> Result<TaskResponse, SchedulerError> {
    let dependencies = facade.dependencies(task.id).await?;
    Ok(TaskResponse { task, dependencies })
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: String,
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Serialize)]
pub struct WorkerHeartbeatResponse {
    pub status: &'static str,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(facade: Arc<SchedulerFacade>) -> Router {
    Router::new()
        .route("/tasks", post(submit_task).get(list_tasks))
        .route("/tasks/next", get(next_task))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/transition", post(transition_task))
        .route("/workers/heartbeat", post(worker_heartbeat))
        .route("/workers", get(list_workers))
        .layer(CorsLayer::permissive())
        .with_state(facade)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(pool: PgPool, bind: &str, port: u16) -> Result<()> {
    let facade = Arc::new(SchedulerFacade::new(pool));

    let reconciled = facade.reconcile().await?;
    tracing::info!(reconciled, "startup reconciliation sweep complete");

    let app = build_router(facade);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("taskforge serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("taskforge serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn submit_task(
    State(facade): State<Arc<SchedulerFacade>>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let task = facade.submit(req).await?;
    let response = to_task_response(&facade, task).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_tasks(
    State(facade): State<Arc<SchedulerFacade>>,
) -> Result<impl IntoResponse, AppError> {
    let tasks = facade.list().await?;
    let mut responses = Vec::with_capacity(tasks.len());
    for task in tasks {
        responses.push(to_task_response(&facade, task).await?);
    }
    Ok(Json(responses))
}

async fn get_task(
    State(facade): State<Arc<SchedulerFacade>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let task = facade.get(id).await?;
    let response = to_task_response(&facade, task).await?;
    Ok(Json(response))
}

async fn next_task(
    State(facade): State<Arc<SchedulerFacade>>,
    Query(params): Query<NextQuery>,
) -> Result<axum::response::Response, AppError> {
    match facade.next(Duration::from_millis(params.timeout_ms)).await? {
        Some(task) => {
            let response = to_task_response(&facade, task).await?;
            Ok(Json(response).into_response())
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn transition_task(
    State(facade): State<Arc<SchedulerFacade>>,
    Path(id): Path<i64>,
    Json(req): Json<TransitionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let to: TaskStatus = req
        .status
        .parse()
        .map_err(|e: taskforge_db::models::TaskStatusParseError| {
            AppError(SchedulerError::InvalidInput(e.to_string()))
        })?;
    let outcome = facade
        .transition(id, to, req.error_message.as_deref())
        .await?;
    let response = to_task_response(&facade, outcome.task).await?;
    Ok(Json(response))
}

async fn worker_heartbeat(
    State(facade): State<Arc<SchedulerFacade>>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse, AppError> {
    facade.heartbeat(&req.worker_id)?;
    Ok(Json(WorkerHeartbeatResponse { status: "ok" }))
}

async fn list_workers(
    State(facade): State<Arc<SchedulerFacade>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(facade.list_live_workers()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use taskforge_test_utils::{create_test_db, drop_test_db};

    use super::*;

    async fn send_json(
        facade: Arc<SchedulerFacade>,
        method: &str,
        uri: &str,
        body: serde_json::Value,
    ) -> axum::response::Response {
        let app = super::build_router(facade);
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn send(facade: Arc<SchedulerFacade>, uri: &str) -> axum::response::Response {
        let app = super::build_router(facade);
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn submit_then_list_roundtrips() {
        let (pool, db_name) = create_test_db().await;
        let facade = Arc::new(SchedulerFacade::new(pool));

        let resp = send_json(
            facade.clone(),
            "POST",
            "/tasks",
            serde_json::json!({"type": "send_email", "data": {"to": "x"}}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = send(facade, "/tasks").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json.as_array().unwrap().len(), 1);

        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn submit_response_matches_documented_wire_shape() {
        let (pool, db_name) = create_test_db().await;
        let facade = Arc::new(SchedulerFacade::new(pool));

        let resp = send_json(
            facade,
            "POST",
            "/tasks",
            serde_json::json!({"type": "send_email", "data": {"to": "x"}}),
        )
        .await;
        let json = body_json(resp).await;

        for field in [
            "id", "type", "data", "status", "priority", "dependencies", "retry_count",
            "max_retries", "error_message", "created_at", "started_at", "completed_at",
        ] {
            assert!(json.get(field).is_some(), "missing wire field {field}");
        }
        assert!(json.get("task_type").is_none(), "internal field name leaked");
        assert!(json.get("attempt_count").is_none(), "internal field name leaked");
        assert_eq!(json["type"], "send_email");
        assert_eq!(json["dependencies"], serde_json::json!([]));

        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn get_unknown_task_is_404() {
        let (pool, db_name) = create_test_db().await;
        let facade = Arc::new(SchedulerFacade::new(pool));

        let resp = send(facade, "/tasks/999999").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn submit_with_unknown_dependency_is_400() {
        let (pool, db_name) = create_test_db().await;
        let facade = Arc::new(SchedulerFacade::new(pool));

        let resp = send_json(
            facade,
            "POST",
            "/tasks",
            serde_json::json!({"type": "x", "data": {}, "dependencies": [999999]}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn next_times_out_as_204() {
        let (pool, db_name) = create_test_db().await;
        let facade = Arc::new(SchedulerFacade::new(pool));

        let resp = send(facade, "/tasks/next?timeout_ms=20").await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn heartbeat_then_list_workers() {
        let (pool, db_name) = create_test_db().await;
        let facade = Arc::new(SchedulerFacade::new(pool));

        let resp = send_json(
            facade.clone(),
            "POST",
            "/workers/heartbeat",
            serde_json::json!({"worker_id": "w1"}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(facade, "/workers").await;
        let json = body_json(resp).await;
        assert_eq!(json.as_array().unwrap().len(), 1);

        drop_test_db(&db_name).await;
    }
}
