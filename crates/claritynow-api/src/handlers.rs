//! API request handlers
//!
//! Every operation handler only enqueues a task and answers `202 Accepted`
//! with the task id; the result is fetched later from the task status route.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use claritynow_common::{JobStatus, Task, TaskEnvelope};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::AuthUser;
use crate::{AppState, BASE_PATH};

const REQUEST_ID_HEADER: &str = "X-REQUEST-ID";

/// Request to create an instance
#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    /// Instance name, unique within the caller's namespace
    pub name: String,

    /// Image version to deploy
    pub image: String,

    /// Network name without the username prefix
    pub network: String,
}

/// Request to delete an instance
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub name: String,
}

/// Request to move an instance to another network
#[derive(Debug, Deserialize)]
pub struct ModifyNetworkRequest {
    pub name: String,

    /// Network name without the username prefix
    pub new_network: String,
}

/// API error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
        }));

        (self.status, body).into_response()
    }
}

impl From<claritynow_common::Error> for ApiError {
    fn from(err: claritynow_common::Error) -> Self {
        error!("Task queue error: {}", err);
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("noId")
}

/// Link to the status of `task_id`
pub fn status_link(vlab_url: &str, task_id: &str) -> String {
    format!("<{}{}/task/{}>; rel=status", vlab_url, BASE_PATH, task_id)
}

/// `202 Accepted` pointing the caller at the task status
fn accepted(state: &AppState, username: &str, task_id: &str, status: Option<JobStatus>) -> Response {
    let mut content = json!({ "task-id": task_id });
    if let Some(status) = status {
        content["status"] = json!(status);
    }

    (
        StatusCode::ACCEPTED,
        [(header::LINK, status_link(&state.vlab_url, task_id))],
        Json(json!({
            "user": username,
            "content": content,
        })),
    )
        .into_response()
}

async fn enqueue(
    state: &AppState,
    user: &AuthUser,
    headers: &HeaderMap,
    task: Task,
) -> Result<Response, ApiError> {
    let task_id = state.queue.submit(&task).await?;

    info!(
        request_id = request_id(headers),
        user = %user.username,
        task = task.name(),
        "Queued task {}",
        task_id
    );

    Ok(accepted(state, &user.username, &task_id, None))
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "claritynow-api",
    }))
}

/// List the caller's instances
pub async fn show_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let task = Task::Show {
        username: user.username.clone(),
    };
    enqueue(&state, &user, &headers, task).await
}

/// Deploy a new instance on one of the caller's networks
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;

    let task = Task::Create {
        username: user.username.clone(),
        machine_name: body.name,
        image: body.image,
        network: format!("{}_{}", user.username, body.network),
    };
    enqueue(&state, &user, &headers, task).await
}

/// Destroy one of the caller's instances
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;

    let task = Task::Delete {
        username: user.username.clone(),
        machine_name: body.name,
    };
    enqueue(&state, &user, &headers, task).await
}

/// Move one of the caller's instances to another of their networks
pub async fn modify_network_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    headers: HeaderMap,
    payload: Result<Json<ModifyNetworkRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;

    let task = Task::ModifyNetwork {
        username: user.username.clone(),
        machine_name: body.name,
        new_network: format!("{}_{}", user.username, body.new_network),
    };
    enqueue(&state, &user, &headers, task).await
}

/// List the image versions that can be deployed
pub async fn image_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    enqueue(&state, &user, &headers, Task::Image).await
}

/// Status, and once finished the result, of a queued task
pub async fn task_status_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = state.queue.job(&task_id).await?.ok_or_else(|| ApiError {
        status: StatusCode::NOT_FOUND,
        message: format!("No task with id {}", task_id),
    })?;

    match job.status {
        JobStatus::Pending | JobStatus::Running => {
            Ok(accepted(&state, &user.username, &job.id, Some(job.status)))
        }
        JobStatus::Completed => {
            let envelope = job.result.unwrap_or_else(TaskEnvelope::empty);
            Ok((StatusCode::OK, Json(envelope)).into_response())
        }
        JobStatus::Failed => {
            let message = job.failure.unwrap_or_else(|| "Task failed".to_string());
            warn!("Task {} failed: {}", job.id, message);
            Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message,
            })
        }
    }
}
