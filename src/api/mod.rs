use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{patch, post};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::db::repository;
use crate::error::AppError;
use crate::models::*;
use crate::session::{AuthToken, SessionProvider};
use crate::state::AppState;
use crate::sync::{SyncReport, SyncStatus};

#[derive(Deserialize)]
struct TaskQueryParams {
    #[serde(default)]
    include_deleted: bool,
    #[serde(default)]
    q: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    owner_id: i64,
    token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncStatusResponse {
    status: SyncStatus,
    last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LatestTimeResponse {
    latest_time: DateTime<Utc>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/tasks/{id}/complete", patch(complete_task))
        .route("/tasks/{id}/uncomplete", patch(uncomplete_task))
        .route("/session", post(login).delete(logout))
        .route("/sync", post(sync_now))
        .route("/sync/status", get(sync_status))
        .route("/sync/latest", get(remote_latest))
        .with_state(state)
}

async fn current_owner(state: &AppState) -> Result<OwnerId, AppError> {
    state
        .session
        .current_owner_id()
        .await
        .ok_or(AppError::Unauthorized)
}

fn parse_task_id(raw: &str) -> Result<TaskId, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid task id: {}", raw)))
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1")
        .execute(&state.db)
        .await
        .map_err(crate::store::StoreError::from)?;
    Ok(StatusCode::OK)
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskQueryParams>,
) -> Result<Json<Vec<Task>>, AppError> {
    let owner = current_owner(&state).await?;
    let tasks = match params.q.as_deref() {
        Some(q) => repository::search_tasks(&state.db, owner, q, params.include_deleted).await?,
        None if params.include_deleted => repository::fetch_all_tasks(&state.db, owner).await?,
        None => repository::fetch_visible_tasks(&state.db, owner).await?,
    };
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<NewTaskRequest>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let owner = current_owner(&state).await?;
    if req.title.trim().is_empty() {
        return Err(AppError::BadRequest("title must not be empty".to_string()));
    }
    let task = repository::create_task(&state.db, owner, req, state.clock.now()).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let owner = current_owner(&state).await?;
    let id = parse_task_id(&id)?;
    ensure_owned(&state, owner, id).await?;
    let task = repository::update_task(&state.db, id, req, state.clock.now())
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    set_completed(state, id, true).await
}

async fn uncomplete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    set_completed(state, id, false).await
}

async fn set_completed(state: AppState, id: String, completed: bool) -> Result<Json<Task>, AppError> {
    let owner = current_owner(&state).await?;
    let id = parse_task_id(&id)?;
    ensure_owned(&state, owner, id).await?;
    let task = repository::set_task_completed(&state.db, id, completed, state.clock.now())
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let owner = current_owner(&state).await?;
    let id = parse_task_id(&id)?;
    ensure_owned(&state, owner, id).await?;
    if repository::soft_delete_task(&state.db, id, state.clock.now()).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

/// Other owners' tasks look like missing ones.
async fn ensure_owned(state: &AppState, owner: OwnerId, id: TaskId) -> Result<(), AppError> {
    match repository::find_task_by_id(&state.db, id).await? {
        Some(task) if task.owner_id == owner => Ok(()),
        _ => Err(AppError::NotFound),
    }
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<StatusCode, AppError> {
    let token = AuthToken::new(req.token)
        .ok_or_else(|| AppError::BadRequest("token must not be empty".to_string()))?;
    state.session.login(OwnerId::new(req.owner_id), token).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn logout(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    let owner = current_owner(&state).await?;
    state.engine.reset(owner).await?;
    state.session.logout().await;
    Ok(StatusCode::NO_CONTENT)
}

async fn sync_now(State(state): State<AppState>) -> Result<Json<SyncReport>, AppError> {
    let report = state.engine.synchronize().await?;
    Ok(Json(report))
}

async fn sync_status(State(state): State<AppState>) -> Result<Json<SyncStatusResponse>, AppError> {
    let Some(owner) = state.session.current_owner_id().await else {
        return Ok(Json(SyncStatusResponse {
            status: SyncStatus::Idle,
            last_synced_at: None,
        }));
    };
    Ok(Json(SyncStatusResponse {
        status: state.engine.status(owner),
        last_synced_at: state.engine.last_synced_at(owner).await?,
    }))
}

async fn remote_latest(State(state): State<AppState>) -> Result<Json<LatestTimeResponse>, AppError> {
    let latest_time = state.engine.remote_latest_time().await?;
    Ok(Json(LatestTimeResponse { latest_time }))
}
