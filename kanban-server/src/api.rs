//! REST API: routes, caller extraction and error responses.

use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use kanban_proto::ids::{NotificationId, ProjectId, TaskId, UserId};
use kanban_proto::request::{
    AddMemberRequest, CommentRequest, CreateProjectRequest, CreateTaskRequest, FieldError,
    MoveTaskRequest, UpdateProjectRequest, UpdateTaskRequest,
};
use serde::Deserialize;
use serde_json::json;

use crate::server::SharedState;
use crate::service::{BoardError, Principal};

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's display name.
pub const USER_NAME_HEADER: &str = "x-user-name";
/// Header carrying the caller's email.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

// ── Error handling ────────────────────────────────────────────────────

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    /// 400 with field-level messages.
    Validation(Vec<FieldError>),
    /// 401: no usable caller identity.
    Unauthorized(String),
    /// 403.
    Forbidden,
    /// 404.
    NotFound(String),
    /// 500.
    Internal(String),
}

impl From<BoardError> for ApiError {
    fn from(e: BoardError) -> Self {
        match e {
            BoardError::Validation(errors) => Self::Validation(errors),
            BoardError::Forbidden => Self::Forbidden,
            BoardError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            BoardError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            }
            Self::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": msg }))).into_response()
            }
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "access denied" })),
            )
                .into_response(),
            Self::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response()
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Validation(vec![FieldError::new("body", rejection.body_text())]))
}

fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("{what} not found")))
}

// ── Caller identity ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct IdentityQuery {
    user_id: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Reads the caller from `x-user-*` headers, falling back to the
/// `user_id`/`name`/`email` query parameters used by browser WebSockets.
fn principal_from_parts(parts: &Parts) -> Result<Principal, ApiError> {
    let query = Query::<IdentityQuery>::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .unwrap_or_default();

    let raw_id = header_str(&parts.headers, USER_ID_HEADER)
        .map(str::to_string)
        .or(query.user_id)
        .ok_or_else(|| ApiError::Unauthorized("missing user identity".to_string()))?;
    let id = UserId::from_str(&raw_id)
        .map_err(|_| ApiError::Unauthorized("invalid user id".to_string()))?;

    Ok(Principal {
        id,
        name: header_str(&parts.headers, USER_NAME_HEADER)
            .map(str::to_string)
            .or(query.name)
            .unwrap_or_default(),
        email: header_str(&parts.headers, USER_EMAIL_HEADER)
            .map(str::to_string)
            .or(query.email)
            .unwrap_or_default(),
    })
}

impl FromRequestParts<SharedState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let principal = principal_from_parts(parts)?;
        state.service.authenticate(&principal).await;
        Ok(principal)
    }
}

// ── Router ────────────────────────────────────────────────────────────

/// REST routes, without state attached.
pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/api/projects/{id}/members", post(add_member))
        .route(
            "/api/projects/{id}/members/{member_id}",
            axum::routing::delete(remove_member),
        )
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/project/{project_id}", get(list_tasks))
        .route("/api/tasks/{id}", put(update_task).delete(delete_task))
        .route("/api/tasks/{id}/move", put(move_task))
        .route("/api/tasks/{id}/comments", post(add_comment))
        .route("/api/users/search", get(search_users))
        .route("/api/users/notifications", get(list_notifications))
        .route("/api/users/notifications/read", put(mark_all_read))
        .route("/api/users/notifications/{id}/read", put(mark_read))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_projects(State(state): State<SharedState>, principal: Principal) -> impl IntoResponse {
    Json(state.service.list_projects(&principal).await)
}

async fn get_project(
    State(state): State<SharedState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ProjectId = parse_id(&id, "project")?;
    Ok(Json(state.service.get_project(&principal, id).await?))
}

async fn create_project(
    State(state): State<SharedState>,
    principal: Principal,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    let project = state.service.create_project(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn update_project(
    State(state): State<SharedState>,
    principal: Principal,
    Path(id): Path<String>,
    payload: Result<Json<UpdateProjectRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ProjectId = parse_id(&id, "project")?;
    let req = body(payload)?;
    Ok(Json(state.service.update_project(&principal, id, req).await?))
}

async fn delete_project(
    State(state): State<SharedState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ProjectId = parse_id(&id, "project")?;
    state.service.delete_project(&principal, id).await?;
    state.rooms.close_room(id);
    Ok(Json(json!({ "message": "project deleted" })))
}

async fn add_member(
    State(state): State<SharedState>,
    principal: Principal,
    Path(id): Path<String>,
    payload: Result<Json<AddMemberRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ProjectId = parse_id(&id, "project")?;
    let req = body(payload)?;
    Ok(Json(state.service.add_member(&principal, id, req).await?))
}

async fn remove_member(
    State(state): State<SharedState>,
    principal: Principal,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ProjectId = parse_id(&id, "project")?;
    let member: UserId = parse_id(&member_id, "member")?;
    Ok(Json(
        state.service.remove_member(&principal, id, member).await?,
    ))
}

async fn list_tasks(
    State(state): State<SharedState>,
    principal: Principal,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let project_id: ProjectId = parse_id(&project_id, "project")?;
    Ok(Json(state.service.list_tasks(&principal, project_id).await?))
}

async fn create_task(
    State(state): State<SharedState>,
    principal: Principal,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    let task = state.service.create_task(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<SharedState>,
    principal: Principal,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id: TaskId = parse_id(&id, "task")?;
    let req = body(payload)?;
    Ok(Json(state.service.update_task(&principal, id, req).await?))
}

async fn move_task(
    State(state): State<SharedState>,
    principal: Principal,
    Path(id): Path<String>,
    payload: Result<Json<MoveTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    let id: TaskId = parse_id(&id, "task")?;
    Ok(Json(state.service.move_task(&principal, id, &req).await?))
}

async fn delete_task(
    State(state): State<SharedState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: TaskId = parse_id(&id, "task")?;
    state.service.delete_task(&principal, id).await?;
    Ok(Json(json!({ "message": "task deleted" })))
}

async fn add_comment(
    State(state): State<SharedState>,
    principal: Principal,
    Path(id): Path<String>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id: TaskId = parse_id(&id, "task")?;
    let req = body(payload)?;
    let task = state.service.add_comment(&principal, id, req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn search_users(
    State(state): State<SharedState>,
    principal: Principal,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    Json(state.service.search_users(&principal, &query.q).await)
}

async fn list_notifications(
    State(state): State<SharedState>,
    principal: Principal,
) -> impl IntoResponse {
    Json(state.service.notifications(&principal).await)
}

async fn mark_read(
    State(state): State<SharedState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: NotificationId = parse_id(&id, "notification")?;
    state.service.mark_read(&principal, id).await?;
    Ok(Json(json!({ "message": "notification marked as read" })))
}

async fn mark_all_read(
    State(state): State<SharedState>,
    principal: Principal,
) -> impl IntoResponse {
    let updated = state.service.mark_all_read(&principal).await;
    Json(json!({ "updated": updated }))
}
