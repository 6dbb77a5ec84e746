//! REST API server for fsgate
//!
//! Exposes list/create/write/read/delete over the sandboxed workspace.
//! Every `/files` route requires the shared secret in the `passwd` query
//! parameter; CORS preflight is answered before routing and skips it.

use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use fsgate_vfs::{Deleted, DirectoryEntry, FileStore, FsError};
use http::{header, Method};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::auth::AuthGate;

// Shared state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FileStore>,
    pub auth: Arc<AuthGate>,
}

impl AppState {
    pub fn new(store: Arc<dyn FileStore>, auth: Arc<AuthGate>) -> Self {
        Self { store, auth }
    }
}

/// Which operation failed, used to phrase error messages
#[derive(Debug, Clone, Copy)]
enum Op {
    List,
    Create,
    Write,
    Read,
    Delete,
}

/// Error response: status plus `{"error": message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: Cow<'static, str>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    fn missing_path(op: Op) -> Self {
        let message = match op {
            Op::Delete => "Missing path",
            _ => "Missing file path",
        };
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn bad_body(rejection: &JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }

    fn from_fs(op: Op, err: FsError) -> Self {
        match err {
            FsError::PathTraversal(path) => {
                tracing::warn!(path = %path, "Path traversal attempt detected");
                Self::new(StatusCode::FORBIDDEN, "Path traversal attempt detected")
            }
            FsError::RootDeletion => {
                Self::new(StatusCode::FORBIDDEN, "Cannot delete the workspace root")
            }
            FsError::NotFound(_) => {
                let message = match op {
                    Op::List => "Directory not found",
                    Op::Read => "File not found",
                    Op::Write | Op::Create => "Parent directory not found",
                    Op::Delete => "Path not found",
                };
                Self::new(StatusCode::NOT_FOUND, message)
            }
            FsError::NotADirectory(_) => Self::new(StatusCode::BAD_REQUEST, "Not a directory"),
            FsError::IsADirectory(_) => {
                let message = match op {
                    Op::Write => "Cannot write to a directory",
                    Op::Read => "Cannot read directory content",
                    _ => "Path is a directory",
                };
                Self::new(StatusCode::BAD_REQUEST, message)
            }
            FsError::NotText(_) => {
                Self::new(StatusCode::BAD_REQUEST, "File is not valid UTF-8 text")
            }
            FsError::Io(e) => {
                tracing::error!(error = %e, op = ?op, "Filesystem operation failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

// Requests

#[derive(Deserialize)]
struct AuthQuery {
    passwd: Option<String>,
}

#[derive(Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

#[derive(Deserialize)]
pub struct PathRequest {
    pub path: Option<String>,
}

#[derive(Deserialize)]
pub struct WriteRequest {
    pub path: Option<String>,
    #[serde(default)]
    pub content: String,
}

// Responses

#[derive(Serialize)]
pub struct ListResponse {
    pub path: String,
    pub contents: Vec<DirectoryEntry>,
}

#[derive(Serialize)]
pub struct ContentResponse {
    pub path: String,
    pub content: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: String) -> Json<Self> {
        Json(Self { message })
    }
}

fn require_path(path: Option<String>, op: Op) -> Result<String, ApiError> {
    path.filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::missing_path(op))
}

/// CORS for any origin, advertising the methods the file routes use
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
}

// Routes
pub fn files_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/files",
            get(list_directory).post(create_file).delete(delete_path),
        )
        .route("/files/content", get(read_file).put(write_file))
        .route_layer(middleware::from_fn_with_state(state, require_passwd))
}

/// Full application: file routes, health check, CORS
pub fn app(state: AppState) -> Router {
    files_router(state.clone())
        .route("/health", get(health_check))
        .layer(cors_layer())
        .with_state(state)
}

// Middleware

async fn require_passwd(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let supplied = Query::<AuthQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.passwd);

    if state.auth.check(supplied.as_deref()).is_err() {
        // Never log the query string: it carries the secret
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Rejected unauthorized request"
        );
        return ApiError::unauthorized().into_response();
    }

    next.run(request).await
}

// Handlers

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn list_directory(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let path = query.path.unwrap_or_default();
    let contents = state
        .store
        .list(&path)
        .await
        .map_err(|e| ApiError::from_fs(Op::List, e))?;
    Ok(Json(ListResponse { path, contents }))
}

async fn create_file(
    State(state): State<AppState>,
    body: Result<Json<PathRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_body(&e))?;
    let path = require_path(body.path, Op::Create)?;
    state
        .store
        .create(&path)
        .await
        .map_err(|e| ApiError::from_fs(Op::Create, e))?;
    Ok((
        StatusCode::CREATED,
        MessageResponse::new(format!("File created: {path}")),
    ))
}

async fn write_file(
    State(state): State<AppState>,
    body: Result<Json<WriteRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_body(&e))?;
    let path = require_path(body.path, Op::Write)?;
    state
        .store
        .write(&path, &body.content)
        .await
        .map_err(|e| ApiError::from_fs(Op::Write, e))?;
    Ok(MessageResponse::new(format!("Content written to {path}")))
}

async fn read_file(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ContentResponse>, ApiError> {
    let path = require_path(query.path, Op::Read)?;
    let content = state
        .store
        .read(&path)
        .await
        .map_err(|e| ApiError::from_fs(Op::Read, e))?;
    Ok(Json(ContentResponse { path, content }))
}

async fn delete_path(
    State(state): State<AppState>,
    body: Result<Json<PathRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_body(&e))?;
    let path = require_path(body.path, Op::Delete)?;
    let deleted = state
        .store
        .delete(&path)
        .await
        .map_err(|e| ApiError::from_fs(Op::Delete, e))?;
    let message = match deleted {
        Deleted::Directory => format!("Directory deleted: {path}"),
        Deleted::File => format!("File deleted: {path}"),
    };
    Ok(MessageResponse::new(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (Op::Read, FsError::PathTraversal("..".into()), StatusCode::FORBIDDEN),
            (Op::Delete, FsError::RootDeletion, StatusCode::FORBIDDEN),
            (Op::List, FsError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Op::List, FsError::NotADirectory("x".into()), StatusCode::BAD_REQUEST),
            (Op::Write, FsError::IsADirectory("x".into()), StatusCode::BAD_REQUEST),
            (Op::Read, FsError::NotText("x".into()), StatusCode::BAD_REQUEST),
            (
                Op::Write,
                FsError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (op, err, status) in cases {
            assert_eq!(ApiError::from_fs(op, err).status, status);
        }
    }

    #[test]
    fn test_messages_follow_operation() {
        assert_eq!(
            ApiError::from_fs(Op::Read, FsError::NotFound("x".into())).message,
            "File not found"
        );
        assert_eq!(
            ApiError::from_fs(Op::Delete, FsError::NotFound("x".into())).message,
            "Path not found"
        );
        assert_eq!(ApiError::missing_path(Op::Delete).message, "Missing path");
        assert_eq!(ApiError::missing_path(Op::Read).message, "Missing file path");
    }

    #[test]
    fn test_require_path() {
        assert!(require_path(None, Op::Create).is_err());
        assert!(require_path(Some(String::new()), Op::Create).is_err());
        assert_eq!(require_path(Some("a".into()), Op::Create).unwrap(), "a");
    }
}
