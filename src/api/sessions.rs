//! Session history endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Serialize;

use super::{ApiState, ErrorResponse, chat, error_response};
use crate::db::Role;

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// One stored turn in the shape the browser client renders
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub role: &'static str,
    pub parts: Vec<HistoryPart>,
}

#[derive(Debug, Serialize)]
pub struct HistoryPart {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn db_error(e: &crate::Error) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!(error = %e, "database error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error_response("db_error", &e.to_string()),
    )
}

fn not_found(session_id: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        error_response("not_found", &format!("Session {session_id} not found")),
    )
}

/// List session ids, most recent first
async fn list_sessions(State(state): State<Arc<ApiState>>) -> ApiResult<Json<Vec<String>>> {
    state
        .session_repo
        .list_ids()
        .map(Json)
        .map_err(|e| db_error(&e))
}

/// Full history of a session
async fn get_history(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let repo = &state.session_repo;
    if repo.find(&session_id).map_err(|e| db_error(&e))?.is_none() {
        return Err(not_found(&session_id));
    }

    let entries = repo
        .history(&session_id)
        .map_err(|e| db_error(&e))?
        .into_iter()
        .map(|turn| HistoryEntry {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            },
            parts: vec![HistoryPart { text: turn.content }],
        })
        .collect();

    Ok(Json(entries))
}

/// Delete a session and its history
async fn delete_session(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    match state.session_repo.delete(&session_id) {
        Ok(()) => {}
        Err(crate::Error::NotFound(_)) => return Err(not_found(&session_id)),
        Err(e) => return Err(db_error(&e)),
    }

    Ok(Json(MessageResponse {
        message: format!("Session {session_id} deleted successfully."),
    }))
}

/// Build the `/agent` router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route(
            "/chat/{session_id}",
            get(get_history)
                .delete(delete_session)
                .post(chat::chat)
                .layer(DefaultBodyLimit::max(chat::MAX_UPLOAD_BYTES)),
        )
        .with_state(state)
}
