//! Per-user session listing.
//!
//! - GET `/{user_id}/sessions` - All sessions of a user, newest login first

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;

use super::error::{ApiError, validate_user_id};
use crate::authority::{SessionAuthority, SessionInfo};

#[derive(Clone)]
pub struct UsersState {
    pub authority: Arc<SessionAuthority>,
}

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/{user_id}/sessions", get(list_sessions))
        .with_state(state)
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

async fn list_sessions(
    State(state): State<UsersState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_user_id(&user_id)?;

    let sessions = state.authority.list_sessions(&user_id).await?;
    Ok(Json(ListSessionsResponse { sessions }))
}
