//! Session API endpoints.
//!
//! - POST `/` - Create a session for an already authenticated user
//! - POST `/verify` - Verify an auth token from the body
//! - GET `/verify` - Verify the bearer auth token
//! - POST `/extend` - Mint a new auth token from a refresh token
//! - POST `/delete` - Revoke a session (logout)
//! - GET `/state` - Lifecycle state of the bearer auth token's session

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, validate_user_id};
use crate::authority::{ExtendRequest, NewSession, SessionAuthority, SessionState, Verification};

#[derive(Clone)]
pub struct SessionsState {
    pub authority: Arc<SessionAuthority>,
}

pub fn router(state: SessionsState) -> Router {
    Router::new()
        .route("/", post(create_session))
        .route("/verify", post(verify_session).get(verify_bearer))
        .route("/extend", post(extend_session))
        .route("/delete", post(delete_session))
        .route("/state", get(session_state))
        .with_state(state)
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    #[serde(rename = "userID")]
    user_id: String,
    #[serde(rename = "deviceType", default)]
    device_type: i32,
    #[serde(rename = "durationSeconds")]
    duration_seconds: u32,
    #[serde(rename = "loginIP", default)]
    login_ip: String,
}

#[derive(Serialize)]
struct TokensResponse {
    #[serde(rename = "authToken")]
    auth_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

async fn create_session(
    State(state): State<SessionsState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_user_id(&req.user_id)?;

    let tokens = state
        .authority
        .create(NewSession {
            user_id: req.user_id,
            device_type: req.device_type,
            duration_secs: req.duration_seconds,
            login_ip: req.login_ip,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TokensResponse {
            auth_token: tokens.auth_token,
            refresh_token: tokens.refresh_token,
        }),
    ))
}

#[derive(Deserialize)]
struct TokenRequest {
    #[serde(rename = "authToken")]
    auth_token: String,
}

#[derive(Serialize)]
struct VerifyResponse {
    valid: bool,
    #[serde(rename = "userID")]
    user_id: String,
}

impl From<Verification> for VerifyResponse {
    fn from(v: Verification) -> Self {
        Self {
            valid: v.valid,
            user_id: v.user_id,
        }
    }
}

async fn verify_session(
    State(state): State<SessionsState>,
    Json(req): Json<TokenRequest>,
) -> impl IntoResponse {
    let verification = state.authority.verify(&req.auth_token).await;
    Json(VerifyResponse::from(verification))
}

/// Same as `verify_session`, for callers that forward the client's header.
/// A missing header is simply an invalid token.
async fn verify_bearer(
    State(state): State<SessionsState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let verification = match bearer_token(&headers) {
        Some(token) => state.authority.verify(token).await,
        None => Verification {
            valid: false,
            user_id: String::new(),
        },
    };
    Json(VerifyResponse::from(verification))
}

#[derive(Deserialize)]
struct ExtendSessionRequest {
    #[serde(rename = "userID")]
    user_id: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
    #[serde(rename = "authToken")]
    auth_token: String,
    #[serde(rename = "durationSeconds")]
    duration_seconds: u32,
}

async fn extend_session(
    State(state): State<SessionsState>,
    Json(req): Json<ExtendSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state
        .authority
        .extend(ExtendRequest {
            user_id: req.user_id,
            refresh_token: req.refresh_token,
            auth_token: req.auth_token,
            duration_secs: req.duration_seconds,
        })
        .await?;

    Ok(Json(TokensResponse {
        auth_token: tokens.auth_token,
        refresh_token: tokens.refresh_token,
    }))
}

async fn delete_session(
    State(state): State<SessionsState>,
    Json(req): Json<TokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.authority.delete(&req.auth_token).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Serialize)]
struct StateResponse {
    state: SessionState,
}

async fn session_state(
    State(state): State<SessionsState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers).ok_or_else(|| ApiError::unauthorized("No bearer token"))?;
    let session_state = state.authority.state(token).await?;
    Ok(Json(StateResponse {
        state: session_state,
    }))
}
