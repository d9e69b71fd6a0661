mod error;
mod sessions;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::authority::SessionAuthority;

pub use error::ApiError;
pub use sessions::bearer_token;

/// Create the API router.
pub fn create_api_router(authority: Arc<SessionAuthority>) -> Router {
    let sessions_state = sessions::SessionsState {
        authority: authority.clone(),
    };

    let users_state = users::UsersState { authority };

    Router::new()
        .nest("/sessions", sessions::router(sessions_state))
        .nest("/users", users::router(users_state))
}
