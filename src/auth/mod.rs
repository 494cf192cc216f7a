mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;

use axum::Router;

use crate::state::AppState;

/// Name of the HTTP-only session cookie.
pub const AUTH_COOKIE: &str = "auth_token";

pub fn router() -> Router<AppState> {
    handlers::router()
}
