use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::auth::dto::{AuthAction, AuthRequest, LoginResponse, MeResponse, MessageResponse};
use crate::auth::extractors::CurrentUser;
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::AUTH_COOKIE;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::users::NewUser;

const MIN_PASSWORD_LEN: usize = 6;

pub fn router() -> Router<AppState> {
    Router::new().route("/auth", post(auth_dispatch).get(get_me))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn session_cookie(token: String, secure: bool, ttl: std::time::Duration) -> Cookie<'static> {
    let mut cookie = Cookie::new(AUTH_COOKIE, token);
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::seconds(ttl.as_secs() as i64));
    cookie
}

/// Expired replacement for the session cookie. Added unconditionally on
/// logout so the client clears its copy even when the request carried none.
fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(AUTH_COOKIE, "");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}

#[instrument(skip_all, fields(action = ?payload.action))]
async fn auth_dispatch(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<AuthRequest>,
) -> AppResult<Response> {
    let action = payload
        .action
        .as_deref()
        .and_then(AuthAction::parse)
        .ok_or_else(|| AppError::validation("Invalid action."))?;
    match action {
        AuthAction::Login => login(state, jar, payload).await,
        AuthAction::Signup => signup(state, payload).await,
        AuthAction::Logout => Ok(logout(jar)),
    }
}

async fn login(state: AppState, jar: CookieJar, payload: AuthRequest) -> AppResult<Response> {
    let (email, password) = credentials(&payload)?;

    let user = state
        .users
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::unauthenticated("Invalid credentials."))?;

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with invalid password");
        return Err(AppError::unauthenticated("Invalid credentials."));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(&user)?;
    let jar = jar.add(session_cookie(token, state.config.cookie_secure, keys.ttl));

    info!(user_id = %user.id, "user logged in");
    Ok((
        jar,
        Json(LoginResponse {
            message: "Login successful".into(),
            user: user.into(),
        }),
    )
        .into_response())
}

async fn signup(state: AppState, payload: AuthRequest) -> AppResult<Response> {
    let (email, password) = credentials(&payload)?;
    let email = email.trim().to_lowercase();

    if !is_valid_email(&email) || password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "Email and a password of at least 6 characters are required.",
        ));
    }

    let hash = hash_password(password)?;
    let user = state.users.create(NewUser::signup(email, hash)).await?;

    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "Signup successful! Your account is pending approval from an administrator.",
        )),
    )
        .into_response())
}

fn logout(jar: CookieJar) -> Response {
    let jar = jar.add(removal_cookie());
    (jar, Json(MessageResponse::new("Logout successful"))).into_response()
}

fn credentials(payload: &AuthRequest) -> AppResult<(&str, &str)> {
    match (payload.email.as_deref(), payload.password.as_deref()) {
        (Some(e), Some(p)) => Ok((e, p)),
        _ => Err(AppError::validation("Email and password are required.")),
    }
}

#[instrument(skip_all)]
async fn get_me(CurrentUser(user): CurrentUser) -> AppResult<Json<MeResponse>> {
    Ok(Json(MeResponse { user: user.into() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.domain.io"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("spaces in@x.com"));
    }

    #[test]
    fn session_cookie_attributes() {
        let ttl = std::time::Duration::from_secs(7 * 24 * 60 * 60);
        let cookie = session_cookie("tok".into(), true, ttl);
        assert_eq!(cookie.name(), AUTH_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));
    }

    #[test]
    fn removal_cookie_expires_immediately() {
        let cookie = removal_cookie();
        assert_eq!(cookie.name(), AUTH_COOKIE);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn credentials_required_for_login_and_signup() {
        let payload: AuthRequest = serde_json::from_str(r#"{"action":"login"}"#).unwrap();
        assert!(credentials(&payload).is_err());
    }
}
