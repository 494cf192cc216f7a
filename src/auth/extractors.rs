use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::auth::jwt::JwtKeys;
use crate::auth::AUTH_COOKIE;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::{User, UserRole};

/// Resolves the session cookie to a full user record. Fails with 401 when
/// the cookie is absent, the token does not verify, or the user is gone.
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(AUTH_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(|| AppError::unauthenticated("Not authenticated."))?;

        let keys = JwtKeys::from_ref(&state);
        let claims = keys.verify(&token).map_err(|_| {
            warn!("invalid or expired session token");
            AppError::unauthenticated("Invalid token.")
        })?;

        let user = state
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthenticated("User not found."))?;

        Ok(CurrentUser(user))
    }
}

/// `CurrentUser` plus the admin role gate.
pub struct AdminUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != UserRole::Admin {
            warn!(user_id = %user.id, "non-admin hit an admin endpoint");
            return Err(AppError::access_denied("Forbidden. Admin access required."));
        }
        Ok(AdminUser(user))
    }
}
