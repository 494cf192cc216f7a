use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::extractors::AdminUser;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::users::{PublicUser, UserPatch, UserStatus};

pub fn router() -> Router<AppState> {
    Router::new().route("/admin", get(list_users).post(update_user))
}

#[derive(Debug, Serialize)]
struct UserListResponse {
    users: Vec<PublicUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub credits: Option<f64>,
}

#[derive(Debug, Serialize)]
struct UpdateUserResponse {
    message: String,
}

#[instrument(skip_all, fields(admin_id = %admin.id))]
async fn list_users(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<UserListResponse>> {
    let users = state
        .users
        .list_all()
        .await?
        .iter()
        .map(PublicUser::from)
        .collect();
    Ok(Json(UserListResponse { users }))
}

#[instrument(skip_all, fields(admin_id = %admin.id))]
async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<UpdateUserResponse>> {
    let (user_id, patch) = validate_patch(payload)?;

    let updated = state.users.update(user_id, patch).await?;
    info!(
        user_id = %updated.id,
        status = updated.status.as_str(),
        credits = updated.credits,
        "user updated"
    );
    Ok(Json(UpdateUserResponse {
        message: "User updated successfully.".to_string(),
    }))
}

fn validate_patch(payload: UpdateUserRequest) -> AppResult<(Uuid, UserPatch)> {
    let user_id = payload
        .user_id
        .ok_or_else(|| AppError::validation("User ID is required."))?;

    let status = match payload.status.as_deref() {
        Some(raw) => Some(
            UserStatus::parse(raw)
                .ok_or_else(|| AppError::validation("Invalid status value."))?,
        ),
        None => None,
    };

    if let Some(credits) = payload.credits {
        if !credits.is_finite() || credits < 0.0 {
            return Err(AppError::validation(
                "Credits must be a non-negative number.",
            ));
        }
    }

    let patch = UserPatch {
        status,
        credits: payload.credits,
    };
    if patch.is_empty() {
        return Err(AppError::validation("No valid update fields provided."));
    }
    Ok((user_id, patch))
}
