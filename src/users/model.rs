use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Moderation state of an account. New signups start as `Pending` and can
/// only run paid operations once an admin flips them to `Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Approved,
    Rejected,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Approved => "approved",
            UserStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UserStatus::Pending),
            "approved" => Some(UserStatus::Approved),
            "rejected" => Some(UserStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(UserRole::User),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// User record as held by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub status: UserStatus,
    pub role: UserRole,
    pub credits: f64,
}

/// What the API exposes: a user with the credential hash stripped.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub status: UserStatus,
    pub role: UserRole,
    pub credits: f64,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            status: u.status,
            role: u.role,
            credits: u.credits,
        }
    }
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        u.clone().into()
    }
}

/// Fields for creating a user. Signup uses `signup()`; seeding and tests can
/// set status/role/credits explicitly.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub role: UserRole,
    pub credits: f64,
}

impl NewUser {
    pub fn signup(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: password_hash.into(),
            status: UserStatus::Pending,
            role: UserRole::User,
            credits: 0.0,
        }
    }
}

/// Partial update applied by admin moderation.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub status: Option<UserStatus>,
    pub credits: Option<f64>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.credits.is_none()
    }
}
