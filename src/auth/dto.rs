use serde::{Deserialize, Serialize};

use crate::users::PublicUser;

/// Which sub-operation `POST /api/auth` performs. Parsed by hand so an
/// unknown action is a validation failure, not a body-decode rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Login,
    Signup,
    Logout,
}

impl AuthAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "login" => Some(AuthAction::Login),
            "signup" => Some(AuthAction::Signup),
            "logout" => Some(AuthAction::Logout),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: PublicUser,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parses_lowercase() {
        let req: AuthRequest =
            serde_json::from_str(r#"{"action":"login","email":"a@x.com","password":"p"}"#).unwrap();
        assert_eq!(AuthAction::parse(req.action.as_deref().unwrap()), Some(AuthAction::Login));
        assert_eq!(req.email.as_deref(), Some("a@x.com"));
    }

    #[test]
    fn logout_needs_no_credentials() {
        let req: AuthRequest = serde_json::from_str(r#"{"action":"logout"}"#).unwrap();
        assert_eq!(AuthAction::parse(req.action.as_deref().unwrap()), Some(AuthAction::Logout));
        assert!(req.email.is_none());
        assert!(req.password.is_none());
    }

    #[test]
    fn unknown_and_missing_actions_do_not_parse() {
        assert_eq!(AuthAction::parse("destroy"), None);
        assert_eq!(AuthAction::parse("Login"), None);
        let req: AuthRequest = serde_json::from_str(r#"{}"#).unwrap();
        assert!(req.action.is_none());
    }
}
