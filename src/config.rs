use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// A missing key is surfaced per request rather than at startup, so the
    /// rest of the app (auth, admin) stays usable without one.
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// When set, users live in Postgres; otherwise in memory.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub gemini: GeminiConfig,
    /// Session cookie is marked Secure outside development.
    pub cookie_secure: bool,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "nanobanana".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "nanobanana-users".into()),
            ttl_days: std::env::var("SESSION_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(7),
        };
        let gemini = GeminiConfig {
            api_key: std::env::var("GEMINI_API_KEY").ok(),
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".into()),
        };
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            jwt,
            gemini,
            cookie_secure: std::env::var("APP_ENV")
                .map(|v| v != "development")
                .unwrap_or(true),
            admin_email: std::env::var("ADMIN_EMAIL").ok(),
            admin_password: std::env::var("ADMIN_PASSWORD").ok(),
        })
    }
}
