use std::sync::Arc;

use tracing::info;

use crate::auth::password::hash_password;
use crate::config::AppConfig;
use crate::credits::JobTracker;
use crate::gemini::{GeminiClient, GenerativeBackend};
use crate::users::{MemoryUserStore, NewUser, PgUserStore, User, UserRole, UserStatus, UserStore};

const SEEDED_ADMIN_CREDITS: f64 = 99_999.0;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub gemini: Arc<dyn GenerativeBackend>,
    pub jobs: Arc<JobTracker>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                info!("using postgres user store");
                Arc::new(PgUserStore::connect(url).await?)
            }
            None => {
                info!("using in-memory user store");
                Arc::new(MemoryUserStore::new())
            }
        };

        seed_admin(users.as_ref(), &config).await?;

        let gemini = Arc::new(GeminiClient::new(&config.gemini));

        Ok(Self {
            users,
            gemini,
            jobs: Arc::new(JobTracker::new()),
            config,
        })
    }

    /// Test state: in-memory store pre-seeded with an approved admin
    /// (`admin@test.local` / `admin-secret`) and a stub generation backend.
    pub fn fake() -> Self {
        Self::fake_with_gemini(Arc::new(StubGemini))
    }

    pub fn fake_with_gemini(gemini: Arc<dyn GenerativeBackend>) -> Self {
        use crate::config::{GeminiConfig, JwtConfig};

        let admin = User {
            id: uuid::Uuid::new_v4(),
            email: "admin@test.local".into(),
            password_hash: hash_password("admin-secret").expect("hash admin password"),
            status: UserStatus::Approved,
            role: UserRole::Admin,
            credits: SEEDED_ADMIN_CREDITS,
        };

        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_days: 7,
            },
            gemini: GeminiConfig {
                api_key: Some("test-key".into()),
                base_url: "https://generativelanguage.googleapis.com".into(),
            },
            cookie_secure: false,
            admin_email: None,
            admin_password: None,
        });

        Self {
            users: Arc::new(MemoryUserStore::with_users(vec![admin])),
            gemini,
            jobs: Arc::new(JobTracker::new()),
            config,
        }
    }
}

/// Create the configured admin account unless the email is already taken.
/// Skipped entirely when ADMIN_EMAIL / ADMIN_PASSWORD are not set.
async fn seed_admin(users: &dyn UserStore, config: &AppConfig) -> anyhow::Result<()> {
    let (email, password) = match (&config.admin_email, &config.admin_password) {
        (Some(e), Some(p)) => (e, p),
        _ => return Ok(()),
    };
    if users.find_by_email(email).await?.is_some() {
        return Ok(());
    }
    let admin = users
        .create(NewUser {
            email: email.clone(),
            password_hash: hash_password(password)?,
            status: UserStatus::Approved,
            role: UserRole::Admin,
            credits: SEEDED_ADMIN_CREDITS,
        })
        .await?;
    info!(user_id = %admin.id, email = %admin.email, "seeded admin account");
    Ok(())
}

/// Always-succeeding generation backend for tests.
struct StubGemini;

#[axum::async_trait]
impl GenerativeBackend for StubGemini {
    async fn generate_text(
        &self,
        _system_instruction: &str,
        prompt: &str,
    ) -> crate::error::AppResult<String> {
        Ok(format!("{prompt} (optimized)"))
    }

    async fn generate_image(
        &self,
        _images: &[crate::gemini::InlineImage],
        _prompt: &str,
    ) -> crate::error::AppResult<crate::gemini::InlineImage> {
        Ok(crate::gemini::InlineImage {
            data: "QUJD".into(),
            mime_type: "image/png".into(),
        })
    }

    async fn start_video_job(
        &self,
        _request: &crate::gemini::VideoJobRequest,
    ) -> crate::error::AppResult<String> {
        Ok("models/veo-2.0-generate-001/operations/stub-op".into())
    }

    async fn poll_video_job(
        &self,
        _operation_name: &str,
    ) -> crate::error::AppResult<crate::gemini::VideoJobStatus> {
        Ok(crate::gemini::VideoJobStatus {
            done: true,
            video_uri: Some(
                "https://generativelanguage.googleapis.com/v1beta/files/stub:download?alt=media"
                    .into(),
            ),
            error: None,
        })
    }

    async fn fetch_artifact(&self, _uri: &str) -> crate::error::AppResult<reqwest::Response> {
        let response = axum::http::Response::builder()
            .status(200)
            .header("content-type", "video/mp4")
            .body("stub-video-bytes")
            .expect("build stub response");
        Ok(reqwest::Response::from(response))
    }
}
