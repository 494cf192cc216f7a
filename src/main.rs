use tracing_subscriber::EnvFilter;

mod admin;
mod app;
mod auth;
mod config;
mod credits;
mod error;
mod gemini;
mod generation;
mod state;
mod users;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let state = AppState::init().await?;
    app::serve(state).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nanobanana=debug,axum=info,tower_http=info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
