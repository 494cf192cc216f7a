pub mod client;

use axum::async_trait;

use crate::error::AppResult;

pub use client::GeminiClient;

/// Inline image handed to or received from the generation service, as a
/// base64 payload plus mime type.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct VideoJobRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

/// One observation of an asynchronous video job, from the caller's side.
#[derive(Debug, Clone)]
pub struct VideoJobStatus {
    pub done: bool,
    pub video_uri: Option<String>,
    pub error: Option<String>,
}

/// Seam to the external generative-AI service. The real implementation is
/// [`GeminiClient`]; tests substitute stubs.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Single-turn text generation under a system instruction.
    async fn generate_text(&self, system_instruction: &str, prompt: &str) -> AppResult<String>;

    /// Image-to-image generation: input images plus an edit instruction.
    async fn generate_image(&self, images: &[InlineImage], prompt: &str) -> AppResult<InlineImage>;

    /// Submit a video job; returns the opaque operation name used to poll.
    async fn start_video_job(&self, request: &VideoJobRequest) -> AppResult<String>;

    async fn poll_video_job(&self, operation_name: &str) -> AppResult<VideoJobStatus>;

    /// Fetch a generated artifact for proxying to the client.
    async fn fetch_artifact(&self, uri: &str) -> AppResult<reqwest::Response>;
}
