use axum::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{GenerativeBackend, InlineImage, VideoJobRequest, VideoJobStatus};
use crate::config::GeminiConfig;
use crate::error::{AppError, AppResult};

const TEXT_MODEL: &str = "gemini-2.5-flash";
const IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const VIDEO_MODEL: &str = "veo-2.0-generate-001";

/// HTTP client for the Gemini generateContent / Veo long-running APIs.
pub struct GeminiClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
}

// ---- wire types -----------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(s: impl Into<String>) -> Self {
        Self {
            text: Some(s.into()),
            ..Self::default()
        }
    }

    fn image(img: &InlineImage) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: img.mime_type.clone(),
                data: img.data.clone(),
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictLongRunningRequest {
    instances: Vec<VideoInstance>,
    parameters: VideoParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoInstance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<VideoImage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    sample_count: u32,
}

#[derive(Debug, Deserialize)]
struct OperationHandle {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    response: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

// ---- client ---------------------------------------------------------------

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            http: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn key(&self) -> AppResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AppError::internal("Server configuration error: API key not found."))
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> AppResult<GenerateContentResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url,
            model,
            self.key()?
        );
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::upstream(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model, %status, "generateContent failed");
            return Err(AppError::upstream(format!(
                "Gemini returned {status}: {body}"
            )));
        }
        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| AppError::upstream(format!("invalid Gemini response: {e}")))
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate_text(&self, system_instruction: &str, prompt: &str) -> AppResult<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::text(prompt)],
            }],
            system_instruction: Some(Content {
                parts: vec![Part::text(system_instruction)],
            }),
            generation_config: Some(GenerationConfig {
                response_modalities: None,
                thinking_config: Some(ThinkingConfig { thinking_budget: 0 }),
            }),
        };
        let response = self.generate_content(TEXT_MODEL, &request).await?;
        let text = first_text(&response)
            .ok_or_else(|| AppError::upstream("model returned no text".to_string()))?;
        Ok(text.trim().to_string())
    }

    async fn generate_image(&self, images: &[InlineImage], prompt: &str) -> AppResult<InlineImage> {
        let mut parts: Vec<Part> = images.iter().map(Part::image).collect();
        parts.push(Part::text(prompt));
        let request = GenerateContentRequest {
            contents: vec![Content { parts }],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["IMAGE", "TEXT"]),
                thinking_config: None,
            }),
        };
        let response = self.generate_content(IMAGE_MODEL, &request).await?;
        first_image(&response)
            .ok_or_else(|| AppError::upstream("model returned no image".to_string()))
    }

    async fn start_video_job(&self, request: &VideoJobRequest) -> AppResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:predictLongRunning?key={}",
            self.base_url,
            VIDEO_MODEL,
            self.key()?
        );
        let body = PredictLongRunningRequest {
            instances: vec![VideoInstance {
                prompt: request.prompt.clone(),
                image: request.image.as_ref().map(|img| VideoImage {
                    bytes_base64_encoded: img.data.clone(),
                    mime_type: img.mime_type.clone(),
                }),
            }],
            parameters: VideoParameters { sample_count: 1 },
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::upstream(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "video job submission failed");
            return Err(AppError::upstream(format!(
                "Gemini returned {status}: {body}"
            )));
        }
        let handle = response
            .json::<OperationHandle>()
            .await
            .map_err(|e| AppError::upstream(format!("invalid Gemini response: {e}")))?;
        info!(operation = %handle.name, "video job accepted");
        Ok(handle.name)
    }

    async fn poll_video_job(&self, operation_name: &str) -> AppResult<VideoJobStatus> {
        if !is_valid_operation_name(operation_name) {
            return Err(AppError::validation("Invalid operation name."));
        }
        let url = format!(
            "{}/v1beta/{}?key={}",
            self.base_url,
            operation_name,
            self.key()?
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::upstream(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            warn!(operation = %operation_name, %status, "operation poll failed");
            return Err(AppError::upstream(format!("Gemini returned {status}")));
        }
        let op = response
            .json::<Operation>()
            .await
            .map_err(|e| AppError::upstream(format!("invalid Gemini response: {e}")))?;
        Ok(VideoJobStatus {
            done: op.done,
            video_uri: op.response.as_ref().and_then(extract_video_uri),
            error: op.error.map(|e| e.message),
        })
    }

    async fn fetch_artifact(&self, uri: &str) -> AppResult<reqwest::Response> {
        if !uri.starts_with(&format!("{}/", self.base_url)) {
            return Err(AppError::validation("Video URI is not allowed."));
        }
        let separator = if uri.contains('?') { '&' } else { '?' };
        let url = format!("{uri}{separator}key={}", self.key()?);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::upstream(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AppError::upstream(format!(
                "Failed to fetch video. Status: {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

fn first_text(response: &GenerateContentResponse) -> Option<String> {
    response
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|c| c.parts.iter())
        .find_map(|p| p.text.clone())
}

fn first_image(response: &GenerateContentResponse) -> Option<InlineImage> {
    response
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|c| c.parts.iter())
        .find_map(|p| {
            p.inline_data.as_ref().map(|d| InlineImage {
                data: d.data.clone(),
                mime_type: d.mime_type.clone(),
            })
        })
}

/// Operation names are path segments we interpolate into a URL; keep them to
/// the characters the service actually emits.
fn is_valid_operation_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 512
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-'))
}

/// The operation payload shape differs between API revisions; probe the
/// known locations for the first generated video's uri.
fn extract_video_uri(response: &serde_json::Value) -> Option<String> {
    let candidates = [
        &response["generateVideoResponse"]["generatedSamples"][0]["video"]["uri"],
        &response["generatedVideos"][0]["video"]["uri"],
    ];
    candidates
        .iter()
        .find_map(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_camel_case_keys() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::text("hello")],
            }],
            system_instruction: Some(Content {
                parts: vec![Part::text("rewrite")],
            }),
            generation_config: Some(GenerationConfig {
                response_modalities: None,
                thinking_config: Some(ThinkingConfig { thinking_budget: 0 }),
            }),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("systemInstruction"));
        assert!(json.contains("generationConfig"));
        assert!(json.contains("thinkingBudget"));
        assert!(!json.contains("snake_case"));
    }

    #[test]
    fn video_request_serializes_image_bytes() {
        let body = PredictLongRunningRequest {
            instances: vec![VideoInstance {
                prompt: "a banana surfing".into(),
                image: Some(VideoImage {
                    bytes_base64_encoded: "QUJD".into(),
                    mime_type: "image/png".into(),
                }),
            }],
            parameters: VideoParameters { sample_count: 1 },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("bytesBase64Encoded"));
        assert!(json.contains("sampleCount"));
    }

    #[test]
    fn parses_text_response() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"an optimized prompt"}]}}]}"#;
        let response: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(first_text(&response).as_deref(), Some("an optimized prompt"));
        assert!(first_image(&response).is_none());
    }

    #[test]
    fn parses_image_response() {
        let raw = r#"{"candidates":[{"content":{"parts":[
            {"text":"here you go"},
            {"inlineData":{"mimeType":"image/png","data":"QUJD"}}
        ]}}]}"#;
        let response: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let image = first_image(&response).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "QUJD");
    }

    #[test]
    fn extracts_uri_from_either_operation_shape() {
        let veo: serde_json::Value = serde_json::json!({
            "generateVideoResponse": {
                "generatedSamples": [{"video": {"uri": "https://g/a.mp4"}}]
            }
        });
        assert_eq!(extract_video_uri(&veo).as_deref(), Some("https://g/a.mp4"));

        let legacy: serde_json::Value = serde_json::json!({
            "generatedVideos": [{"video": {"uri": "https://g/b.mp4"}}]
        });
        assert_eq!(extract_video_uri(&legacy).as_deref(), Some("https://g/b.mp4"));

        assert!(extract_video_uri(&serde_json::json!({})).is_none());
    }

    #[test]
    fn operation_name_validation() {
        assert!(is_valid_operation_name(
            "models/veo-2.0-generate-001/operations/abc123"
        ));
        assert!(!is_valid_operation_name(""));
        assert!(!is_valid_operation_name("../../etc/passwd"));
        assert!(!is_valid_operation_name("op?key=steal"));
        assert!(!is_valid_operation_name("op name with spaces"));
    }

    #[tokio::test]
    async fn artifact_fetch_rejects_uris_outside_the_upstream_host() {
        let client = GeminiClient::new(&GeminiConfig {
            api_key: Some("k".into()),
            base_url: "https://generativelanguage.googleapis.com".into(),
        });
        for uri in [
            "https://evil.example.com/v.mp4",
            "https://generativelanguage.googleapis.com.evil.com/v.mp4",
            "http://generativelanguage.googleapis.com/v.mp4",
            "file:///etc/passwd",
        ] {
            let err = client.fetch_artifact(uri).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "allowed: {uri}");
        }
    }

    #[test]
    fn pending_operation_parses_without_response() {
        let raw = r#"{"name":"operations/x","done":false}"#;
        let op: Operation = serde_json::from_str(raw).unwrap();
        assert!(!op.done);
        assert!(op.response.is_none());
        assert!(op.error.is_none());
    }

    #[test]
    fn failed_operation_carries_error_message() {
        let raw = r#"{"done":true,"error":{"code":13,"message":"generation failed"}}"#;
        let op: Operation = serde_json::from_str(raw).unwrap();
        assert!(op.done);
        assert_eq!(op.error.unwrap().message, "generation failed");
    }
}
