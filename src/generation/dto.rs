use serde::{Deserialize, Serialize};

use crate::gemini::InlineImage;

/// Image uploaded by the client as inline base64.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub base64: String,
    pub mime_type: String,
}

impl From<ImagePayload> for InlineImage {
    fn from(p: ImagePayload) -> Self {
        Self {
            data: p.base64,
            mime_type: p.mime_type,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeResponse {
    pub optimized_prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    #[serde(default)]
    pub images: Vec<ImagePayload>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImageResponse {
    pub data: String,
    pub mime_type: String,
}

/// Ad composition knobs; "Auto" leaves the choice to the model.
#[derive(Debug, Clone, Deserialize)]
pub struct AdOptions {
    #[serde(default = "auto")]
    pub industry: String,
    #[serde(default = "auto")]
    pub pose: String,
    #[serde(default = "auto")]
    pub ratio: String,
    #[serde(default = "auto")]
    pub background: String,
    #[serde(default = "auto")]
    pub props: String,
    #[serde(default = "auto")]
    pub lighting: String,
}

fn auto() -> String {
    "Auto".into()
}

impl Default for AdOptions {
    fn default() -> Self {
        Self {
            industry: auto(),
            pose: auto(),
            ratio: auto(),
            background: auto(),
            props: auto(),
            lighting: auto(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAdRequest {
    #[serde(default)]
    pub product_image: Option<ImagePayload>,
    #[serde(default)]
    pub model_image: Option<ImagePayload>,
    #[serde(default)]
    pub options: AdOptions,
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateVideoRequest {
    #[serde(default)]
    pub image: Option<ImagePayload>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    pub operation_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatusQuery {
    #[serde(default)]
    pub operation_name: Option<String>,
}

/// Status payload in the shape the web client polls for.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatusResponse {
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<VideoResultPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResultPayload {
    pub generated_videos: Vec<GeneratedVideo>,
}

#[derive(Debug, Serialize)]
pub struct GeneratedVideo {
    pub video: VideoRef,
}

#[derive(Debug, Serialize)]
pub struct VideoRef {
    pub uri: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub uri: Option<String>,
}

impl VideoStatusResponse {
    pub fn pending(retry_after_secs: u64) -> Self {
        Self {
            done: false,
            response: None,
            error: None,
            retry_after_secs: Some(retry_after_secs),
        }
    }

    pub fn succeeded(uri: String) -> Self {
        Self {
            done: true,
            response: Some(VideoResultPayload {
                generated_videos: vec![GeneratedVideo {
                    video: VideoRef { uri },
                }],
            }),
            error: None,
            retry_after_secs: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            done: true,
            response: None,
            error: Some(ErrorPayload {
                message: message.into(),
            }),
            retry_after_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_response_uses_client_field_names() {
        let json =
            serde_json::to_value(VideoStatusResponse::succeeded("https://g/v.mp4".into())).unwrap();
        assert_eq!(json["done"], true);
        assert_eq!(
            json["response"]["generatedVideos"][0]["video"]["uri"],
            "https://g/v.mp4"
        );
        assert!(json.get("error").is_none());
    }

    #[test]
    fn pending_response_carries_backoff_hint() {
        let json = serde_json::to_value(VideoStatusResponse::pending(20)).unwrap();
        assert_eq!(json["done"], false);
        assert_eq!(json["retryAfterSecs"], 20);
        assert!(json.get("response").is_none());
    }

    #[test]
    fn ad_options_default_to_auto() {
        let req: GenerateAdRequest = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(req.options.industry, "Auto");
        assert_eq!(req.options.lighting, "Auto");
        assert!(req.product_image.is_none());
    }

    #[test]
    fn image_payload_uses_camel_case_mime_type() {
        let p: ImagePayload =
            serde_json::from_str(r#"{"base64":"QUJD","mimeType":"image/png"}"#).unwrap();
        assert_eq!(p.mime_type, "image/png");
    }
}
