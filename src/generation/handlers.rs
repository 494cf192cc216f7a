use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::auth::extractors::CurrentUser;
use crate::credits::{
    self, execute_paid, Charge, JobTracker, AD_COMPOSITION_COST, IMAGE_EDIT_COST,
    MAX_POLL_ATTEMPTS, PROMPT_OPTIMIZE_COST, VIDEO_GENERATION_COST,
};
use crate::error::{AppError, AppResult};
use crate::gemini::{InlineImage, VideoJobRequest};
use crate::state::AppState;
use crate::users::User;

use super::dto::{
    AdOptions, DownloadQuery, GenerateAdRequest, GenerateImageRequest, GenerateVideoRequest,
    GenerateVideoResponse, GeneratedImageResponse, OptimizeRequest, OptimizeResponse,
    VideoStatusQuery, VideoStatusResponse,
};

const OPTIMIZE_SYSTEM_INSTRUCTION: &str = "Rewrite the following user's prompt to be more \
    descriptive and effective for a visual AI model. The new prompt should respect the user's \
    original intent. Keep it concise and in the same language as the original. Directly output \
    the optimized prompt without any preamble.";

const OPTIMIZE_VIDEO_SYSTEM_INSTRUCTION: &str = "Rewrite the following user's prompt to be more \
    descriptive and effective for an AI video generation model. Describe motion, camera work and \
    atmosphere while respecting the user's original intent. Keep it concise and in the same \
    language as the original. Directly output the optimized prompt without any preamble.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/optimize-prompt", post(optimize_prompt))
        .route("/optimize-video-prompt", post(optimize_video_prompt))
        .route("/generate", post(generate_image))
        .route("/generate-ad", post(generate_ad))
        .route("/generate-video", post(generate_video))
        .route("/video-status", get(video_status))
        .route("/download-video", get(download_video))
}

// ---- prompt optimization --------------------------------------------------

#[instrument(skip_all, fields(user_id = %user.id))]
async fn optimize_prompt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<OptimizeRequest>,
) -> AppResult<Json<OptimizeResponse>> {
    optimize(&state, &user, payload, OPTIMIZE_SYSTEM_INSTRUCTION).await
}

#[instrument(skip_all, fields(user_id = %user.id))]
async fn optimize_video_prompt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<OptimizeRequest>,
) -> AppResult<Json<OptimizeResponse>> {
    optimize(&state, &user, payload, OPTIMIZE_VIDEO_SYSTEM_INSTRUCTION).await
}

async fn optimize(
    state: &AppState,
    user: &User,
    payload: OptimizeRequest,
    system_instruction: &str,
) -> AppResult<Json<OptimizeResponse>> {
    let prompt = require_prompt(payload.prompt, "Prompt is required.")?;

    let (optimized, _) = execute_paid(
        state.users.as_ref(),
        user,
        Charge::up_to(PROMPT_OPTIMIZE_COST),
        || async {
            let text = state.gemini.generate_text(system_instruction, &prompt).await?;
            if text.is_empty() {
                return Err(AppError::upstream("Could not optimize prompt.".to_string()));
            }
            Ok(text)
        },
    )
    .await?;

    Ok(Json(OptimizeResponse {
        optimized_prompt: optimized,
    }))
}

// ---- image generation -----------------------------------------------------

#[instrument(skip_all, fields(user_id = %user.id))]
async fn generate_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<GenerateImageRequest>,
) -> AppResult<Json<GeneratedImageResponse>> {
    let prompt = require_prompt(payload.prompt, "Prompt is required.")?;
    if payload.images.is_empty() {
        return Err(AppError::validation("At least one image is required."));
    }
    let images: Vec<InlineImage> = payload.images.into_iter().map(Into::into).collect();

    let (result, _) = execute_paid(
        state.users.as_ref(),
        &user,
        Charge::exact(IMAGE_EDIT_COST),
        || async { state.gemini.generate_image(&images, &prompt).await },
    )
    .await?;

    Ok(Json(GeneratedImageResponse {
        data: result.data,
        mime_type: result.mime_type,
    }))
}

#[instrument(skip_all, fields(user_id = %user.id))]
async fn generate_ad(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<GenerateAdRequest>,
) -> AppResult<Json<GeneratedImageResponse>> {
    let product = payload
        .product_image
        .ok_or_else(|| AppError::validation("Product image is required."))?;

    let mut images: Vec<InlineImage> = vec![product.into()];
    let has_model = payload.model_image.is_some();
    if let Some(model) = payload.model_image {
        images.push(model.into());
    }
    let prompt = build_ad_prompt(&payload.options, payload.custom_prompt.as_deref(), has_model);

    let (result, _) = execute_paid(
        state.users.as_ref(),
        &user,
        Charge::exact(AD_COMPOSITION_COST),
        || async { state.gemini.generate_image(&images, &prompt).await },
    )
    .await?;

    Ok(Json(GeneratedImageResponse {
        data: result.data,
        mime_type: result.mime_type,
    }))
}

/// Turn the ad options into a single instruction for the image model.
/// Options left at "Auto" are not mentioned so the model can choose.
fn build_ad_prompt(options: &AdOptions, custom_prompt: Option<&str>, has_model: bool) -> String {
    let mut prompt = String::from(
        "Create a professional advertising photograph featuring the product from the first image.",
    );
    if has_model {
        prompt.push_str(" Have the model from the second image present the product naturally.");
    }
    for (label, value) in [
        ("Industry", &options.industry),
        ("Model pose", &options.pose),
        ("Aspect ratio", &options.ratio),
        ("Background", &options.background),
        ("Props", &options.props),
        ("Lighting", &options.lighting),
    ] {
        if !value.eq_ignore_ascii_case("auto") {
            prompt.push_str(&format!(" {label}: {value}."));
        }
    }
    if let Some(custom) = custom_prompt.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!(" Additional direction: {}", custom.trim()));
    }
    prompt
}

// ---- video generation -----------------------------------------------------

#[instrument(skip_all, fields(user_id = %user.id))]
async fn generate_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<GenerateVideoRequest>,
) -> AppResult<(StatusCode, Json<GenerateVideoResponse>)> {
    let prompt = require_prompt(payload.prompt, "Prompt is required for video generation.")?;
    let request = VideoJobRequest {
        prompt,
        image: payload.image.map(Into::into),
    };

    let (operation_name, receipt) = execute_paid(
        state.users.as_ref(),
        &user,
        Charge::exact(VIDEO_GENERATION_COST),
        || async { state.gemini.start_video_job(&request).await },
    )
    .await
    .map_err(|e| match e {
        AppError::InsufficientCredits(_) => AppError::InsufficientCredits(format!(
            "Insufficient credits. Video generation requires {VIDEO_GENERATION_COST} credits."
        )),
        other => other,
    })?;

    // Remember which user and amount are attached to this submission so a
    // terminal failure seen while polling can be refunded.
    state
        .jobs
        .record(&operation_name, user.id, receipt.charged);

    info!(operation = %operation_name, "video job submitted");
    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateVideoResponse { operation_name }),
    ))
}

#[instrument(skip_all, fields(user_id = %user.id))]
async fn video_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<VideoStatusQuery>,
) -> AppResult<Json<VideoStatusResponse>> {
    let operation_name = query
        .operation_name
        .filter(|o| !o.is_empty())
        .ok_or_else(|| AppError::validation("Operation name is required."))?;

    let status = match state.gemini.poll_video_job(&operation_name).await {
        Ok(status) => status,
        Err(err) => {
            // A failing status check is terminal from the caller's side.
            refund_pending(&state, &operation_name).await;
            return Err(err);
        }
    };

    if status.done {
        return match status.video_uri {
            Some(uri) => {
                // Charge becomes final.
                state.jobs.settle(&operation_name);
                info!(operation = %operation_name, "video job succeeded");
                Ok(Json(VideoStatusResponse::succeeded(uri)))
            }
            None => {
                refund_pending(&state, &operation_name).await;
                let message = status.error.unwrap_or_else(|| {
                    "Video generation finished but no video URI was found.".to_string()
                });
                warn!(operation = %operation_name, %message, "video job failed");
                Ok(Json(VideoStatusResponse::failed(message)))
            }
        };
    }

    let polls = state.jobs.note_poll(&operation_name);
    if let Some(polls) = polls {
        if polls >= MAX_POLL_ATTEMPTS {
            refund_pending(&state, &operation_name).await;
            warn!(operation = %operation_name, polls, "video job exceeded poll budget");
            return Ok(Json(VideoStatusResponse::failed(
                "Video generation timed out.",
            )));
        }
    }
    Ok(Json(VideoStatusResponse::pending(
        JobTracker::suggested_retry_secs(polls.unwrap_or(0)),
    )))
}

/// Refund the charge attached to a job, if this process still tracks one.
/// Settling removes the entry, so repeated terminal reports refund once.
async fn refund_pending(state: &AppState, operation_name: &str) {
    let Some(charge) = state.jobs.settle(operation_name) else {
        return;
    };
    match state.users.find_by_id(charge.user_id).await {
        Ok(Some(user)) => {
            credits::refund(state.users.as_ref(), &user, charge.charged).await;
        }
        Ok(None) => {
            warn!(operation = %operation_name, user_id = %charge.user_id, "refund target vanished")
        }
        Err(e) => {
            warn!(operation = %operation_name, error = %e, "refund lookup failed")
        }
    }
}

// ---- artifact proxy -------------------------------------------------------

#[instrument(skip_all, fields(user_id = %user.id))]
async fn download_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<DownloadQuery>,
) -> AppResult<Response> {
    let uri = query
        .uri
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::validation("Video URI is required."))?;

    let upstream = state.gemini.fetch_artifact(&uri).await?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("video/mp4"));
    let content_length = upstream.headers().get(header::CONTENT_LENGTH).cloned();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=31536000, immutable"),
        );
    if let Some(length) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }
    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| AppError::internal(e.to_string()))
}

fn require_prompt(prompt: Option<String>, message: &str) -> AppResult<String> {
    prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::validation(message))
}
