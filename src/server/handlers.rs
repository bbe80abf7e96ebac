/// Request handlers for `/health`, `/parse` and `/detect`.
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::ParserResult;
use crate::perception::types::{DetectionSet, ParseResult};
use crate::server::types::{ApiError, HealthResponse, NO_IMAGE};
use crate::server::upload::{upload_extension, TempUpload};
use crate::server::ApiState;

/// Image part of a multipart request.
struct ImageUpload {
    extension: String,
    bytes: Vec<u8>,
}

struct UploadForm {
    image: Option<ImageUpload>,
    visualize: bool,
}

/// Health check endpoint
pub async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.parser.detector_loaded(),
        captioner_loaded: state.parser.captioner_loaded(),
    })
}

/// Full parse of an uploaded screenshot.
pub async fn parse_image(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ParseResult>, ApiError> {
    let form = read_form(multipart).await?;
    let image = form.image.ok_or_else(|| ApiError::BadRequest(NO_IMAGE.to_string()))?;
    let visualize = form.visualize;
    let request_id = Uuid::new_v4();
    info!(%request_id, size = image.bytes.len(), visualize, "parse request");

    let parser = state.parser.clone();
    let output_dir = state.output_dir.clone();
    let result = tokio::task::spawn_blocking(move || -> ParserResult<ParseResult> {
        let upload = TempUpload::write(&output_dir, &image.extension, &image.bytes)?;
        parser.parse_screen(upload.path(), visualize)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("parse task failed: {e}")))??;

    debug!(%request_id, total = result.summary.total_elements, "parse response");
    Ok(Json(result))
}

/// Detection only: the bucketed element set.
pub async fn detect_elements(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectionSet>, ApiError> {
    let form = read_form(multipart).await?;
    let image = form.image.ok_or_else(|| ApiError::BadRequest(NO_IMAGE.to_string()))?;
    let request_id = Uuid::new_v4();
    info!(%request_id, size = image.bytes.len(), "detect request");

    let parser = state.parser.clone();
    let output_dir = state.output_dir.clone();
    let detections = tokio::task::spawn_blocking(move || -> ParserResult<DetectionSet> {
        let upload = TempUpload::write(&output_dir, &image.extension, &image.bytes)?;
        parser.detect_file(upload.path())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("detect task failed: {e}")))??;

    debug!(%request_id, count = detections.len(), "detect response");
    Ok(Json(detections))
}

/// Pull the `image` file and the optional `visualize` flag out of the form.
/// Unknown parts are ignored.
async fn read_form(multipart: Result<Multipart, MultipartRejection>) -> Result<UploadForm, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mut form = UploadForm {
        image: None,
        visualize: false,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let extension = upload_extension(field.file_name());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read image: {e}")))?;
                form.image = Some(ImageUpload {
                    extension,
                    bytes: bytes.to_vec(),
                });
            }
            "visualize" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read visualize: {e}")))?;
                form.visualize = value.trim().eq_ignore_ascii_case("true");
            }
            _ => {}
        }
    }
    Ok(form)
}
