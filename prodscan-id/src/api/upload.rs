//! Upload endpoint
//!
//! POST /upload with multipart field `image`. On success the response is a
//! chunked `application/x-ndjson` stream of pipeline events. Failures before
//! segmentation return a single JSON error body instead.

use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use std::convert::Infallible;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::pipeline::{EventStream, StreamEmitter};
use crate::AppState;

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "image";

/// Response media type
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// POST /upload
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let request_id = Uuid::new_v4();
    let span = info_span!("upload", %request_id);

    async move {
        let result = start_stream(&state, multipart).await;
        if let Err(e) = &result {
            warn!(status = %e.status(), error = %e, "Upload rejected");
            *state.last_error.write().await = Some(e.to_string());
        }
        result
    }
    .instrument(span)
    .await
}

async fn start_stream(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let image = read_image_field(multipart).await?;
    info!(bytes = image.len(), "Image received");

    let upload = state.pipeline.prepare(image).await?;

    let EventStream {
        mut events, cancel, ..
    } = StreamEmitter::spawn(state.pipeline.clone(), upload);

    // Dropping the body (client gone) cancels the pipeline run
    let guard = cancel.drop_guard();
    let body = async_stream::stream! {
        let _guard = guard;
        while let Some(event) = events.recv().await {
            match event.to_ndjson_line() {
                Ok(line) => yield Ok::<_, Infallible>(line),
                Err(e) => warn!(kind = event.event_type(), error = %e, "Failed to serialize event"),
            }
        }
    };

    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(body),
    )
        .into_response())
}

/// Pull the `image` field out of the multipart body
async fn read_image_field(multipart: Result<Multipart, MultipartRejection>) -> ApiResult<Bytes> {
    let mut multipart =
        multipart.map_err(|e| ApiError::BadRequest(format!("No file uploaded: {}", e.body_text())))?;

    loop {
        let field = multipart.next_field().await.map_err(field_error)?;

        let Some(field) = field else {
            return Err(ApiError::BadRequest("No file uploaded".to_string()));
        };

        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let bytes = field.bytes().await.map_err(field_error)?;

        if bytes.is_empty() {
            return Err(ApiError::BadRequest("No file uploaded".to_string()));
        }
        return Ok(bytes);
    }
}

fn field_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Build upload routes with the given body limit
pub fn upload_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
