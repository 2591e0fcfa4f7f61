//! Google Cloud Vision API client
//!
//! Implements [`AnnotationOracle`] over the REST `images:annotate` endpoint,
//! sending one image per request with inline base64 content.

use crate::types::{AnnotateResponse, AnnotationOracle, Feature, OracleError};
use base64::{engine::general_purpose::STANDARD, Engine};
use prodscan_common::config::VisionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = concat!("prodscan-id/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct BatchAnnotateRequest<'a> {
    requests: [AnnotateImageRequest<'a>; 1],
}

#[derive(Debug, Serialize)]
struct AnnotateImageRequest<'a> {
    image: ImageContent,
    features: &'a [Feature],
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Deserialize)]
struct BatchAnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(flatten)]
    annotations: AnnotateResponse,
    error: Option<Status>,
}

/// Per-image error status
#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Vision API client
pub struct VisionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl VisionClient {
    pub fn new(config: &VisionConfig, api_key: String) -> Result<Self, OracleError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }

    fn first_response(batch: BatchAnnotateResponse) -> Result<AnnotateResponse, OracleError> {
        let response = batch
            .responses
            .into_iter()
            .next()
            .ok_or(OracleError::EmptyResponse)?;

        if let Some(status) = response.error {
            return Err(OracleError::Rejected(format!(
                "code {}: {}",
                status.code, status.message
            )));
        }

        Ok(response.annotations)
    }
}

#[async_trait::async_trait]
impl AnnotationOracle for VisionClient {
    async fn annotate(
        &self,
        image: &[u8],
        features: &[Feature],
    ) -> Result<AnnotateResponse, OracleError> {
        let body = BatchAnnotateRequest {
            requests: [AnnotateImageRequest {
                image: ImageContent {
                    content: STANDARD.encode(image),
                },
                features,
            }],
        };

        tracing::debug!(
            image_bytes = image.len(),
            features = features.len(),
            "Querying Vision API"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(OracleError::ApiError(status.as_u16(), error_text));
        }

        let batch: BatchAnnotateResponse = response
            .json()
            .await
            .map_err(|e| OracleError::ParseError(e.to_string()))?;

        Self::first_response(batch)
    }
}
