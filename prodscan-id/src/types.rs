//! Core Types and Trait Definitions for prodscan-id
//!
//! Defines the data carried through the identification pipeline and the
//! oracle traits the pipeline calls out to:
//! - **AnnotationOracle:** visual annotation (object localization, barcodes, logos, OCR, ...)
//! - **TermOracle:** search term generation
//! - **CatalogService:** product lookup by code and by term
//! - **ImageCodec:** dimension probing and region cropping
//!
//! Production implementations live in [`crate::services`]; tests substitute stubs.

use prodscan_common::ResolutionMethod;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Geometry
// ============================================================================

/// Pixel dimensions of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Rectangular crop area in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Region covering the whole image
    pub fn full(dimensions: ImageDimensions) -> Self {
        Self {
            left: 0,
            top: 0,
            width: dimensions.width,
            height: dimensions.height,
        }
    }

    pub fn right(&self) -> u64 {
        self.left as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.top as u64 + self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn fits_within(&self, dimensions: ImageDimensions) -> bool {
        self.right() <= dimensions.width as u64 && self.bottom() <= dimensions.height as u64
    }
}

// ============================================================================
// Signal Bundle
// ============================================================================

/// Logo detected in a region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogoSignal {
    pub name: String,
    pub score: f32,
}

/// Scored textual descriptor (web entity or label)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptor {
    pub desc: String,
    pub score: f32,
}

/// Visual cues extracted for one region
///
/// Serialized field order is fixed; the term oracle request embeds this as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalBundle {
    pub barcodes: Vec<String>,
    pub logos: Vec<LogoSignal>,
    pub text: String,
    pub web_entities: Vec<Descriptor>,
    pub labels: Vec<Descriptor>,
    pub objects: Vec<String>,
}

// ============================================================================
// Annotation Oracle
// ============================================================================

/// Annotation feature kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureType {
    ObjectLocalization,
    BarcodeDetection,
    LogoDetection,
    DocumentTextDetection,
    WebDetection,
    LabelDetection,
}

/// One requested annotation feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    #[serde(rename = "type")]
    pub feature_type: FeatureType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

impl Feature {
    pub const fn new(feature_type: FeatureType) -> Self {
        Self {
            feature_type,
            max_results: None,
        }
    }

    pub const fn with_max(feature_type: FeatureType, max_results: u32) -> Self {
        Self {
            feature_type,
            max_results: Some(max_results),
        }
    }
}

/// Annotations for one image; every list defaults to empty when absent
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotateResponse {
    pub localized_object_annotations: Vec<LocalizedObjectAnnotation>,
    pub barcode_annotations: Vec<BarcodeAnnotation>,
    pub logo_annotations: Vec<EntityAnnotation>,
    pub label_annotations: Vec<EntityAnnotation>,
    pub full_text_annotation: Option<TextAnnotation>,
    pub web_detection: Option<WebDetection>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalizedObjectAnnotation {
    pub name: String,
    pub score: f32,
    pub bounding_poly: BoundingPoly,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoundingPoly {
    pub normalized_vertices: Vec<NormalizedVertex>,
}

/// Vertex in `[0, 1]` image-relative coordinates (omitted coordinates are 0)
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NormalizedVertex {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BarcodeAnnotation {
    pub raw_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EntityAnnotation {
    pub description: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TextAnnotation {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebDetection {
    pub web_entities: Vec<WebEntity>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WebEntity {
    pub description: Option<String>,
    pub score: f32,
}

/// Oracle call errors (annotation and term generation)
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Oracle returned no result")]
    EmptyResponse,

    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Visual-annotation oracle
#[async_trait::async_trait]
pub trait AnnotationOracle: Send + Sync {
    /// Annotate `image` with the requested features
    async fn annotate(
        &self,
        image: &[u8],
        features: &[Feature],
    ) -> Result<AnnotateResponse, OracleError>;
}

// ============================================================================
// Term Oracle
// ============================================================================

/// Fully built term-generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermRequest {
    pub system: String,
    pub prompt: String,
}

/// Term-generation oracle
///
/// Returns the raw reply; normalization happens in the term resolver.
#[async_trait::async_trait]
pub trait TermOracle: Send + Sync {
    async fn generate(&self, request: &TermRequest) -> Result<String, OracleError>;
}

// ============================================================================
// Catalog
// ============================================================================

/// Product record as returned by the catalog service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRecord {
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
}

/// Catalog resolution result for one region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub method: ResolutionMethod,
}

impl CatalogEntry {
    pub fn from_record(record: CatalogRecord, method: ResolutionMethod) -> Self {
        Self {
            title: record.title,
            image_url: record.image_url,
            link: record.link,
            method,
        }
    }

    /// No tier matched
    pub fn unresolved() -> Self {
        Self {
            title: None,
            image_url: None,
            link: None,
            method: ResolutionMethod::Unresolved,
        }
    }
}

/// Catalog lookup errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Product catalog
#[async_trait::async_trait]
pub trait CatalogService: Send + Sync {
    /// Exact lookup by barcode; `Ok(None)` when the code is unknown
    async fn get_by_code(&self, code: &str) -> Result<Option<CatalogRecord>, CatalogError>;

    /// Free-text search; results in catalog relevance order
    async fn search_by_term(&self, term: &str) -> Result<Vec<CatalogRecord>, CatalogError>;
}

// ============================================================================
// Image Codec
// ============================================================================

/// Image decoding/cropping errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Invalid crop region {region:?} for {width}x{height} image")]
    InvalidGeometry {
        region: Region,
        width: u32,
        height: u32,
    },

    #[error("Failed to encode crop: {0}")]
    Encode(String),
}

/// Image metadata and cropping
///
/// Calls are CPU-bound; the pipeline runs them on the blocking pool.
pub trait ImageCodec: Send + Sync {
    fn metadata(&self, image: &[u8]) -> Result<ImageDimensions, CodecError>;

    /// Crop `region` out of `image`, returning encoded bytes
    fn crop(&self, image: &[u8], region: &Region) -> Result<Vec<u8>, CodecError>;
}
