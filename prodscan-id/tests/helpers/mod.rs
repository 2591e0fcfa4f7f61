//! Test doubles for prodscan-id integration tests
//!
//! - StubCodec: fixed dimensions, crops encode their own region
//! - StubAnnotator: localization response plus per-crop responses and delays
//! - StubTermOracle: replies chosen by a marker found in the prompt
//! - StubCatalog: in-memory codes and search results with call logs

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use prodscan_common::config::PipelineConfig;
use prodscan_common::PipelineEvent;
use prodscan_id::pipeline::{Oracles, Pipeline, RegionSegmenter, RunOutcome, StreamEmitter};
use prodscan_id::types::{
    AnnotateResponse, AnnotationOracle, BarcodeAnnotation, BoundingPoly, CatalogError,
    CatalogRecord, CatalogService, CodecError, EntityAnnotation, Feature, FeatureType,
    ImageCodec, ImageDimensions, LocalizedObjectAnnotation, NormalizedVertex, OracleError,
    Region, TermOracle, TermRequest, TextAnnotation,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Upload bytes the stub codec accepts
pub const FAKE_IMAGE: &[u8] = b"fake-jpeg-bytes";

/// Upload bytes the stub codec refuses to decode
pub const UNDECODABLE_IMAGE: &[u8] = b"not an image";

/// Bytes the stub codec returns for a crop of `region`
pub fn crop_key(region: &Region) -> Vec<u8> {
    format!(
        "crop:{}:{}:{}:{}",
        region.left, region.top, region.width, region.height
    )
    .into_bytes()
}

// ============================================================================
// Codec
// ============================================================================

pub struct StubCodec {
    pub dimensions: ImageDimensions,
    pub failing: Mutex<HashSet<Region>>,
}

impl StubCodec {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            dimensions: ImageDimensions { width, height },
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_crop(&self, region: Region) {
        self.failing.lock().unwrap().insert(region);
    }
}

impl ImageCodec for StubCodec {
    fn metadata(&self, image: &[u8]) -> Result<ImageDimensions, CodecError> {
        if image == UNDECODABLE_IMAGE {
            return Err(CodecError::Decode("unrecognized format".to_string()));
        }
        Ok(self.dimensions)
    }

    fn crop(&self, _image: &[u8], region: &Region) -> Result<Vec<u8>, CodecError> {
        if self.failing.lock().unwrap().contains(region) {
            return Err(CodecError::InvalidGeometry {
                region: *region,
                width: self.dimensions.width,
                height: self.dimensions.height,
            });
        }
        Ok(crop_key(region))
    }
}

// ============================================================================
// Annotation oracle
// ============================================================================

#[derive(Default)]
pub struct StubAnnotator {
    pub objects: Mutex<Vec<LocalizedObjectAnnotation>>,
    pub localization_fails: Mutex<bool>,
    pub responses: Mutex<HashMap<Vec<u8>, AnnotateResponse>>,
    pub delays: Mutex<HashMap<Vec<u8>, Duration>>,
    /// Crops whose annotation call fails
    pub failing: Mutex<HashSet<Vec<u8>>>,
    /// Crops in the order their annotation finished
    pub completed: Mutex<Vec<Vec<u8>>>,
    pub region_calls: Mutex<usize>,
}

impl StubAnnotator {
    pub fn with_objects(objects: Vec<LocalizedObjectAnnotation>) -> Self {
        let stub = Self::default();
        *stub.objects.lock().unwrap() = objects;
        stub
    }

    pub fn respond(&self, region: &Region, response: AnnotateResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(crop_key(region), response);
    }

    pub fn delay(&self, region: &Region, delay: Duration) {
        self.delays.lock().unwrap().insert(crop_key(region), delay);
    }

    pub fn fail_region(&self, region: &Region) {
        self.failing.lock().unwrap().insert(crop_key(region));
    }

    pub fn region_calls(&self) -> usize {
        *self.region_calls.lock().unwrap()
    }

    pub fn completed(&self) -> Vec<Vec<u8>> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnnotationOracle for StubAnnotator {
    async fn annotate(
        &self,
        image: &[u8],
        features: &[Feature],
    ) -> Result<AnnotateResponse, OracleError> {
        let localization_only =
            features.len() == 1 && features[0].feature_type == FeatureType::ObjectLocalization;

        if localization_only {
            if *self.localization_fails.lock().unwrap() {
                return Err(OracleError::NetworkError("connection refused".to_string()));
            }
            return Ok(AnnotateResponse {
                localized_object_annotations: self.objects.lock().unwrap().clone(),
                ..AnnotateResponse::default()
            });
        }

        *self.region_calls.lock().unwrap() += 1;

        let delay = self.delays.lock().unwrap().get(image).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(image) {
            return Err(OracleError::ApiError(503, "backend unavailable".to_string()));
        }

        let response = self
            .responses
            .lock()
            .unwrap()
            .get(image)
            .cloned()
            .unwrap_or_default();
        self.completed.lock().unwrap().push(image.to_vec());
        Ok(response)
    }
}

// ============================================================================
// Term oracle
// ============================================================================

#[derive(Default)]
pub struct StubTermOracle {
    /// (marker, reply); `None` reply fails the call
    pub replies: Mutex<Vec<(String, Option<String>)>>,
    pub default_reply: Option<String>,
    pub calls: Mutex<usize>,
}

impl StubTermOracle {
    pub fn replying(default_reply: &str) -> Self {
        Self {
            default_reply: Some(default_reply.to_string()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn reply_when(&self, marker: &str, reply: Option<&str>) {
        self.replies
            .lock()
            .unwrap()
            .push((marker.to_string(), reply.map(str::to_string)));
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TermOracle for StubTermOracle {
    async fn generate(&self, request: &TermRequest) -> Result<String, OracleError> {
        *self.calls.lock().unwrap() += 1;

        let matched = self
            .replies
            .lock()
            .unwrap()
            .iter()
            .find(|(marker, _)| request.prompt.contains(marker.as_str()))
            .map(|(_, reply)| reply.clone());

        matched
            .unwrap_or_else(|| self.default_reply.clone())
            .ok_or_else(|| OracleError::ApiError(500, "model overloaded".to_string()))
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Default)]
pub struct StubCatalog {
    pub by_code: Mutex<HashMap<String, CatalogRecord>>,
    pub by_term: Mutex<HashMap<String, Vec<CatalogRecord>>>,
    pub code_lookups: Mutex<Vec<String>>,
    pub searches: Mutex<Vec<String>>,
}

impl StubCatalog {
    pub fn add_code(&self, code: &str, record: CatalogRecord) {
        self.by_code.lock().unwrap().insert(code.to_string(), record);
    }

    pub fn add_search(&self, term: &str, records: Vec<CatalogRecord>) {
        self.by_term.lock().unwrap().insert(term.to_string(), records);
    }

    pub fn code_lookups(&self) -> Vec<String> {
        self.code_lookups.lock().unwrap().clone()
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogService for StubCatalog {
    async fn get_by_code(&self, code: &str) -> Result<Option<CatalogRecord>, CatalogError> {
        self.code_lookups.lock().unwrap().push(code.to_string());
        Ok(self.by_code.lock().unwrap().get(code).cloned())
    }

    async fn search_by_term(&self, term: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
        self.searches.lock().unwrap().push(term.to_string());
        Ok(self
            .by_term
            .lock()
            .unwrap()
            .get(term)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Stubs wired into one pipeline
pub struct Harness {
    pub codec: Arc<StubCodec>,
    pub annotator: Arc<StubAnnotator>,
    pub terms: Arc<StubTermOracle>,
    pub catalog: Arc<StubCatalog>,
}

impl Harness {
    pub fn new(codec: StubCodec, annotator: StubAnnotator, terms: StubTermOracle) -> Self {
        Self {
            codec: Arc::new(codec),
            annotator: Arc::new(annotator),
            terms: Arc::new(terms),
            catalog: Arc::new(StubCatalog::default()),
        }
    }

    pub fn pipeline(&self, config: PipelineConfig) -> Pipeline {
        let oracles = Oracles {
            annotation: self.annotator.clone(),
            terms: self.terms.clone(),
            catalog: self.catalog.clone(),
            codec: self.codec.clone(),
        };
        Pipeline::new(oracles, config, "Spanish")
    }

    /// Regions the pipeline will derive from the annotator's objects
    pub fn expected_regions(&self) -> Vec<Region> {
        RegionSegmenter::default().segment(
            self.codec.dimensions,
            &self.annotator.objects.lock().unwrap(),
        )
    }
}

/// Axis-aligned detection from normalized corner coordinates
pub fn object(name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> LocalizedObjectAnnotation {
    LocalizedObjectAnnotation {
        name: name.to_string(),
        score: 0.9,
        bounding_poly: BoundingPoly {
            normalized_vertices: vec![
                NormalizedVertex { x: x0, y: y0 },
                NormalizedVertex { x: x1, y: y0 },
                NormalizedVertex { x: x1, y: y1 },
                NormalizedVertex { x: x0, y: y1 },
            ],
        },
    }
}

/// Region annotation carrying OCR text and optional barcodes
pub fn region_response(text: &str, barcodes: &[&str]) -> AnnotateResponse {
    AnnotateResponse {
        barcode_annotations: barcodes
            .iter()
            .map(|code| BarcodeAnnotation {
                raw_value: code.to_string(),
            })
            .collect(),
        label_annotations: vec![EntityAnnotation {
            description: "Food".to_string(),
            score: 0.8,
        }],
        full_text_annotation: Some(TextAnnotation {
            text: text.to_string(),
        }),
        ..AnnotateResponse::default()
    }
}

pub fn record(title: &str, image: &str, link: &str) -> CatalogRecord {
    CatalogRecord {
        title: Some(title.to_string()),
        image_url: Some(image.to_string()),
        link: Some(link.to_string()),
    }
}

/// Prepare and stream one upload, collecting every event
pub async fn run_upload(pipeline: Pipeline) -> (Vec<PipelineEvent>, RunOutcome) {
    let pipeline = Arc::new(pipeline);
    let upload = pipeline
        .prepare(Bytes::from_static(FAKE_IMAGE))
        .await
        .expect("prepare should succeed");

    let mut stream = StreamEmitter::spawn(pipeline, upload);
    let mut events = Vec::new();
    while let Some(event) = stream.events.recv().await {
        events.push(event);
    }
    let outcome = stream.task.await.expect("emitter task panicked");
    (events, outcome)
}
