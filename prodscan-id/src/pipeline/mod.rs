//! Identification Pipeline
//!
//! Resolves one uploaded image to catalog products, region by region.
//!
//! # Architecture
//! - **Prepare** (pre-stream): localize objects, probe dimensions, segment regions
//! - **Per region**: analyze → resolve term → resolve catalog entry
//! - **Emit**: [`StreamEmitter`] sends `count`, one event per region in index order, `done`
//!
//! # Error Handling
//! - Failures before segmentation abort the request ([`PipelineError`])
//! - Per-region failures are isolated: they become an `error` event or a
//!   degraded `product` event and the next region still runs

pub mod analyzer;
pub mod catalog_resolver;
pub mod emitter;
pub mod segmenter;
pub mod term_resolver;

pub use analyzer::{AnalysisError, RegionAnalyzer};
pub use catalog_resolver::{CatalogResolver, CatalogTier, TierOutcome};
pub use emitter::{EventStream, RunOutcome, StreamEmitter};
pub use segmenter::RegionSegmenter;
pub use term_resolver::{TermError, TermResolver};

use crate::types::{
    AnnotationOracle, CatalogService, CodecError, Feature, FeatureType, ImageCodec,
    ImageDimensions, OracleError, Region, TermOracle,
};
use axum::body::Bytes;
use prodscan_common::config::PipelineConfig;
use prodscan_common::{PipelineEvent, ResolutionMethod};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Title reported for a region whose search term could not be generated
pub const UNIDENTIFIED_TITLE: &str = "Unidentified product";

/// Request-level failures (nothing has been streamed yet)
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported image: {0}")]
    InvalidImage(CodecError),

    #[error("Annotation service unavailable: {0}")]
    OracleUnavailable(OracleError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// External collaborators the pipeline calls
#[derive(Clone)]
pub struct Oracles {
    pub annotation: Arc<dyn AnnotationOracle>,
    pub terms: Arc<dyn TermOracle>,
    pub catalog: Arc<dyn CatalogService>,
    pub codec: Arc<dyn ImageCodec>,
}

/// Upload that has been segmented and is ready to stream
#[derive(Debug, Clone)]
pub struct SegmentedUpload {
    pub image: Bytes,
    pub dimensions: ImageDimensions,
    pub regions: Vec<Region>,
}

/// Identification pipeline shared by all requests
pub struct Pipeline {
    config: PipelineConfig,
    annotation: Arc<dyn AnnotationOracle>,
    codec: Arc<dyn ImageCodec>,
    segmenter: RegionSegmenter,
    analyzer: RegionAnalyzer,
    term_resolver: TermResolver,
    catalog_resolver: CatalogResolver,
}

impl Pipeline {
    pub fn new(oracles: Oracles, config: PipelineConfig, target_language: impl Into<String>) -> Self {
        Self {
            analyzer: RegionAnalyzer::new(
                Arc::clone(&oracles.annotation),
                Arc::clone(&oracles.codec),
            ),
            term_resolver: TermResolver::new(oracles.terms, target_language),
            catalog_resolver: CatalogResolver::new(oracles.catalog),
            segmenter: RegionSegmenter::default(),
            annotation: oracles.annotation,
            codec: oracles.codec,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Segment the upload into regions
    ///
    /// Runs before any event is streamed, so errors here become an HTTP error.
    /// Localization runs first: an unreachable oracle is reported as such even
    /// when the image would not decode.
    pub async fn prepare(&self, image: Bytes) -> Result<SegmentedUpload, PipelineError> {
        let features = [Feature::with_max(
            FeatureType::ObjectLocalization,
            self.config.max_objects,
        )];
        let response = self
            .annotation
            .annotate(&image, &features)
            .await
            .map_err(PipelineError::OracleUnavailable)?;

        let dimensions = self.read_dimensions(&image).await?;

        let objects = &response.localized_object_annotations;
        let regions = self.segmenter.segment(dimensions, objects);

        info!(
            width = dimensions.width,
            height = dimensions.height,
            objects = objects.len(),
            regions = regions.len(),
            "Image segmented"
        );

        Ok(SegmentedUpload {
            image,
            dimensions,
            regions,
        })
    }

    async fn read_dimensions(&self, image: &Bytes) -> Result<ImageDimensions, PipelineError> {
        let codec = Arc::clone(&self.codec);
        let image = image.clone();
        tokio::task::spawn_blocking(move || codec.metadata(&image))
            .await
            .map_err(|e| PipelineError::Internal(format!("metadata task failed: {}", e)))?
            .map_err(PipelineError::InvalidImage)
    }

    /// Run one region through analyze → term → catalog
    ///
    /// Never fails: every outcome is expressed as an event for `index`.
    #[instrument(skip(self, image, region))]
    pub async fn process_region(&self, image: &Bytes, index: usize, region: Region) -> PipelineEvent {
        let bundle = match self.analyzer.analyze(image, region).await {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(stage = e.stage(), error = %e, ?region, "Region analysis failed");
                return PipelineEvent::Error {
                    index,
                    message: e.to_string(),
                };
            }
        };

        let term = match self.term_resolver.resolve(&bundle).await {
            Ok(term) => term,
            Err(e) => {
                warn!(stage = "term", error = %e, "Search term generation failed");
                return PipelineEvent::Product {
                    index,
                    term: None,
                    title: UNIDENTIFIED_TITLE.to_string(),
                    image: None,
                    link: None,
                    method: ResolutionMethod::Unresolved,
                };
            }
        };

        let entry = self.catalog_resolver.resolve(&bundle.barcodes, &term).await;

        info!(
            term = %term,
            method = entry.method.as_str(),
            "Region resolved"
        );

        PipelineEvent::Product {
            index,
            title: entry.title.unwrap_or_else(|| term.clone()),
            image: entry.image_url,
            link: entry.link,
            method: entry.method,
            term: Some(term),
        }
    }
}
