//! Region analysis
//!
//! Crops one region out of the upload and asks the annotation oracle for every
//! signal the term resolver can use, in a single request.

use crate::types::{
    AnnotateResponse, AnnotationOracle, CodecError, Descriptor, Feature, FeatureType, ImageCodec,
    LogoSignal, OracleError, Region, SignalBundle,
};
use axum::body::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Features requested for every region crop
pub const REGION_FEATURES: [Feature; 6] = [
    Feature::new(FeatureType::BarcodeDetection),
    Feature::with_max(FeatureType::LogoDetection, 5),
    Feature::new(FeatureType::DocumentTextDetection),
    Feature::with_max(FeatureType::WebDetection, 5),
    Feature::with_max(FeatureType::LabelDetection, 10),
    Feature::new(FeatureType::ObjectLocalization),
];

/// Region analysis errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Crop failed: {0}")]
    Crop(#[from] CodecError),

    #[error("Crop task failed: {0}")]
    CropTask(String),

    #[error("Annotation failed: {0}")]
    Annotation(#[from] OracleError),
}

impl AnalysisError {
    /// Pipeline stage name for diagnostics
    pub fn stage(&self) -> &'static str {
        match self {
            AnalysisError::Crop(_) | AnalysisError::CropTask(_) => "crop",
            AnalysisError::Annotation(_) => "annotate",
        }
    }
}

/// Extracts a [`SignalBundle`] for one region
pub struct RegionAnalyzer {
    oracle: Arc<dyn AnnotationOracle>,
    codec: Arc<dyn ImageCodec>,
}

impl RegionAnalyzer {
    pub fn new(oracle: Arc<dyn AnnotationOracle>, codec: Arc<dyn ImageCodec>) -> Self {
        Self { oracle, codec }
    }

    pub async fn analyze(&self, image: &Bytes, region: Region) -> Result<SignalBundle, AnalysisError> {
        let crop = self.crop(image, region).await?;
        debug!(crop_bytes = crop.len(), "Region cropped");

        let response = self.oracle.annotate(&crop, &REGION_FEATURES).await?;
        let bundle = build_signal_bundle(response);

        debug!(
            barcodes = bundle.barcodes.len(),
            logos = bundle.logos.len(),
            text_chars = bundle.text.len(),
            "Region annotated"
        );
        Ok(bundle)
    }

    async fn crop(&self, image: &Bytes, region: Region) -> Result<Vec<u8>, AnalysisError> {
        let codec = Arc::clone(&self.codec);
        let image = image.clone();
        tokio::task::spawn_blocking(move || codec.crop(&image, &region))
            .await
            .map_err(|e| AnalysisError::CropTask(e.to_string()))?
            .map_err(AnalysisError::Crop)
    }
}

/// Flatten an annotation response into a signal bundle
///
/// Absent annotation lists become empty; nothing here fails. Values are kept
/// as detected (blank barcodes are skipped by the catalog tier).
pub fn build_signal_bundle(response: AnnotateResponse) -> SignalBundle {
    let barcodes = response
        .barcode_annotations
        .into_iter()
        .map(|barcode| barcode.raw_value)
        .collect();

    let logos = response
        .logo_annotations
        .into_iter()
        .map(|logo| LogoSignal {
            name: logo.description,
            score: logo.score,
        })
        .collect();

    let text = response
        .full_text_annotation
        .map(|annotation| annotation.text.trim().to_string())
        .unwrap_or_default();

    let web_entities = response
        .web_detection
        .map(|web| web.web_entities)
        .unwrap_or_default()
        .into_iter()
        .map(|entity| Descriptor {
            desc: entity.description.unwrap_or_default(),
            score: entity.score,
        })
        .collect();

    let labels = response
        .label_annotations
        .into_iter()
        .map(|label| Descriptor {
            desc: label.description,
            score: label.score,
        })
        .collect();

    let objects = response
        .localized_object_annotations
        .into_iter()
        .map(|object| object.name)
        .collect();

    SignalBundle {
        barcodes,
        logos,
        text,
        web_entities,
        labels,
        objects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageDimensions;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedOracle {
        response: serde_json::Value,
        requested: Mutex<Vec<Feature>>,
    }

    #[async_trait::async_trait]
    impl AnnotationOracle for FixedOracle {
        async fn annotate(
            &self,
            _image: &[u8],
            features: &[Feature],
        ) -> Result<AnnotateResponse, OracleError> {
            self.requested.lock().unwrap().extend_from_slice(features);
            serde_json::from_value(self.response.clone())
                .map_err(|e| OracleError::ParseError(e.to_string()))
        }
    }

    struct EchoCodec;

    impl ImageCodec for EchoCodec {
        fn metadata(&self, _image: &[u8]) -> Result<ImageDimensions, CodecError> {
            Ok(ImageDimensions {
                width: 100,
                height: 100,
            })
        }

        fn crop(&self, image: &[u8], region: &Region) -> Result<Vec<u8>, CodecError> {
            if region.is_empty() {
                return Err(CodecError::InvalidGeometry {
                    region: *region,
                    width: 100,
                    height: 100,
                });
            }
            Ok(image.to_vec())
        }
    }

    fn region() -> Region {
        Region {
            left: 0,
            top: 0,
            width: 50,
            height: 50,
        }
    }

    #[test]
    fn test_bundle_from_full_response() {
        let response: AnnotateResponse = serde_json::from_value(json!({
            "barcodeAnnotations": [{"rawValue": "8410128000019"}, {"rawValue": "  "}],
            "logoAnnotations": [{"description": "Font Vella", "score": 0.92}],
            "fullTextAnnotation": {"text": "  Font Vella\nAgua Mineral Natural\n"},
            "webDetection": {"webEntities": [
                {"description": "Mineral water", "score": 0.8},
                {"score": 0.4}
            ]},
            "labelAnnotations": [{"description": "Bottle", "score": 0.95}],
            "localizedObjectAnnotations": [{"name": "Bottle", "score": 0.9}]
        }))
        .unwrap();

        let bundle = build_signal_bundle(response);

        assert_eq!(
            bundle.barcodes,
            vec!["8410128000019".to_string(), "  ".to_string()],
            "barcodes are passed through as detected"
        );
        assert_eq!(bundle.logos[0].name, "Font Vella");
        assert_eq!(bundle.text, "Font Vella\nAgua Mineral Natural");
        assert_eq!(bundle.web_entities.len(), 2);
        assert_eq!(bundle.web_entities[0].desc, "Mineral water");
        assert_eq!(bundle.web_entities[1].desc, "", "missing description reads as empty");
        assert_eq!(bundle.labels[0].desc, "Bottle");
        assert_eq!(bundle.objects, vec!["Bottle".to_string()]);
    }

    #[test]
    fn test_bundle_from_empty_response() {
        let bundle = build_signal_bundle(AnnotateResponse::default());
        assert_eq!(bundle, SignalBundle::default());
        assert_eq!(bundle.text, "");
    }

    #[tokio::test]
    async fn test_analyze_requests_all_region_features() {
        let oracle = Arc::new(FixedOracle {
            response: json!({"fullTextAnnotation": {"text": "Galletas"}}),
            requested: Mutex::new(Vec::new()),
        });
        let analyzer = RegionAnalyzer::new(oracle.clone(), Arc::new(EchoCodec));

        let bundle = analyzer
            .analyze(&Bytes::from_static(b"img"), region())
            .await
            .unwrap();

        assert_eq!(bundle.text, "Galletas");
        let requested = oracle.requested.lock().unwrap();
        assert_eq!(requested.as_slice(), &REGION_FEATURES);
    }

    #[tokio::test]
    async fn test_crop_failure_skips_oracle() {
        let oracle = Arc::new(FixedOracle {
            response: json!({}),
            requested: Mutex::new(Vec::new()),
        });
        let analyzer = RegionAnalyzer::new(oracle.clone(), Arc::new(EchoCodec));

        let empty = Region {
            width: 0,
            ..region()
        };
        let err = analyzer
            .analyze(&Bytes::from_static(b"img"), empty)
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Crop(_)));
        assert_eq!(err.stage(), "crop");
        assert!(oracle.requested.lock().unwrap().is_empty());
    }
}
