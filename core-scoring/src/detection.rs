// =====================================================================================
// File: core-scoring/src/detection.rs
// Description: Asset validation against declared type via object detection,
//              with a substring fallback when no model is installed
// =====================================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::capabilities::DetectionModel;
use crate::config::DetectionConfig;
use crate::media::{MediaLoader, MediaSource};
use crate::types::{Detection, DetectionDetails, EvidenceImage, ObjectDetectionResult};

/// Matches detected labels against the declared asset type
pub struct ObjectDetector {
    loader: Arc<MediaLoader>,
    model: Option<Arc<dyn DetectionModel>>,
    config: DetectionConfig,
}

impl ObjectDetector {
    pub fn new(
        loader: Arc<MediaLoader>,
        model: Option<Arc<dyn DetectionModel>>,
        config: DetectionConfig,
    ) -> Self {
        Self {
            loader,
            model,
            config,
        }
    }

    pub fn analyze(
        &self,
        images: &[EvidenceImage],
        declared_asset: Option<&str>,
    ) -> Vec<ObjectDetectionResult> {
        images
            .iter()
            .map(|image| match self.loader.load_bytes(image) {
                Ok(payload) => self.run_detection(image, &payload, declared_asset),
                Err(err) => ObjectDetectionResult {
                    image_id: image.id.clone(),
                    detected_objects: Vec::new(),
                    asset_match: false,
                    asset_match_score: 0.0,
                    details: DetectionDetails {
                        mode: "error".to_string(),
                        declared_asset: declared_asset.map(str::to_string),
                        matched_label: None,
                        error: Some(err.to_string()),
                    },
                },
            })
            .collect()
    }

    fn run_detection(
        &self,
        image: &EvidenceImage,
        payload: &[u8],
        declared_asset: Option<&str>,
    ) -> ObjectDetectionResult {
        let keywords = self.keywords(declared_asset, image.declared_asset_type.as_deref());

        let Some(model) = &self.model else {
            // Fallback: trust the declared per-image type and match by substring
            let haystack = image
                .declared_asset_type
                .as_deref()
                .unwrap_or_default()
                .to_lowercase();
            let matched = !keywords.is_empty()
                && keywords.iter().any(|keyword| haystack.contains(keyword));
            let score = if matched { 1.0 } else { 0.0 };
            return self.result_from_score(
                &image.id,
                Vec::new(),
                score,
                declared_asset,
                "fallback",
                None,
                None,
            );
        };

        let detections = match model.detect(
            payload,
            self.config.confidence_threshold,
            self.config.iou_threshold,
        ) {
            Ok(detections) => detections,
            Err(err) => {
                return self.result_from_score(
                    &image.id,
                    Vec::new(),
                    0.0,
                    declared_asset,
                    "model",
                    None,
                    Some(err.to_string()),
                )
            }
        };

        let mut best_match = 0.0_f64;
        let mut matched_label: Option<String> = None;
        for detection in &detections {
            let label = detection.label.to_lowercase();
            if keywords.iter().any(|keyword| label.contains(keyword))
                && detection.confidence > best_match
            {
                best_match = detection.confidence;
                matched_label = Some(detection.label.clone());
            }
        }

        debug!(image_id = %image.id, best_match, "Detection completed");
        self.result_from_score(
            &image.id,
            detections,
            best_match,
            declared_asset,
            "model",
            matched_label,
            None,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn result_from_score(
        &self,
        image_id: &str,
        detected_objects: Vec<Detection>,
        match_score: f64,
        declared_asset: Option<&str>,
        mode: &str,
        matched_label: Option<String>,
        error: Option<String>,
    ) -> ObjectDetectionResult {
        let normalized = if match_score >= self.config.confidence_threshold {
            1.0
        } else {
            0.0
        };
        ObjectDetectionResult {
            image_id: image_id.to_string(),
            detected_objects,
            asset_match: normalized == 1.0,
            asset_match_score: normalized,
            details: DetectionDetails {
                mode: mode.to_string(),
                declared_asset: declared_asset.map(str::to_string),
                matched_label,
                error,
            },
        }
    }

    /// Keyword set: the declared asset (package-level, else per-image) plus its
    /// configured synonyms, lowercased and deduplicated
    fn keywords(&self, declared_asset: Option<&str>, fallback_asset: Option<&str>) -> Vec<String> {
        let asset_key = declared_asset
            .or(fallback_asset)
            .unwrap_or_default()
            .to_lowercase();
        if asset_key.is_empty() {
            return Vec::new();
        }
        let mut keywords: BTreeSet<String> = BTreeSet::new();
        keywords.insert(asset_key.clone());
        if let Some(synonyms) = self.config.asset_synonyms.get(&asset_key) {
            keywords.extend(synonyms.iter().map(|s| s.to_lowercase()));
        }
        keywords.into_iter().collect()
    }
}
