// =====================================================================================
// File: core-scoring/src/aggregation.rs
// Description: Weighted fusion of component risk signals into the final score,
//              tier, and routing decision
// =====================================================================================

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{ThresholdConfig, WeightConfig};
use crate::types::{
    DuplicateResult, FraudScoreResult, ImageQualityResult, ObjectDetectionResult, OcrResult,
    RiskTier,
};

/// The five component risks on a 0-100 scale, higher is worse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskComponents {
    pub image_quality: f64,
    pub asset_match: f64,
    pub ocr: f64,
    pub duplicates: f64,
    pub fraud: f64,
}

/// The aggregated verdict for one case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateOutcome {
    pub final_risk_score: f64,
    pub risk_tier: RiskTier,
    pub routing_decision: String,
    pub components: RiskComponents,
}

/// Combines layer scores into a final risk score and routing decision. The
/// weights are held behind an atomic pointer so administrative hot-swaps take
/// effect on the next scoring call without locking.
pub struct RiskAggregator {
    weights: ArcSwap<WeightConfig>,
    thresholds: ThresholdConfig,
}

impl RiskAggregator {
    pub fn new(weights: WeightConfig, thresholds: ThresholdConfig) -> Self {
        Self {
            weights: ArcSwap::from_pointee(weights),
            thresholds,
        }
    }

    pub fn update_weights(&self, weights: WeightConfig) {
        self.weights.store(Arc::new(weights));
    }

    pub fn current_weights(&self) -> WeightConfig {
        WeightConfig::clone(&self.weights.load())
    }

    pub fn aggregate(
        &self,
        quality: &[ImageQualityResult],
        detection: &[ObjectDetectionResult],
        ocr_results: &[OcrResult],
        duplicates: &[DuplicateResult],
        fraud_score: &FraudScoreResult,
    ) -> AggregateOutcome {
        let components = Self::components(quality, detection, ocr_results, duplicates, fraud_score);
        let weights = self.weights.load();

        let weighted_sum = weights.image_quality_weight * components.image_quality
            + weights.asset_match_weight * components.asset_match
            + weights.ocr_match_weight * components.ocr
            + weights.duplicate_weight * components.duplicates
            + weights.fraud_score_weight * components.fraud;
        let final_risk_score = round2(weighted_sum / weights.total());
        let risk_tier = self.risk_tier(final_risk_score);

        AggregateOutcome {
            final_risk_score,
            risk_tier,
            routing_decision: risk_tier.routing_decision().to_string(),
            components,
        }
    }

    fn components(
        quality: &[ImageQualityResult],
        detection: &[ObjectDetectionResult],
        ocr_results: &[OcrResult],
        duplicates: &[DuplicateResult],
        fraud_score: &FraudScoreResult,
    ) -> RiskComponents {
        let avg_quality = if quality.is_empty() {
            1.0
        } else {
            quality.iter().map(|r| r.quality_score).sum::<f64>() / quality.len() as f64
        };

        let avg_detection = if detection.is_empty() {
            1.0
        } else {
            detection.iter().map(|r| r.asset_match_score).sum::<f64>() / detection.len() as f64
        };

        let ocr_risk = if ocr_results.is_empty() {
            0.0
        } else {
            ocr_results.iter().map(OcrResult::penalty_total).sum::<f64>()
                / ocr_results.len() as f64
        };

        let duplicate_penalty: f64 = duplicates.iter().map(|r| r.penalty_points).sum();

        RiskComponents {
            image_quality: round2((1.0 - avg_quality) * 100.0),
            asset_match: round2((1.0 - avg_detection) * 100.0),
            ocr: round2(ocr_risk),
            duplicates: round2(duplicate_penalty.min(100.0)),
            fraud: round2(fraud_score.fraud_score),
        }
    }

    fn risk_tier(&self, final_score: f64) -> RiskTier {
        if final_score <= self.thresholds.auto_approve_threshold as f64 {
            RiskTier::AutoApprove
        } else if final_score <= self.thresholds.officer_review_threshold as f64 {
            RiskTier::OfficerReview
        } else {
            RiskTier::VideoVerify
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
