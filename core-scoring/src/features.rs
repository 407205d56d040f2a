// =====================================================================================
// File: core-scoring/src/features.rs
// Description: Deterministic aggregation of per-layer results and metadata into the
//              fixed-schema fraud feature vector
// =====================================================================================

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use std::sync::Arc;

use crate::config::FraudRuleConfig;
use crate::error::ScoringResult;
use crate::geo;
use crate::state::StateStore;
use crate::types::{
    naive_ts, DuplicateResult, EvidencePackage, ExplanationFields, FraudFeatureVector,
    ImageQualityResult, ObjectDetectionResult, OcrResult,
};

/// Sliding window used for device-reuse counting
const DEVICE_WINDOW_DAYS: i64 = 7;
/// Adjacent submissions closer than this count as rapid
const RAPID_GAP_HOURS: f64 = 2.0;

/// The authoritative feature schema; the vector always carries every key, in
/// this order, substituting defaults for missing inputs
pub const FEATURE_SCHEMA: [&str; 18] = [
    "avg_quality_score",
    "low_quality_ratio",
    "asset_match_rate",
    "asset_declared",
    "avg_ocr_confidence",
    "vendor_match_rate",
    "amount_match_rate",
    "duplicate_ratio",
    "gps_deviation_km",
    "gps_over_threshold",
    "device_usage_count",
    "submission_hour_std",
    "off_hours_flag",
    "submission_hour",
    "historical_rejections",
    "historical_flags",
    "total_cases",
    "rapid_submission_ratio",
];

/// Converts raw layer outputs into ML-ready features
pub struct FeatureEngineer {
    state: Arc<StateStore>,
    rules: FraudRuleConfig,
}

impl FeatureEngineer {
    pub fn new(state: Arc<StateStore>, rules: FraudRuleConfig) -> Self {
        Self { state, rules }
    }

    pub fn build_feature_vector(
        &self,
        package: &EvidencePackage,
        quality: &[ImageQualityResult],
        detection: &[ObjectDetectionResult],
        ocr_results: &[OcrResult],
        duplicates: &[DuplicateResult],
    ) -> ScoringResult<FraudFeatureVector> {
        let metadata = &package.metadata;
        let mut features: IndexMap<String, f64> = FEATURE_SCHEMA
            .iter()
            .map(|key| (key.to_string(), 0.0))
            .collect();

        // Quality
        if quality.is_empty() {
            features["avg_quality_score"] = 0.5;
        } else {
            let scores: Vec<f64> = quality.iter().map(|r| r.quality_score).collect();
            features["avg_quality_score"] = mean(&scores);
            features["low_quality_ratio"] =
                scores.iter().filter(|s| **s < 0.5).count() as f64 / scores.len() as f64;
        }

        // Detection
        if detection.is_empty() {
            features["asset_match_rate"] = 0.5;
        } else {
            let scores: Vec<f64> = detection.iter().map(|r| r.asset_match_score).collect();
            features["asset_match_rate"] = mean(&scores);
        }
        features["asset_declared"] = if metadata.declared_asset_type.is_some() {
            1.0
        } else {
            0.0
        };

        // OCR
        if !ocr_results.is_empty() {
            let confidences: Vec<f64> = ocr_results.iter().map(|r| r.ocr_confidence).collect();
            features["avg_ocr_confidence"] = mean(&confidences);
            features["vendor_match_rate"] = bool_rate(
                ocr_results
                    .iter()
                    .map(|r| r.crosscheck_results.vendor_match),
            );
            features["amount_match_rate"] = bool_rate(
                ocr_results
                    .iter()
                    .map(|r| r.crosscheck_results.amount_match),
            );
        }

        // Duplicates
        if !duplicates.is_empty() {
            features["duplicate_ratio"] = bool_rate(duplicates.iter().map(|r| r.duplicate_found));
        }

        // Submission context
        let gps_value = geo::gps_deviation(
            metadata.declared_asset_location,
            metadata.submission_location,
        )
        .unwrap_or(0.0);
        features["gps_deviation_km"] = gps_value;
        features["gps_over_threshold"] = if gps_value > self.rules.gps_threshold_km {
            1.0
        } else {
            0.0
        };

        let device_usage = self.state.record_device_usage(
            metadata.submission_device_id.as_deref(),
            metadata.submission_timestamp,
            DEVICE_WINDOW_DAYS,
        )?;
        features["device_usage_count"] = device_usage as f64;

        let submission_hours: Vec<f64> = match &package.timestamps {
            Some(timestamps) if !timestamps.is_empty() => timestamps
                .iter()
                .map(|ts| hour_of(ts) as f64)
                .collect(),
            _ => vec![hour_of(&metadata.submission_timestamp) as f64],
        };
        features["submission_hour_std"] = if submission_hours.len() > 1 {
            population_std(&submission_hours)
        } else {
            0.0
        };

        let hour = hour_of(&metadata.submission_timestamp);
        features["off_hours_flag"] =
            if hour < self.rules.off_hours_start || hour > self.rules.off_hours_end {
                1.0
            } else {
                0.0
            };
        features["submission_hour"] = hour as f64;

        // Applicant history
        let history = &metadata.applicant_history;
        features["historical_rejections"] = history.previous_rejections as f64;
        features["historical_flags"] = history.fraudulent_flags as f64;
        features["total_cases"] = history.submitted_cases as f64;

        let recorded = self.state.record_case_timestamp(
            &metadata.applicant_id,
            &metadata
                .submission_timestamp
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
        )?;
        features["rapid_submission_ratio"] = Self::rapid_submission_ratio(&recorded);

        let explanation_fields = ExplanationFields {
            quality_summary: features["avg_quality_score"],
            detection_match: features["asset_match_rate"],
            vendor_match: features["vendor_match_rate"],
            duplicate_ratio: features["duplicate_ratio"],
            gps_deviation_km: features["gps_deviation_km"],
        };

        Ok(FraudFeatureVector {
            case_id: package.case_id.clone(),
            features,
            explanation_fields,
        })
    }

    /// Fraction of adjacent submission gaps shorter than two hours, over the
    /// sorted naive timestamp history including the current submission
    fn rapid_submission_ratio(timestamps: &[String]) -> f64 {
        let mut parsed: Vec<NaiveDateTime> = timestamps
            .iter()
            .filter_map(|ts| naive_ts::parse(ts))
            .collect();
        if parsed.len() < 2 {
            return 0.0;
        }
        parsed.sort();

        let gaps: Vec<f64> = parsed
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_seconds() as f64 / 3600.0)
            .collect();
        let rapid = gaps.iter().filter(|gap| **gap < RAPID_GAP_HOURS).count();
        rapid as f64 / gaps.len() as f64
    }
}

fn hour_of(ts: &NaiveDateTime) -> u32 {
    use chrono::Timelike;
    ts.hour()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn bool_rate(values: impl Iterator<Item = bool>) -> f64 {
    let collected: Vec<bool> = values.collect();
    if collected.is_empty() {
        return 0.0;
    }
    collected.iter().filter(|v| **v).count() as f64 / collected.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
