// =====================================================================================
// File: core-scoring/src/config.rs
// Description: Configuration for the scoring pipeline, loaded from defaults, an
//              optional JSON file, and VIDYA__-prefixed environment overrides
// =====================================================================================

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use tracing::info;

use crate::error::{ScoringError, ScoringResult};

/// Weights applied to each layer for final risk aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    #[serde(default = "WeightConfig::default_image_quality")]
    pub image_quality_weight: f64,
    #[serde(default = "WeightConfig::default_asset_match")]
    pub asset_match_weight: f64,
    #[serde(default = "WeightConfig::default_ocr_match")]
    pub ocr_match_weight: f64,
    #[serde(default = "WeightConfig::default_duplicate")]
    pub duplicate_weight: f64,
    #[serde(default = "WeightConfig::default_fraud_score")]
    pub fraud_score_weight: f64,
}

impl WeightConfig {
    fn default_image_quality() -> f64 {
        0.15
    }
    fn default_asset_match() -> f64 {
        0.20
    }
    fn default_ocr_match() -> f64 {
        0.20
    }
    fn default_duplicate() -> f64 {
        0.10
    }
    fn default_fraud_score() -> f64 {
        0.25
    }

    /// Sum of all weights; an all-zero configuration falls back to 1.0 so the
    /// weighted mean stays defined
    pub fn total(&self) -> f64 {
        let sum = self.image_quality_weight
            + self.asset_match_weight
            + self.ocr_match_weight
            + self.duplicate_weight
            + self.fraud_score_weight;
        if sum == 0.0 {
            1.0
        } else {
            sum
        }
    }

    pub fn validate(&self) -> ScoringResult<()> {
        let entries = [
            ("image_quality_weight", self.image_quality_weight),
            ("asset_match_weight", self.asset_match_weight),
            ("ocr_match_weight", self.ocr_match_weight),
            ("duplicate_weight", self.duplicate_weight),
            ("fraud_score_weight", self.fraud_score_weight),
        ];
        for (name, value) in entries {
            if value < 0.0 || !value.is_finite() {
                return Err(ScoringError::configuration_error(format!(
                    "{name} must be a non-negative finite number, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn as_map(&self) -> HashMap<String, f64> {
        HashMap::from([
            ("image_quality_weight".to_string(), self.image_quality_weight),
            ("asset_match_weight".to_string(), self.asset_match_weight),
            ("ocr_match_weight".to_string(), self.ocr_match_weight),
            ("duplicate_weight".to_string(), self.duplicate_weight),
            ("fraud_score_weight".to_string(), self.fraud_score_weight),
        ])
    }
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            image_quality_weight: Self::default_image_quality(),
            asset_match_weight: Self::default_asset_match(),
            ocr_match_weight: Self::default_ocr_match(),
            duplicate_weight: Self::default_duplicate(),
            fraud_score_weight: Self::default_fraud_score(),
        }
    }
}

/// Routing thresholds for risk tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub auto_approve_threshold: u8,
    pub officer_review_threshold: u8,
}

impl ThresholdConfig {
    pub fn validate(&self) -> ScoringResult<()> {
        if self.auto_approve_threshold > 100 || self.officer_review_threshold > 100 {
            return Err(ScoringError::configuration_error(
                "tier thresholds must lie in [0, 100]",
            ));
        }
        if self.auto_approve_threshold > self.officer_review_threshold {
            return Err(ScoringError::configuration_error(
                "auto_approve_threshold must not exceed officer_review_threshold",
            ));
        }
        Ok(())
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 65,
            officer_review_threshold: 85,
        }
    }
}

/// Image quality thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    pub blur_variance_threshold: f64,
    pub brightness_dark_threshold: f64,
    pub brightness_bright_threshold: f64,
    pub contrast_threshold: f64,
    pub min_width: u32,
    pub min_height: u32,
    pub officer_review_quality_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            blur_variance_threshold: 100.0,
            brightness_dark_threshold: 60.0,
            brightness_bright_threshold: 220.0,
            contrast_threshold: 20.0,
            min_width: 600,
            min_height: 400,
            officer_review_quality_threshold: 0.8,
        }
    }
}

/// Object detection thresholds and declared-asset synonyms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    #[serde(default)]
    pub asset_synonyms: HashMap<String, Vec<String>>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.45,
            iou_threshold: 0.4,
            asset_synonyms: HashMap::new(),
        }
    }
}

/// OCR cross-check tolerances and penalty weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub provider_confidence_threshold: f64,
    pub amount_tolerance_pct: f64,
    pub date_tolerance_days: i64,
    pub vendor_penalty: f64,
    pub amount_penalty: f64,
    pub date_penalty: f64,
    pub low_confidence_penalty: f64,
}

impl OcrConfig {
    /// Sum of every configured penalty; the denominator of the match score
    pub fn max_penalty(&self) -> f64 {
        self.vendor_penalty + self.amount_penalty + self.date_penalty + self.low_confidence_penalty
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider_confidence_threshold: 0.7,
            amount_tolerance_pct: 0.25,
            date_tolerance_days: 30,
            vendor_penalty: 10.0,
            amount_penalty: 15.0,
            date_penalty: 10.0,
            low_confidence_penalty: 5.0,
        }
    }
}

/// Perceptual-hash duplicate detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateConfig {
    pub hash_distance_threshold: u32,
    pub duplicate_penalty_points: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            hash_distance_threshold: 5,
            duplicate_penalty_points: 15.0,
        }
    }
}

/// Rule penalties applied by the fraud scorer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudRuleConfig {
    pub gps_threshold_km: f64,
    pub gps_penalty: f64,
    pub off_hours_start: u32,
    pub off_hours_end: u32,
    pub off_hours_penalty: f64,
    pub device_cases_limit: u32,
    pub device_penalty: f64,
    pub history_penalty: f64,
}

impl Default for FraudRuleConfig {
    fn default() -> Self {
        Self {
            gps_threshold_km: 25.0,
            gps_penalty: 15.0,
            off_hours_start: 7,
            off_hours_end: 20,
            off_hours_penalty: 5.0,
            device_cases_limit: 2,
            device_penalty: 10.0,
            history_penalty: 10.0,
        }
    }
}

/// Additive points per forensic signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicPoints {
    pub edited_software: f64,
    pub exif_date_mismatch: f64,
    pub blurry: f64,
    pub low_high_frequency: f64,
    pub font_variation: f64,
    pub alignment_variation: f64,
    pub missing_sections: f64,
    pub arithmetic_mismatch: f64,
}

impl Default for ForensicPoints {
    fn default() -> Self {
        Self {
            edited_software: 1.8,
            exif_date_mismatch: 1.0,
            blurry: 0.8,
            low_high_frequency: 0.6,
            font_variation: 0.8,
            alignment_variation: 0.9,
            missing_sections: 1.0,
            arithmetic_mismatch: 1.4,
        }
    }
}

/// Forensic invoice-inspection cutoffs and scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicConfig {
    #[serde(default)]
    pub points: ForensicPoints,
    pub blur_variance_cutoff: f64,
    pub high_frequency_ratio_cutoff: f64,
    pub font_variation_cutoff: f64,
    pub alignment_cutoff_px: f64,
    pub missing_sections_minimum: usize,
    pub arithmetic_tolerance_pct: f64,
    pub score_divisor: f64,
    pub forged_threshold: f64,
    pub suspicious_threshold: f64,
}

impl Default for ForensicConfig {
    fn default() -> Self {
        Self {
            points: ForensicPoints::default(),
            blur_variance_cutoff: 40.0,
            high_frequency_ratio_cutoff: 0.5,
            font_variation_cutoff: 0.6,
            alignment_cutoff_px: 20.0,
            missing_sections_minimum: 3,
            arithmetic_tolerance_pct: 0.03,
            score_divisor: 8.0,
            forged_threshold: 0.6,
            suspicious_threshold: 0.3,
        }
    }
}

/// Environment-level settings: paths, credentials, timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub service_name: String,
    pub environment: String,
    /// Location of the persisted duplicate/device state document
    pub state_path: PathBuf,
    /// Directory of serialized fraud-model artifacts
    pub model_registry_path: PathBuf,
    #[serde(default)]
    pub ocr_api_key: Option<String>,
    #[serde(default)]
    pub ocr_endpoint: Option<String>,
    #[serde(default)]
    pub detection_model_path: Option<PathBuf>,
    pub media_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_name: "vidya-scoring".to_string(),
            environment: "development".to_string(),
            state_path: PathBuf::from("data/scoring_state.json"),
            model_registry_path: PathBuf::from("models"),
            ocr_api_key: None,
            ocr_endpoint: None,
            detection_model_path: None,
            media_timeout_secs: 10,
        }
    }
}

/// Aggregate configuration for one pipeline instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: WeightConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub duplicates: DuplicateConfig,
    #[serde(default)]
    pub fraud_rules: FraudRuleConfig,
    #[serde(default)]
    pub forensics: ForensicConfig,
    #[serde(default)]
    pub settings: Settings,
}

impl ScoringConfig {
    /// Load configuration from defaults, the JSON file named by
    /// `VIDYA_CONFIG_FILE` (when present), and `VIDYA__` environment overrides
    pub fn load() -> ScoringResult<Self> {
        let config_file =
            env::var("VIDYA_CONFIG_FILE").unwrap_or_else(|_| "config/scoring".to_string());

        info!(config_file = %config_file, "Loading scoring configuration");

        let config = Config::builder()
            .add_source(Config::try_from(&ScoringConfig::default()).map_err(Self::config_error)?)
            .add_source(File::with_name(&config_file).required(false))
            .add_source(Environment::with_prefix("VIDYA").separator("__"))
            .build()
            .map_err(Self::config_error)?;

        let loaded: ScoringConfig = config.try_deserialize().map_err(Self::config_error)?;
        loaded.validate()?;

        info!("Scoring configuration loaded");
        Ok(loaded)
    }

    /// Validate values that would make the pipeline ill-defined
    pub fn validate(&self) -> ScoringResult<()> {
        self.weights.validate()?;
        self.thresholds.validate()?;
        if self.ocr.amount_tolerance_pct < 0.0 || self.ocr.amount_tolerance_pct > 1.0 {
            return Err(ScoringError::configuration_error(
                "ocr.amount_tolerance_pct must lie in [0, 1]",
            ));
        }
        if self.quality.officer_review_quality_threshold < 0.0
            || self.quality.officer_review_quality_threshold > 1.0
        {
            return Err(ScoringError::configuration_error(
                "quality.officer_review_quality_threshold must lie in [0, 1]",
            ));
        }
        Ok(())
    }

    fn config_error(err: config::ConfigError) -> ScoringError {
        ScoringError::configuration_error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum() {
        let weights = WeightConfig::default();
        assert!((weights.total() - 0.90).abs() < 1e-9);
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn test_zero_weights_total_falls_back_to_one() {
        let weights = WeightConfig {
            image_quality_weight: 0.0,
            asset_match_weight: 0.0,
            ocr_match_weight: 0.0,
            duplicate_weight: 0.0,
            fraud_score_weight: 0.0,
        };
        assert_eq!(weights.total(), 1.0);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = WeightConfig {
            image_quality_weight: -0.1,
            ..WeightConfig::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_partial_weight_payload_fills_defaults() {
        let weights: WeightConfig =
            serde_json::from_str(r#"{"fraud_score_weight": 1.0}"#).unwrap();
        assert_eq!(weights.fraud_score_weight, 1.0);
        assert_eq!(weights.image_quality_weight, 0.15);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let thresholds = ThresholdConfig {
            auto_approve_threshold: 90,
            officer_review_threshold: 85,
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_ocr_max_penalty() {
        let ocr = OcrConfig::default();
        assert_eq!(ocr.max_penalty(), 40.0);
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = ScoringConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: ScoringConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.thresholds.auto_approve_threshold, 65);
        assert_eq!(restored.duplicates.hash_distance_threshold, 5);
        assert_eq!(restored.forensics.score_divisor, 8.0);
    }
}
