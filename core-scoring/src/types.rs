// =====================================================================================
// File: core-scoring/src/types.rs
// Description: Core types for evidence packages and per-layer scoring results
// =====================================================================================

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::verification::VerificationResult;

/// Serde helpers for naive-UTC timestamps. Inputs may carry an offset or a
/// trailing `Z`; both are normalized to naive UTC at the boundary so that
/// timestamp arithmetic stays total.
pub mod naive_ts {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn parse(value: &str) -> Option<NaiveDateTime> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.naive_utc());
        }
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
    }

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// Optional list variant of [`naive_ts`].
pub mod naive_ts_vec_opt {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<NaiveDateTime>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        match value {
            None => serializer.serialize_none(),
            Some(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for ts in items {
                    seq.serialize_element(&ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())?;
                }
                seq.end()
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<NaiveDateTime>>, D::Error> {
        let raw: Option<Vec<String>> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(items) => items
                .iter()
                .map(|item| {
                    super::naive_ts::parse(item).ok_or_else(|| {
                        serde::de::Error::custom(format!("invalid timestamp: {item}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
        }
    }
}

/// Optional variant of [`naive_ts`].
pub mod naive_ts_opt {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => super::naive_ts::serialize(ts, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => super::naive_ts::parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
        }
    }
}

/// GPS coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinate {
    pub lat: f64,
    pub lon: f64,
}

impl GpsCoordinate {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// An evidence image with exactly one payload source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceImage {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub base64_data: Option<String>,
    #[serde(default = "default_mime_type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub declared_asset_type: Option<String>,
    #[serde(default, with = "naive_ts_opt")]
    pub timestamp: Option<NaiveDateTime>,
}

fn default_mime_type() -> Option<String> {
    Some("image/jpeg".to_string())
}

/// An evidence document; documents carry the same payload sources as images
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceDocument {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub base64_data: Option<String>,
    #[serde(default = "default_mime_type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub declared_asset_type: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default, with = "naive_ts_opt")]
    pub timestamp: Option<NaiveDateTime>,
}

/// A video attachment; only routed, never analyzed in this pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceVideo {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub base64_data: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default, with = "naive_ts_opt")]
    pub timestamp: Option<NaiveDateTime>,
}

/// Counts from the applicant's prior submissions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicantHistory {
    #[serde(default)]
    pub previous_rejections: u32,
    #[serde(default)]
    pub fraudulent_flags: u32,
    #[serde(default)]
    pub submitted_cases: u32,
}

/// Declared metadata accompanying an evidence package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub case_id: String,
    pub applicant_id: String,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub scheme_code: Option<String>,
    pub declared_loan_amount: f64,
    #[serde(default)]
    pub declared_asset_type: Option<String>,
    #[serde(default)]
    pub declared_vendor: Option<String>,
    #[serde(default)]
    pub declared_invoice_amount: Option<f64>,
    #[serde(default, with = "naive_ts_opt")]
    pub declared_invoice_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub declared_asset_location: Option<GpsCoordinate>,
    #[serde(default)]
    pub submission_location: Option<GpsCoordinate>,
    #[serde(default)]
    pub submission_device_id: Option<String>,
    #[serde(with = "naive_ts")]
    pub submission_timestamp: NaiveDateTime,
    #[serde(default)]
    pub applicant_history: ApplicantHistory,
    /// Open mapping; carries `invoice_number` and `gstin` by convention
    #[serde(default)]
    pub custom_metadata: HashMap<String, serde_json::Value>,
}

/// Request-scoped, immutable input to one scoring call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePackage {
    pub case_id: String,
    #[serde(default)]
    pub asset_images: Vec<EvidenceImage>,
    #[serde(default)]
    pub doc_images: Vec<EvidenceDocument>,
    #[serde(default)]
    pub videos: Vec<EvidenceVideo>,
    #[serde(default)]
    pub gps_coords: Option<Vec<GpsCoordinate>>,
    #[serde(default, with = "naive_ts_vec_opt")]
    pub timestamps: Option<Vec<NaiveDateTime>>,
    pub metadata: Metadata,
}

/// Per-image quality assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageQualityResult {
    pub image_id: String,
    pub quality_score: f64,
    pub blur_variance: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub resolution_ok: bool,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub officer_review_flag: bool,
    #[serde(default)]
    pub reason_if_fail: Option<String>,
}

/// A single detection returned by the detection model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    pub bbox: [f64; 4],
}

/// Context recorded alongside a detection verdict
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionDetails {
    pub mode: String,
    #[serde(default)]
    pub declared_asset: Option<String>,
    #[serde(default)]
    pub matched_label: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Per-image asset-match verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDetectionResult {
    pub image_id: String,
    pub detected_objects: Vec<Detection>,
    pub asset_match: bool,
    /// Binarized: 1.0 when the best keyword-matched confidence clears the
    /// configured threshold, else 0.0
    pub asset_match_score: f64,
    pub details: DetectionDetails,
}

/// Structured fields parsed out of OCR text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedInvoiceFields {
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Cross-check outcome of parsed fields against declared metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrosscheckOutcome {
    pub vendor_match: bool,
    pub amount_match: bool,
    pub date_match: bool,
    #[serde(default)]
    pub declared_vendor: Option<String>,
    #[serde(default)]
    pub declared_amount: Option<f64>,
    #[serde(default)]
    pub declared_date: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Per-document OCR extraction and cross-check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub doc_id: String,
    pub raw_text: String,
    pub ocr_confidence: f64,
    pub parsed_fields: ParsedInvoiceFields,
    pub crosscheck_results: CrosscheckOutcome,
    #[serde(default)]
    pub penalties: HashMap<String, f64>,
    pub match_score: f64,
}

impl OcrResult {
    pub fn penalty_total(&self) -> f64 {
        self.penalties.values().sum()
    }
}

/// Per-item perceptual-hash duplicate verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateResult {
    pub evidence_id: String,
    pub duplicate_found: bool,
    pub hash_distance: u32,
    #[serde(default)]
    pub reference_case_id: Option<String>,
    #[serde(default)]
    pub penalty_points: f64,
}

/// Forensic classification label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForensicLabel {
    Genuine,
    Suspicious,
    Forged,
}

/// EXIF findings for a document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExifFindings {
    pub exif_present: bool,
    #[serde(default)]
    pub exif_datetime: Option<String>,
    #[serde(default)]
    pub exif_software: Option<String>,
    pub date_mismatch: bool,
}

/// Blur and spectral findings for a document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlurFindings {
    pub lap_var: f64,
    pub high_low_ratio: f64,
}

/// Arithmetic consistency findings for a document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArithmeticFindings {
    pub found_total_match: bool,
    #[serde(default)]
    pub best_total: Option<f64>,
    pub amount_count: usize,
}

/// Detail subrecord attached to a forensic result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForensicDetails {
    pub exif: ExifFindings,
    pub blur: BlurFindings,
    pub arithmetic: ArithmeticFindings,
    #[serde(default)]
    pub error: Option<String>,
}

/// Per-document heuristic forgery verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicResult {
    pub doc_id: String,
    pub label: ForensicLabel,
    pub forensic_score: f64,
    pub reasons: Vec<String>,
    pub details: ForensicDetails,
}

/// Human-facing summary carried alongside the feature vector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplanationFields {
    pub quality_summary: f64,
    pub detection_match: f64,
    pub vendor_match: f64,
    pub duplicate_ratio: f64,
    pub gps_deviation_km: f64,
}

/// Fixed-schema fraud feature vector; keys always appear in schema order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudFeatureVector {
    pub case_id: String,
    pub features: IndexMap<String, f64>,
    pub explanation_fields: ExplanationFields,
}

/// Fraud-model (or rules baseline) scoring output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudScoreResult {
    pub fraud_score: f64,
    pub model_version: String,
    #[serde(default)]
    pub feature_importance: HashMap<String, f64>,
    #[serde(default)]
    pub rule_penalties: HashMap<String, f64>,
}

/// Risk tier derived from the final score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    #[serde(rename = "auto-approve")]
    AutoApprove,
    #[serde(rename = "officer-review")]
    OfficerReview,
    #[serde(rename = "video-verify")]
    VideoVerify,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::AutoApprove => "auto-approve",
            RiskTier::OfficerReview => "officer-review",
            RiskTier::VideoVerify => "video-verify",
        }
    }

    /// Workflow routing string emitted downstream
    pub fn routing_decision(&self) -> &'static str {
        match self {
            RiskTier::AutoApprove => "auto_approve",
            RiskTier::OfficerReview => "officer_review",
            RiskTier::VideoVerify => "video_verification_required",
        }
    }
}

/// Full per-layer audit trail for one case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub image_quality: Vec<ImageQualityResult>,
    pub asset_match: Vec<ObjectDetectionResult>,
    pub ocr: Vec<OcrResult>,
    pub duplicates: Vec<DuplicateResult>,
    pub fraud_features: FraudFeatureVector,
    pub fraud_score: FraudScoreResult,
    #[serde(default)]
    pub verification: Option<VerificationResult>,
    #[serde(default)]
    pub forensics: Vec<ForensicResult>,
}

/// Final audit-ready scoring response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub case_id: String,
    pub final_risk_score: f64,
    pub risk_tier: RiskTier,
    pub routing_decision: String,
    #[serde(default)]
    pub verification_summary: Option<VerificationResult>,
    #[serde(default)]
    pub decision_reasons: Vec<String>,
    pub scores: ScoreBreakdown,
}

/// Payload for the administrative weight hot-swap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightUpdateRequest {
    pub weights: crate::config::WeightConfig,
}

/// Service health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub dependencies: HashMap<String, bool>,
}
