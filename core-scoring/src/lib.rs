// =====================================================================================
// File: core-scoring/src/lib.rs
// Description: Evidence verification and fraud risk-scoring pipeline
// =====================================================================================

//! # Core Scoring Module
//!
//! Deterministic multi-layer evidence verification and fraud scoring for loan
//! applications. An [`EvidencePackage`] flows through image quality analysis,
//! forensic invoice inspection, object detection, OCR cross-checks, duplicate
//! detection, feature engineering, and fraud scoring; the aggregator fuses the
//! component risks into a 0-100 score that routes the case to auto-approve,
//! officer review, or video verification.
//!
//! Heavy optional dependencies (image decoding, detection models, OCR
//! providers, perceptual hashing) are modeled as capability traits selected at
//! construction; their fallbacks are first-class behaviors, not error paths.

pub mod aggregation;
pub mod capabilities;
pub mod config;
pub mod detection;
pub mod duplicates;
pub mod error;
pub mod features;
pub mod forensics;
pub mod fraud;
pub mod geo;
pub mod imaging;
pub mod media;
pub mod ocr;
pub mod pipeline;
pub mod quality;
pub mod state;
pub mod types;
pub mod verification;

// Re-export main types and traits
pub use aggregation::{AggregateOutcome, RiskAggregator, RiskComponents};
pub use capabilities::{
    CapabilitySet, DctHasher, DefaultImageDecoder, DetectionModel, ImageDecoder, OcrProvider,
    PerceptualHasher, RestOcrProvider, TextBox, TextBoxExtractor,
};
pub use config::{
    DetectionConfig, DuplicateConfig, ForensicConfig, FraudRuleConfig, OcrConfig, QualityConfig,
    ScoringConfig, Settings, ThresholdConfig, WeightConfig,
};
pub use detection::ObjectDetector;
pub use duplicates::DuplicateDetector;
pub use error::{ScoringError, ScoringResult};
pub use features::{FeatureEngineer, FEATURE_SCHEMA};
pub use forensics::ForensicAnalyzer;
pub use fraud::{FraudScorer, GradientBoostedModel};
pub use media::{MediaLoader, MediaSource};
pub use ocr::OcrProcessor;
pub use pipeline::Pipeline;
pub use quality::QualityAnalyzer;
pub use state::StateStore;
pub use types::{
    DuplicateResult, EvidenceDocument, EvidenceImage, EvidencePackage, EvidenceVideo,
    ForensicLabel, ForensicResult, FraudFeatureVector, FraudScoreResult, GpsCoordinate,
    HealthResponse, ImageQualityResult, Metadata, ObjectDetectionResult, OcrResult, RiskTier,
    ScoreBreakdown, ScoreResponse, WeightUpdateRequest,
};
pub use verification::{
    InvoiceVerification, RegistryVerificationClient, SanctionVerification, VerificationClient,
    VerificationResult,
};

/// Crate version reported by the health endpoint
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
