// =====================================================================================
// File: core-scoring/src/pipeline.rs
// Description: End-to-end orchestration: runs every analysis layer in a fixed
//              order and assembles the audit-ready score response
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::aggregation::RiskAggregator;
use crate::capabilities::CapabilitySet;
use crate::config::{ScoringConfig, WeightConfig};
use crate::detection::ObjectDetector;
use crate::duplicates::DuplicateDetector;
use crate::error::ScoringResult;
use crate::features::FeatureEngineer;
use crate::forensics::ForensicAnalyzer;
use crate::fraud::FraudScorer;
use crate::media::MediaLoader;
use crate::ocr::OcrProcessor;
use crate::quality::QualityAnalyzer;
use crate::state::StateStore;
use crate::types::{
    EvidencePackage, ForensicLabel, ForensicResult, ScoreBreakdown, ScoreResponse,
};
use crate::verification::{VerificationClient, VerificationResult};

/// Coordinates all processing layers and builds the audit trail
pub struct Pipeline {
    quality: QualityAnalyzer,
    forensics: ForensicAnalyzer,
    detector: ObjectDetector,
    ocr: OcrProcessor,
    duplicates: DuplicateDetector,
    features: FeatureEngineer,
    fraud: FraudScorer,
    aggregator: RiskAggregator,
    verification: Arc<dyn VerificationClient>,
    capabilities: CapabilitySet,
}

impl Pipeline {
    /// Construct the pipeline from configuration. Fails only on fatal
    /// configuration or model-artifact errors.
    pub fn new(
        config: ScoringConfig,
        capabilities: CapabilitySet,
        verification: Arc<dyn VerificationClient>,
    ) -> ScoringResult<Self> {
        config.validate()?;

        let loader = Arc::new(MediaLoader::new(config.settings.media_timeout_secs));
        let state = Arc::new(StateStore::open(&config.settings.state_path));

        let quality = QualityAnalyzer::new(
            Arc::clone(&loader),
            capabilities.decoder.clone(),
            config.quality.clone(),
        );
        let forensics = ForensicAnalyzer::new(
            Arc::clone(&loader),
            capabilities.decoder.clone(),
            capabilities.text_extractor.clone(),
            config.forensics.clone(),
        );
        let detector = ObjectDetector::new(
            Arc::clone(&loader),
            capabilities.detection_model.clone(),
            config.detection.clone(),
        );
        let ocr = OcrProcessor::new(
            Arc::clone(&loader),
            capabilities.ocr_provider.clone(),
            config.ocr.clone(),
        );
        let duplicates = DuplicateDetector::new(
            Arc::clone(&loader),
            capabilities.hasher.clone(),
            Arc::clone(&state),
            config.duplicates.clone(),
        );
        let features = FeatureEngineer::new(Arc::clone(&state), config.fraud_rules.clone());
        let fraud = FraudScorer::from_registry(
            &config.settings.model_registry_path,
            config.fraud_rules.clone(),
        )?;
        let aggregator = RiskAggregator::new(config.weights.clone(), config.thresholds.clone());

        Ok(Self {
            quality,
            forensics,
            detector,
            ocr,
            duplicates,
            features,
            fraud,
            aggregator,
            verification,
            capabilities,
        })
    }

    /// Replace the aggregation weights; visible to subsequent scoring calls
    pub fn update_weights(&self, weights: WeightConfig) {
        self.aggregator.update_weights(weights);
    }

    pub fn current_weights(&self) -> WeightConfig {
        self.aggregator.current_weights()
    }

    /// Optional-dependency availability for the health endpoint
    pub fn dependency_report(&self) -> HashMap<String, bool> {
        let mut report = self.capabilities.availability();
        report.insert("fraud_model".to_string(), self.fraud.model_available());
        report
    }

    /// Score one evidence package. Per-item failures degrade the affected
    /// results; only state-store I/O failures surface as errors.
    #[instrument(skip(self, package), fields(case_id = %package.case_id))]
    pub fn score_case(&self, package: &EvidencePackage) -> ScoringResult<ScoreResponse> {
        let metadata = &package.metadata;

        let mut quality_results = self.quality.analyze_batch(&package.asset_images);
        quality_results.extend(self.quality.analyze_batch(&package.doc_images));

        let forensic_results = self.forensics.analyze_documents(&package.doc_images);

        let detection_results = self
            .detector
            .analyze(&package.asset_images, metadata.declared_asset_type.as_deref());

        let ocr_results = self.ocr.process_documents(
            &package.doc_images,
            metadata.declared_vendor.as_deref(),
            metadata.declared_invoice_amount,
            metadata.declared_invoice_date,
        );

        let invoice_number = custom_string(metadata, "invoice_number");
        let gstin = custom_string(metadata, "gstin");
        let gst_details = self
            .verification
            .verify_invoice(invoice_number.as_deref(), gstin.as_deref());
        let bank_details = self
            .verification
            .verify_sanction(&metadata.applicant_id, metadata.declared_asset_type.as_deref());
        let verification_summary = VerificationResult {
            gst_verified: gst_details.verified,
            gst_details,
            bank_match: bank_details.matched,
            bank_details,
        };

        let mut duplicate_results =
            self.duplicates
                .evaluate(&package.asset_images, &metadata.applicant_id, &package.case_id)?;
        duplicate_results.extend(self.duplicates.evaluate(
            &package.doc_images,
            &metadata.applicant_id,
            &package.case_id,
        )?);

        let feature_vector = self.features.build_feature_vector(
            package,
            &quality_results,
            &detection_results,
            &ocr_results,
            &duplicate_results,
        )?;
        let fraud_score = self.fraud.score(&feature_vector);

        let outcome = self.aggregator.aggregate(
            &quality_results,
            &detection_results,
            &ocr_results,
            &duplicate_results,
            &fraud_score,
        );

        let decision_reasons = Self::decision_reasons(
            outcome.final_risk_score,
            &verification_summary,
            &forensic_results,
            &duplicate_results,
        );

        info!(
            final_risk_score = outcome.final_risk_score,
            risk_tier = outcome.risk_tier.as_str(),
            "Case scored"
        );

        Ok(ScoreResponse {
            case_id: package.case_id.clone(),
            final_risk_score: outcome.final_risk_score,
            risk_tier: outcome.risk_tier,
            routing_decision: outcome.routing_decision,
            verification_summary: Some(verification_summary.clone()),
            decision_reasons,
            scores: ScoreBreakdown {
                image_quality: quality_results,
                asset_match: detection_results,
                ocr: ocr_results,
                duplicates: duplicate_results,
                fraud_features: feature_vector,
                fraud_score,
                verification: Some(verification_summary),
                forensics: forensic_results,
            },
        })
    }

    /// Reasons are assembled in a fixed priority order that review tooling
    /// depends on: high score, GST failure, sanction mismatch, forensic
    /// alerts, then duplicates.
    fn decision_reasons(
        final_risk_score: f64,
        verification: &VerificationResult,
        forensics: &[ForensicResult],
        duplicates: &[crate::types::DuplicateResult],
    ) -> Vec<String> {
        let mut reasons = Vec::new();

        if final_risk_score >= 80.0 {
            reasons.push("High Fraud Probability".to_string());
        }
        if !verification.gst_verified {
            reasons.push(format!(
                "GST Verification Failed: {}",
                verification.gst_details.reason
            ));
        }
        if !verification.bank_match {
            reasons.push("Bank Sanction Mismatch".to_string());
        }
        for result in forensics {
            if matches!(result.label, ForensicLabel::Forged | ForensicLabel::Suspicious) {
                let label = match result.label {
                    ForensicLabel::Forged => "forged",
                    ForensicLabel::Suspicious => "suspicious",
                    ForensicLabel::Genuine => unreachable!(),
                };
                let highlights = result
                    .reasons
                    .iter()
                    .take(2)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                reasons.push(format!("Forensic Alert ({label}): {highlights}"));
            }
        }
        for duplicate in duplicates {
            if duplicate.duplicate_found {
                reasons.push(format!(
                    "Duplicate Image Found (Distance: {})",
                    duplicate.hash_distance
                ));
            }
        }

        reasons
    }
}

fn custom_string(metadata: &crate::types::Metadata, key: &str) -> Option<String> {
    metadata
        .custom_metadata
        .get(key)
        .and_then(|value| value.as_str())
        .map(str::to_string)
}
