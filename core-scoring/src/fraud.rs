// =====================================================================================
// File: core-scoring/src/fraud.rs
// Description: Fraud scoring: registry-loaded gradient-boosted classifier with a
//              rules-only baseline fallback
// =====================================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::FraudRuleConfig;
use crate::error::{ScoringError, ScoringResult};
use crate::types::{FraudFeatureVector, FraudScoreResult};

/// A node of a regression tree in the serialized ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: String,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    Leaf {
        value: f64,
    },
}

impl TreeNode {
    fn evaluate(&self, features: &indexmap::IndexMap<String, f64>) -> f64 {
        match self {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let value = features.get(feature).copied().unwrap_or(0.0);
                if value < *threshold {
                    left.evaluate(features)
                } else {
                    right.evaluate(features)
                }
            }
        }
    }
}

/// Serialized gradient-boosted classifier artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedModel {
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<TreeNode>,
    #[serde(default)]
    pub feature_importance: HashMap<String, f64>,
}

impl GradientBoostedModel {
    /// Fraud probability via the logistic link over the summed tree margins
    pub fn predict(&self, features: &indexmap::IndexMap<String, f64>) -> f64 {
        let margin: f64 = self.base_score
            + self
                .trees
                .iter()
                .map(|tree| tree.evaluate(features))
                .sum::<f64>();
        1.0 / (1.0 + (-margin).exp())
    }
}

/// Scores feature vectors with the latest registry model, or rule penalties
/// alone when no artifact is installed
#[derive(Debug)]
pub struct FraudScorer {
    model: Option<GradientBoostedModel>,
    version: String,
    rules: FraudRuleConfig,
}

impl FraudScorer {
    /// Load the lexicographically greatest `*.json` artifact from the registry
    /// directory. A missing directory or an empty registry selects the
    /// baseline; a malformed artifact is fatal.
    pub fn from_registry(model_dir: &Path, rules: FraudRuleConfig) -> ScoringResult<Self> {
        let Some((path, stem)) = Self::latest_artifact(model_dir)? else {
            info!("No fraud model artifact found, using baseline rules");
            return Ok(Self {
                model: None,
                version: "baseline".to_string(),
                rules,
            });
        };

        let raw = fs::read_to_string(&path)
            .map_err(|err| ScoringError::model_error(format!("read {path:?} failed: {err}")))?;
        let model: GradientBoostedModel = serde_json::from_str(&raw)
            .map_err(|err| ScoringError::model_error(format!("parse {path:?} failed: {err}")))?;

        info!(version = %stem, "Loaded fraud model artifact");
        Ok(Self {
            model: Some(model),
            version: stem,
            rules,
        })
    }

    fn latest_artifact(model_dir: &Path) -> ScoringResult<Option<(std::path::PathBuf, String)>> {
        if !model_dir.exists() {
            return Ok(None);
        }
        let mut candidates: Vec<_> = fs::read_dir(model_dir)
            .map_err(|err| ScoringError::model_error(format!("read registry failed: {err}")))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        candidates.sort();
        Ok(candidates.pop().map(|path| {
            let stem = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            (path, stem)
        }))
    }

    pub fn model_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn score(&self, vector: &FraudFeatureVector) -> FraudScoreResult {
        let penalties = self.rule_penalties(&vector.features);
        let penalty_total: f64 = penalties.values().sum();

        if let Some(model) = &self.model {
            let probability = model.predict(&vector.features);
            let fraud_score = (probability * 100.0 + penalty_total).clamp(0.0, 100.0);
            return FraudScoreResult {
                fraud_score: round2(fraud_score),
                model_version: self.version.clone(),
                feature_importance: model.feature_importance.clone(),
                rule_penalties: penalties,
            };
        }

        FraudScoreResult {
            fraud_score: penalty_total.clamp(0.0, 100.0),
            model_version: self.version.clone(),
            feature_importance: penalties.clone(),
            rule_penalties: penalties,
        }
    }

    fn rule_penalties(
        &self,
        features: &indexmap::IndexMap<String, f64>,
    ) -> HashMap<String, f64> {
        let get = |key: &str| features.get(key).copied().unwrap_or(0.0);
        let mut penalties = HashMap::new();

        if get("gps_deviation_km") > self.rules.gps_threshold_km {
            penalties.insert("gps_deviation".to_string(), self.rules.gps_penalty);
        }
        if get("off_hours_flag") >= 1.0 {
            penalties.insert(
                "off_hours_submission".to_string(),
                self.rules.off_hours_penalty,
            );
        }
        if get("device_usage_count") > self.rules.device_cases_limit as f64 {
            penalties.insert("device_reuse".to_string(), self.rules.device_penalty);
        }
        if get("historical_rejections") + get("historical_flags") > 0.0 {
            penalties.insert("history_flags".to_string(), self.rules.history_penalty);
        }
        penalties
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
