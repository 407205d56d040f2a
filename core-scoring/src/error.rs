// =====================================================================================
// File: core-scoring/src/error.rs
// Description: Error types for the risk-scoring pipeline
// =====================================================================================

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for scoring operations
pub type ScoringResult<T> = Result<T, ScoringError>;

/// Scoring pipeline error types
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ScoringError {
    /// Media payload could not be resolved to bytes
    #[error("Load error for '{evidence_id}': {message}")]
    LoadError { evidence_id: String, message: String },

    /// Payload bytes could not be decoded into an image
    #[error("Decode error for '{evidence_id}': {message}")]
    DecodeError { evidence_id: String, message: String },

    /// An optional capability (decoder, model, provider) is not installed
    #[error("Capability not available: {capability}")]
    CapabilityMissing { capability: String },

    /// External service failure (OCR provider, verification gateway)
    #[error("External service error: {service} - {message}")]
    ExternalServiceError { service: String, message: String },

    /// Configuration errors, fatal at startup
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// Model registry / artifact errors
    #[error("Model error: {message}")]
    ModelError { message: String },

    /// State-store persistence errors
    #[error("State store error: {message}")]
    StateError { message: String },

    /// Internal errors
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ScoringError {
    /// Create a load error
    pub fn load_error<S: Into<String>>(evidence_id: S, message: S) -> Self {
        Self::LoadError {
            evidence_id: evidence_id.into(),
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode_error<S: Into<String>>(evidence_id: S, message: S) -> Self {
        Self::DecodeError {
            evidence_id: evidence_id.into(),
            message: message.into(),
        }
    }

    /// Create a capability-missing error
    pub fn capability_missing<S: Into<String>>(capability: S) -> Self {
        Self::CapabilityMissing {
            capability: capability.into(),
        }
    }

    /// Create an external service error
    pub fn external_service_error<S: Into<String>>(service: S, message: S) -> Self {
        Self::ExternalServiceError {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration_error<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a model error
    pub fn model_error<S: Into<String>>(message: S) -> Self {
        Self::ModelError {
            message: message.into(),
        }
    }

    /// Create a state-store error
    pub fn state_error<S: Into<String>>(message: S) -> Self {
        Self::StateError {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Get error code for categorization
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::LoadError { .. } => "LOAD_ERROR",
            Self::DecodeError { .. } => "DECODE_ERROR",
            Self::CapabilityMissing { .. } => "CAPABILITY_MISSING",
            Self::ExternalServiceError { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            Self::ModelError { .. } => "MODEL_ERROR",
            Self::StateError { .. } => "STATE_ERROR",
            Self::InternalError { .. } => "INTERNAL_ERROR",
        }
    }

    /// Per-item errors degrade the item's result instead of aborting the case
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::LoadError { .. } | Self::DecodeError { .. } | Self::CapabilityMissing { .. }
        )
    }

    /// Fatal errors abort startup rather than a single case
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationError { .. } | Self::ModelError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = ScoringError::load_error("img-1", "file not found");
        assert_eq!(error.error_code(), "LOAD_ERROR");
        assert!(error.is_per_item());
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_configuration_error_is_fatal() {
        let error = ScoringError::configuration_error("negative weight");
        assert_eq!(error.error_code(), "CONFIGURATION_ERROR");
        assert!(error.is_fatal());
        assert!(!error.is_per_item());
    }

    #[test]
    fn test_error_display() {
        let error = ScoringError::external_service_error("ocr", "timeout");
        assert!(error.to_string().contains("ocr"));
        assert!(error.to_string().contains("timeout"));
    }
}
