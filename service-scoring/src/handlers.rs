// =====================================================================================
// File: service-scoring/src/handlers.rs
// Description: HTTP request handlers for scoring, weight administration, and health
// =====================================================================================

use axum::{extract::State, http::StatusCode, response::Json};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use core_scoring::{
    EvidencePackage, HealthResponse, ScoreResponse, WeightConfig, WeightUpdateRequest,
};

use crate::AppState;

/// Health check: service version plus optional-dependency availability
#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: core_scoring::version().to_string(),
        dependencies: state.pipeline.dependency_report(),
    })
}

/// Score one evidence package. The pipeline is synchronous and may block for
/// image decoding and model inference, so it runs on a blocking worker.
#[instrument(skip(state, package), fields(case_id = %package.case_id))]
pub async fn score_case(
    State(state): State<AppState>,
    Json(package): Json<EvidencePackage>,
) -> Result<Json<ScoreResponse>, (StatusCode, String)> {
    let request_id = Uuid::new_v4();
    info!(%request_id, "Scoring case");

    validate_package(&package).map_err(|message| {
        error!(%request_id, message, "Rejected invalid evidence package");
        (StatusCode::UNPROCESSABLE_ENTITY, message.to_string())
    })?;

    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || pipeline.score_case(&package))
        .await
        .map_err(|err| {
            error!(%request_id, %err, "Scoring task panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        })?;

    match result {
        Ok(response) => {
            info!(
                %request_id,
                final_risk_score = response.final_risk_score,
                risk_tier = response.risk_tier.as_str(),
                "Case scored"
            );
            Ok(Json(response))
        }
        Err(err) => {
            error!(%request_id, %err, "Scoring failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
        }
    }
}

/// Current aggregation weights
#[instrument(skip(state))]
pub async fn get_weights(State(state): State<AppState>) -> Json<WeightConfig> {
    Json(state.pipeline.current_weights())
}

/// Replace the aggregation weights; applies to subsequent scoring calls
#[instrument(skip(state, payload))]
pub async fn update_weights(
    State(state): State<AppState>,
    Json(payload): Json<WeightUpdateRequest>,
) -> Result<Json<WeightConfig>, (StatusCode, String)> {
    let weights = payload.weights;
    if let Err(err) = weights.validate() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, err.to_string()));
    }
    let sum = weights.image_quality_weight
        + weights.asset_match_weight
        + weights.ocr_match_weight
        + weights.duplicate_weight
        + weights.fraud_score_weight;
    if sum <= 0.0 {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "weights must sum to a positive value".to_string(),
        ));
    }

    state.pipeline.update_weights(weights.clone());
    info!("Aggregation weights updated");
    Ok(Json(weights))
}

fn validate_package(package: &EvidencePackage) -> Result<(), &'static str> {
    if package.case_id.trim().is_empty() {
        return Err("case_id must not be empty");
    }
    if package.metadata.applicant_id.trim().is_empty() {
        return Err("metadata.applicant_id must not be empty");
    }
    let locations = [
        package.metadata.declared_asset_location,
        package.metadata.submission_location,
    ];
    for location in locations.into_iter().flatten() {
        if !location.is_valid() {
            return Err("GPS coordinates out of range");
        }
    }
    if let Some(coords) = &package.gps_coords {
        if coords.iter().any(|coord| !coord.is_valid()) {
            return Err("GPS coordinates out of range");
        }
    }
    Ok(())
}
