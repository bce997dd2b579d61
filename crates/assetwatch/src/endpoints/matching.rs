use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use assetwatch_service::types::{ComponentId, CpeCandidate, MatchMethod, MatchOutcome};

use crate::service::GatewayService;

use super::ResponseError;

/// Response of the matching endpoints, mirroring the upstream wire shape.
#[derive(Debug, Default, Serialize)]
pub struct MatchingResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<MatchMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpe_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    pub needs_manual_review: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CpeCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<MatchOutcome> for MatchingResponse {
    fn from(outcome: MatchOutcome) -> Self {
        match outcome {
            MatchOutcome::Resolved {
                method,
                cpe_string,
                confidence_score,
            } => MatchingResponse {
                success: true,
                method: Some(method),
                cpe_string: Some(cpe_string),
                confidence_score,
                message: Some("CPE matching completed successfully".into()),
                ..Default::default()
            },
            MatchOutcome::NeedsReview {
                candidates,
                message,
            } => MatchingResponse {
                needs_manual_review: true,
                candidates,
                message: message.or_else(|| Some("manual review required".into())),
                ..Default::default()
            },
            MatchOutcome::Unmatched { message } => MatchingResponse {
                message: message.or_else(|| Some("no CPE match found".into())),
                ..Default::default()
            },
        }
    }
}

/// Runs the CPE matching workflow for one component.
///
/// At most one matching run per component is processed at a time; duplicate
/// requests are rejected with a 409 instead of racing each other's cache
/// writes.
///
/// The workflow runs in a spawned task: when the client disconnects, axum
/// drops this handler future, but the mutation still runs to completion and
/// commits or rolls back — cached listings are never stranded with the
/// in-progress flag set. The 409 guard lives in the task for the same reason.
pub async fn match_component(
    State(service): State<GatewayService>,
    Path(component_id): Path<ComponentId>,
) -> Result<Json<MatchingResponse>, ResponseError> {
    let Some(guard) = service.try_begin_match(component_id) else {
        return Err(ResponseError::conflict(format!(
            "matching for component {component_id} is already in progress"
        )));
    };

    let matcher = service.services().matcher.clone();
    let task = tokio::spawn(async move {
        let _guard = guard;
        matcher.match_component(component_id).await
    });

    let outcome = task
        .await
        .map_err(|e| ResponseError::from(anyhow::Error::new(e)))??;
    Ok(Json(outcome.into()))
}

#[derive(Debug, Deserialize)]
pub struct SelectCpeRequest {
    pub cpe_string: String,
}

/// Persists a manually chosen CPE string for one component.
///
/// Spawned for the same reason as [`match_component`]: a disconnecting client
/// must not cancel the per-asset cache writes halfway through.
pub async fn select_cpe(
    State(service): State<GatewayService>,
    Path(component_id): Path<ComponentId>,
    Json(request): Json<SelectCpeRequest>,
) -> Result<Json<MatchingResponse>, ResponseError> {
    let Some(guard) = service.try_begin_match(component_id) else {
        return Err(ResponseError::conflict(format!(
            "matching for component {component_id} is already in progress"
        )));
    };

    let matcher = service.services().matcher.clone();
    let cpe_string = request.cpe_string.clone();
    let task = tokio::spawn(async move {
        let _guard = guard;
        matcher.select_manually(component_id, &cpe_string).await
    });
    task.await
        .map_err(|e| ResponseError::from(anyhow::Error::new(e)))??;

    Ok(Json(MatchingResponse {
        success: true,
        method: Some(MatchMethod::Manual),
        cpe_string: Some(request.cpe_string),
        message: Some("CPE selection saved".into()),
        ..Default::default()
    }))
}
