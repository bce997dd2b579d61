use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use assetwatch_service::types::{AssetId, ComponentsList};

use crate::service::GatewayService;

use super::ResponseError;

/// Response of the component listing endpoint.
#[derive(Debug, Serialize)]
pub struct ComponentsResponse {
    pub success: bool,
    pub data: ComponentsList,
    pub asset_id: AssetId,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

pub async fn asset_components(
    State(service): State<GatewayService>,
    Path(asset_id): Path<AssetId>,
) -> Result<Json<ComponentsResponse>, ResponseError> {
    let data = service
        .services()
        .components
        .get(Some(asset_id))
        .await?;

    Ok(Json(ComponentsResponse {
        success: true,
        total: data.len(),
        data,
        asset_id,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PrefetchRequest {
    pub asset_ids: Vec<AssetId>,
}

#[derive(Debug, Serialize)]
pub struct PrefetchResponse {
    pub success: bool,
    /// How many distinct assets were accepted for warming.
    pub accepted: usize,
}

/// Kicks off background cache warming for a batch of assets.
///
/// The response does not wait for any upstream traffic; failures only show up
/// in logs and metrics.
pub async fn prefetch_components(
    State(service): State<GatewayService>,
    Json(request): Json<PrefetchRequest>,
) -> (StatusCode, Json<PrefetchResponse>) {
    let mut distinct = request.asset_ids.clone();
    distinct.sort_unstable();
    distinct.dedup();
    let accepted = distinct
        .len()
        .min(assetwatch_service::prefetch::MAX_PREFETCH_ASSETS);

    let components = service.services().components.clone();
    tokio::spawn(async move { components.prefetch_many(&request.asset_ids).await });

    (
        StatusCode::ACCEPTED,
        Json(PrefetchResponse {
            success: true,
            accepted,
        }),
    )
}
