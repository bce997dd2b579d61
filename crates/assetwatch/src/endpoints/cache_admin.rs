use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use assetwatch_service::caching::CacheInfo;

use crate::service::GatewayService;

#[derive(Debug, Serialize)]
pub struct CacheInfoResponse {
    pub success: bool,
    pub caches: Vec<CacheInfo>,
    pub timestamp: DateTime<Utc>,
}

pub async fn cache_info(State(service): State<GatewayService>) -> Json<CacheInfoResponse> {
    Json(CacheInfoResponse {
        success: true,
        caches: service.services().cache_info().await,
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub success: bool,
    pub message: &'static str,
}

pub async fn clear_components_cache(
    State(service): State<GatewayService>,
) -> Json<CacheClearResponse> {
    service.services().clear_components_cache();
    Json(CacheClearResponse {
        success: true,
        message: "components cache cleared",
    })
}
