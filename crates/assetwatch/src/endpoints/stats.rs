use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use assetwatch_service::types::StatCard;

use crate::service::GatewayService;

use super::ResponseError;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub data: Arc<Vec<StatCard>>,
    pub timestamp: DateTime<Utc>,
}

pub async fn dashboard_stats(
    State(service): State<GatewayService>,
) -> Result<Json<StatsResponse>, ResponseError> {
    let data = service.services().stats.get().await?;

    Ok(Json(StatsResponse {
        success: true,
        data,
        timestamp: Utc::now(),
    }))
}
