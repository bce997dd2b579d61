use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use assetwatch_service::types::Device;

use crate::service::GatewayService;

use super::ResponseError;

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub success: bool,
    pub data: Arc<Vec<Device>>,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

pub async fn list_devices(
    State(service): State<GatewayService>,
) -> Result<Json<DevicesResponse>, ResponseError> {
    let data = service.services().devices.get().await?;

    Ok(Json(DevicesResponse {
        success: true,
        total: data.len(),
        data,
        timestamp: Utc::now(),
    }))
}
