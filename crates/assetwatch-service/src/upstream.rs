//! Client for the upstream inventory/CPE backend.
//!
//! All cache fills and all mutations go through the [`InventoryApi`] trait;
//! the caches and the matcher never talk HTTP themselves. Tests substitute
//! their own implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::caching::{CacheEntry, CacheError};
use crate::config::Config;
use crate::types::{AssetComponent, AssetId, ComponentId, Device, MatchResponse, StatCard};

/// The data source behind all caches and mutations.
#[async_trait]
pub trait InventoryApi: Send + Sync + 'static {
    /// Fetches the full component listing of one asset.
    async fn asset_components(&self, asset_id: AssetId) -> CacheEntry<Vec<AssetComponent>>;

    /// Fetches the list of all tracked devices.
    async fn devices(&self) -> CacheEntry<Vec<Device>>;

    /// Fetches the dashboard statistics cards.
    async fn dashboard_stats(&self) -> CacheEntry<Vec<StatCard>>;

    /// Runs the upstream CPE matching pipeline for one component.
    ///
    /// A response with `success: false` is a valid payload (needs-review or
    /// unmatched), not an error.
    async fn trigger_matching(&self, component_id: ComponentId) -> CacheEntry<MatchResponse>;

    /// Persists a manually selected CPE string for one component.
    async fn select_cpe(&self, component_id: ComponentId, cpe_string: &str) -> CacheEntry;
}

/// The standard upstream response envelope.
///
/// Missing `data`/`message` fields deserialize as `None`, also for payload
/// types without a `Default` impl.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> CacheEntry<T> {
        if !self.success {
            return Err(CacheError::Upstream(
                self.message.unwrap_or_else(|| "unspecified failure".into()),
            ));
        }
        self.data
            .ok_or_else(|| CacheError::Malformed("successful envelope without data".into()))
    }
}

/// [`InventoryApi`] implementation talking to the real backend over HTTP.
#[derive(Debug, Clone)]
pub struct HttpInventoryApi {
    client: reqwest::Client,
    base: Url,
    request_timeout: Duration,
}

impl HttpInventoryApi {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base: config.upstream.clone(),
            request_timeout: config.request_timeout,
        })
    }

    fn url(&self, path: &str) -> CacheEntry<Url> {
        self.base
            .join(path)
            .map_err(|e| CacheError::Malformed(format!("invalid upstream path {path:?}: {e}")))
    }

    fn map_error(&self, error: reqwest::Error) -> CacheError {
        if error.is_timeout() {
            CacheError::Timeout(self.request_timeout)
        } else if error.is_decode() {
            CacheError::Malformed(error.to_string())
        } else {
            CacheError::Upstream(error.to_string())
        }
    }

    async fn read_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> CacheEntry<T> {
        match response.status() {
            StatusCode::NOT_FOUND => Err(CacheError::NotFound),
            status if !status.is_success() => {
                Err(CacheError::Upstream(format!("status {status}")))
            }
            _ => response.json().await.map_err(|e| self.map_error(e)),
        }
    }

    async fn get_enveloped<T: DeserializeOwned>(&self, path: &str) -> CacheEntry<T> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        self.read_response::<Envelope<T>>(response)
            .await?
            .into_data()
    }
}

#[async_trait]
impl InventoryApi for HttpInventoryApi {
    async fn asset_components(&self, asset_id: AssetId) -> CacheEntry<Vec<AssetComponent>> {
        self.get_enveloped(&format!("assetComponents/{asset_id}"))
            .await
    }

    async fn devices(&self) -> CacheEntry<Vec<Device>> {
        self.get_enveloped("devices").await
    }

    async fn dashboard_stats(&self) -> CacheEntry<Vec<StatCard>> {
        self.get_enveloped("dashboard/stats").await
    }

    async fn trigger_matching(&self, component_id: ComponentId) -> CacheEntry<MatchResponse> {
        let response = self
            .client
            .post(self.url("cpe/match")?)
            .json(&serde_json::json!({ "component_id": component_id }))
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        // The match response carries its own success flag, no envelope here.
        self.read_response(response).await
    }

    async fn select_cpe(&self, component_id: ComponentId, cpe_string: &str) -> CacheEntry {
        let response = self
            .client
            .post(self.url("cpe/select")?)
            .json(&serde_json::json!({
                "component_id": component_id,
                "cpe_string": cpe_string,
            }))
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let envelope: Envelope<serde_json::Value> = self.read_response(response).await?;
        if !envelope.success {
            return Err(CacheError::Upstream(
                envelope
                    .message
                    .unwrap_or_else(|| "unspecified failure".into()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `Device` has no `Default` impl; the envelope must deserialize anyway.
    #[test]
    fn test_envelope_with_non_default_payload() {
        let json = r#"{
            "success": true,
            "data": [{
                "asset_id": 5,
                "hostname": "web-01",
                "ip_address": "10.0.0.5",
                "asset_type": "server",
                "owner_name": null,
                "created_at": "2026-01-05T08:00:00Z",
                "updated_at": "2026-01-05T08:00:00Z"
            }]
        }"#;
        let envelope: Envelope<Vec<Device>> = serde_json::from_str(json).unwrap();
        let devices = envelope.into_data().unwrap();
        assert_eq!(devices[0].hostname, "web-01");
    }

    #[test]
    fn test_envelope_missing_fields() {
        let envelope: Envelope<Vec<Device>> =
            serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(matches!(
            envelope.into_data(),
            Err(CacheError::Upstream(_))
        ));

        // success without data is a malformed response, not a panic
        let envelope: Envelope<Vec<Device>> =
            serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(matches!(
            envelope.into_data(),
            Err(CacheError::Malformed(_))
        ));
    }
}
