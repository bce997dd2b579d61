use axum::Router;
use axum::routing::{get, post};
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tower::ServiceBuilder;

use assetwatch_service::metric;

use crate::service::GatewayService;

mod cache_admin;
mod components;
mod devices;
mod error;
mod matching;
mod stats;


pub use error::ResponseError;

pub async fn healthcheck() -> &'static str {
    metric!(counter("healthcheck") += 1);
    "ok"
}

pub fn create_app(service: GatewayService) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction());

    Router::new()
        .route("/devices", get(devices::list_devices))
        .route(
            "/assetComponents/{asset_id}",
            get(components::asset_components),
        )
        .route(
            "/assetComponents/prefetch",
            post(components::prefetch_components),
        )
        .route(
            "/components/{component_id}/cpe-match",
            post(matching::match_component),
        )
        .route(
            "/components/{component_id}/cpe-select",
            post(matching::select_cpe),
        )
        .route("/dashboard/stats", get(stats::dashboard_stats))
        .route("/cache/info", get(cache_admin::cache_info))
        .route("/cache/clear", post(cache_admin::clear_components_cache))
        .with_state(service)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}
