mod health;
mod help;
mod metrics;
mod price;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{config::Config, main_lib::AppState};

pub use health::healthz;

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    Router::new()
        .route("/", get(help::help))
        .route(&config.scrape_path, get(price::scrape))
        .route("/metrics", get(metrics::process_metrics))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
}
