use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::{error::ApiResult, main_lib::AppState, metrics::render};

/// Process metrics and the shared counters, independent of any scrape.
pub async fn process_metrics(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let body = render(&state.process_registry)?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}
