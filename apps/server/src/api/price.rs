use std::sync::Arc;

use axum::{
    extract::{OriginalUri, RawQuery, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::{error, info};

use crate::{
    collector::{parse_symbols, PriceCollector},
    error::{ApiError, ApiResult},
    main_lib::AppState,
    metrics::render,
};

/// Handle one price scrape.
///
/// The typical query is `?symbols=AAA,BBB&symbols=CCC`. A request without
/// any `symbols` parameter fails with 400 and no exposition body.
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    RawQuery(raw): RawQuery,
) -> ApiResult<Response> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw.as_deref().unwrap_or(""))
        .map_err(|e| ApiError::BadRequest(format!("invalid query: {}", e)))?;

    let symbols = parse_symbols(&pairs).map_err(|e| {
        error!("{}: {}", e, uri);
        e
    })?;
    info!("URL: {}", uri);

    let collector = PriceCollector::new(state.cache.clone(), state.metrics.clone(), symbols)?;
    collector.collect().await;

    let body = render(&collector.into_registry()?)?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}
