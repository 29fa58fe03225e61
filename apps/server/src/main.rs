use twelvedata_exporter::{
    api::app_router, build_state, config::Config, init_tracing, scheduler::start_cache_sweeper,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    let state = build_state(&config)?;

    start_cache_sweeper(state.cache.clone());

    let router = app_router(state, &config);
    tracing::info!(
        "Listening on {} (scrape path {})",
        config.listen_addr,
        config.scrape_path
    );
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
