use anyhow::{Context, Result};
use people_db::{
    config::ServerConfig,
    engine::Engine,
    person::PersonStore,
    query::QueryEngine,
    seed::seed_store,
    server::{serve, AppState},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Entry point for the people_db server.
///
/// Startup runs in a fixed order and any failure aborts it:
/// 1. Parse the command line
/// 2. Initialize structured logging with tracing
/// 3. Open the storage engine (WAL recovery included)
/// 4. Open the person store, creating its table on first start
/// 5. Seed fixture and sample records
/// 6. Serve HTTP
///
/// ```bash
/// cargo run -- --data ./dbdata --listen 127.0.0.1:8080 --seed-count 1000
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_matches(&people_db::config::command().get_matches())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let engine = Engine::open(&config.data_dir, config.engine)
        .await
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;
    let store = Arc::new(PersonStore::open(Arc::new(engine)).await?);

    seed_store(&store, &config.seed).await.context("seeding failed")?;

    let queries = Arc::new(QueryEngine::new(store));
    info!(listen = %config.listen, "starting http server");
    serve(AppState::new(queries), &config.listen).await
}
