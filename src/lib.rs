pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::config::{Settings, StoreBackend};
use crate::core::{redis::RedisHandle, state::AppState, telemetry};
use crate::repositories::{MemoryReviewStore, PgReviewStore, ReviewStore};

async fn build_store(settings: &Settings) -> anyhow::Result<Arc<dyn ReviewStore>> {
    match settings.store().backend {
        StoreBackend::Postgres => {
            let db_pool = db::init_pool(settings).await?;
            db::run_migrations(&db_pool).await?;
            Ok(Arc::new(PgReviewStore::new(db_pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory review store; state is lost on restart");
            Ok(Arc::new(MemoryReviewStore::new()))
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let store = build_store(&settings).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; dialog state unavailable");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let state = AppState::new(settings, store, redis.clone());
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        store = state.store().backend(),
        n_graders = state.settings().review().n_graders,
        "Peer review API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
