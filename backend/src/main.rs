//! Backend entry-point: wires the cache backend, the durable store, and the
//! HTTP/WebSocket surfaces.

use std::sync::Arc;

use actix_web::{App, HttpServer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use backend::domain::collab::CollabService;
use backend::domain::ports::{CacheBackend, FixtureStrokeRepository, StrokeRepository};
use backend::outbound::cache::RedisCacheBackend;
use backend::outbound::persistence::{DbPool, DieselStrokeRepository};
use backend::server::{AppConfig, configure_app};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %err, "tracing init failed");
    }

    let config = AppConfig::from_env();

    let cache: Arc<dyn CacheBackend> =
        Arc::new(RedisCacheBackend::new(&config.redis_url, config.redis_pool_size).map_err(
            |err| std::io::Error::other(format!("cache backend setup failed: {err}")),
        )?);

    let strokes: Arc<dyn StrokeRepository> = match &config.database_url {
        Some(url) => {
            let pool = DbPool::new(url, config.db_pool_size)
                .await
                .map_err(|err| std::io::Error::other(format!("database pool failed: {err}")))?;
            Arc::new(DieselStrokeRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; stroke history is in-memory and will not survive restarts");
            Arc::new(FixtureStrokeRepository::new())
        }
    };

    let service = Arc::new(CollabService::new(cache, strokes));

    info!(addr = %config.bind_addr, "starting server");
    HttpServer::new(move || App::new().configure(configure_app(service.clone())))
        .bind(config.bind_addr)?
        .run()
        .await
}
