use std::net::SocketAddr;

use redis::aio::MultiplexedConnection;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tokio::signal;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    api::{router::routes, state::AppState},
    config::Config,
    error::FoodgramError,
};

/// Installs the log subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

pub async fn connect_database(config: &Config) -> Result<Pool<Postgres>, FoodgramError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    log::info!("Database ready");

    Ok(pool)
}

/// Caching is optional, so a Redis that cannot be reached only disables it.
pub async fn connect_cache(config: &Config) -> Option<MultiplexedConnection> {
    let url = config.redis_url.as_ref()?;

    let connection = match redis::Client::open(url.as_str()) {
        Ok(client) => client.get_multiplexed_async_connection().await,
        Err(e) => Err(e),
    };

    match connection {
        Ok(connection) => {
            log::info!("Catalog cache enabled");
            Some(connection)
        }
        Err(e) => {
            log::warn!("Could not connect to Redis, catalog cache disabled: {e}");
            None
        }
    }
}

pub async fn start_server(config: Config) -> Result<(), FoodgramError> {
    log::info!("Initializing state...");
    let pool = connect_database(&config).await?;
    let cache = connect_cache(&config).await;

    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(pool, cache, config);

    let (address, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(address, shutdown_signal())
        .map_err(|e| FoodgramError::Config(format!("Could not bind {address}: {e}")))?;

    log::info!("Server running on {address}");
    server.await;
    log::info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => log::info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                log::error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
