use std::{convert::Infallible, sync::Arc};

use redis::aio::MultiplexedConnection;
use sqlx::{Pool, Postgres};
use warp::Filter;

use crate::config::Config;

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Postgres>,
    pub cache: Option<MultiplexedConnection>,
    pub config: Arc<Config>,
    pub secret: Arc<Vec<u8>>,
}

impl AppState {
    pub fn new(pool: Pool<Postgres>, cache: Option<MultiplexedConnection>, config: Config) -> Self {
        let secret = Arc::new(config.secret_key.clone());

        Self {
            pool,
            cache,
            config: Arc::new(config),
            secret,
        }
    }
}

pub fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}
