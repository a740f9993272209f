use std::{fmt, future::Future};

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{Deserialize, Serialize};

use crate::{
    constants::CATALOG_CACHE_BIND,
    cryptography::generate_token,
    error::{CacheError, FoodgramError},
    schema::{Ingredient, Tag},
};

// Caching - keys

#[derive(Clone, Debug, PartialEq)]
pub enum CacheKey {
    Tags,
    Ingredients(Option<String>),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Tags => write!(f, "tags"),
            CacheKey::Ingredients(None) => write!(f, "ingredients"),
            CacheKey::Ingredients(Some(prefix)) => {
                write!(f, "ingredients-{}", prefix.trim().to_lowercase())
            }
        }
    }
}

// Cache - wrappers

/// A catalog list stored together with the bind it was written under.
pub trait CatalogValue: FromRedisValue + ToRedisArgs + Send + Sync + Sized {
    type Value: Clone;

    fn wrap(value: Self::Value, bind: Option<String>) -> Self;
    fn bind(&self) -> Option<&str>;
    fn into_value(self) -> Self::Value;
}

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone, Debug)]
pub struct CachedTags {
    pub value: Vec<Tag>,
    _bind: Option<String>,
}

impl CatalogValue for CachedTags {
    type Value = Vec<Tag>;

    fn wrap(value: Self::Value, bind: Option<String>) -> Self {
        Self { value, _bind: bind }
    }

    fn bind(&self) -> Option<&str> {
        self._bind.as_deref()
    }

    fn into_value(self) -> Self::Value {
        self.value
    }
}

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone, Debug)]
pub struct CachedIngredients {
    pub value: Vec<Ingredient>,
    _bind: Option<String>,
}

impl CatalogValue for CachedIngredients {
    type Value = Vec<Ingredient>;

    fn wrap(value: Self::Value, bind: Option<String>) -> Self {
        Self { value, _bind: bind }
    }

    fn bind(&self) -> Option<&str> {
        self._bind.as_deref()
    }

    fn into_value(self) -> Self::Value {
        self.value
    }
}

/// Returns the cached value when its bind is still current, otherwise runs
/// `fetch` and stores the result. Redis failures never fail the request.
pub async fn get_or_fetch<V, F, Fut>(
    key: CacheKey,
    cache: Option<&MultiplexedConnection>,
    fetch: F,
) -> Result<V::Value, FoodgramError>
where
    V: CatalogValue,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V::Value, FoodgramError>>,
{
    let Some(cache) = cache else {
        return fetch().await;
    };
    let mut cache = cache.clone();

    let bind = match get_cache_value::<&str, String>(CATALOG_CACHE_BIND, &mut cache).await {
        Ok(bind) => bind,
        Err(e) => {
            log::warn!("Cache unavailable, reading {key} from database: {e}");
            return fetch().await;
        }
    };

    match get_cache_value::<String, V>(key.to_string(), &mut cache).await {
        Ok(Some(value)) if value.bind() == bind.as_deref() => {
            log::trace!("> Found {key}");
            return Ok(value.into_value());
        }
        Ok(Some(_)) => log::trace!("> Invalidated {key}"),
        Ok(None) => {}
        Err(e) => {
            log::error!("> Failed to deserialize cached value. Deleting {key}: {e}");
            if let Err(e) = delete_cache_value(key.to_string(), &mut cache).await {
                log::error!("> Failed to delete cached value! {e}");
            }
        }
    }

    log::trace!("> Fetching {key}");
    let value = fetch().await?;

    if let Err(e) = set_cache_value(key.to_string(), V::wrap(value.clone(), bind), &mut cache).await
    {
        log::error!("> Failed to cache {key}: {e}");
    }

    Ok(value)
}

/// Rotates the catalog bind, which makes every cached catalog list stale.
pub async fn invalidate_catalog(cache: &mut MultiplexedConnection) -> Result<(), FoodgramError> {
    set_cache_value(CATALOG_CACHE_BIND, generate_token(32), cache).await?;
    log::info!("Catalog cache invalidated");
    Ok(())
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), FoodgramError> {
    let _: () = cache
        .set(key, value)
        .await
        .map_err(|e| FoodgramError::Cache(CacheError::from(e)))?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), FoodgramError> {
    let _: () = cache
        .del(key)
        .await
        .map_err(|e| FoodgramError::Cache(CacheError::from(e)))?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, FoodgramError> {
    let value: Option<V> = cache
        .get(key)
        .await
        .map_err(|e| FoodgramError::Cache(CacheError::from(e)))?;

    Ok(value)
}
