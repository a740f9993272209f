use serde::Deserialize;
use warp::{
    reject::{self, Rejection},
    reply::{self, Reply},
    Filter,
};

use crate::{
    actions::{get_ingredient, get_tag, list_ingredients, list_tags},
    cache::cache::{get_or_fetch, CacheKey, CachedIngredients, CachedTags},
    schema::Id,
};

use super::state::{with_state, AppState};

#[derive(Deserialize, Debug, Default)]
pub struct IngredientQuery {
    pub name: Option<String>,
}

async fn all_tags(state: AppState) -> Result<impl Reply, Rejection> {
    let pool = state.pool.clone();
    let tags = get_or_fetch::<CachedTags, _, _>(CacheKey::Tags, state.cache.as_ref(), || async move {
        list_tags(&pool).await
    })
    .await
    .map_err(reject::custom)?;

    Ok(reply::json(&tags))
}

async fn one_tag(id: Id, state: AppState) -> Result<impl Reply, Rejection> {
    let tag = get_tag(id, &state.pool).await.map_err(reject::custom)?;
    Ok(reply::json(&tag))
}

async fn search_ingredients(
    state: AppState,
    query: IngredientQuery,
) -> Result<impl Reply, Rejection> {
    let name = query.name.filter(|name| !name.trim().is_empty());
    let pool = state.pool.clone();
    let key = CacheKey::Ingredients(name.clone());

    let ingredients =
        get_or_fetch::<CachedIngredients, _, _>(key, state.cache.as_ref(), || async move {
            list_ingredients(name.as_deref(), &pool).await
        })
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&ingredients))
}

async fn one_ingredient(id: Id, state: AppState) -> Result<impl Reply, Rejection> {
    let ingredient = get_ingredient(id, &state.pool)
        .await
        .map_err(reject::custom)?;
    Ok(reply::json(&ingredient))
}

pub fn catalog_routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let tags = warp::path("tags")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(all_tags);

    let tag = warp::path("tags")
        .and(warp::path::param::<Id>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(one_tag);

    let ingredients = warp::path("ingredients")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(warp::query::<IngredientQuery>())
        .and_then(search_ingredients);

    let ingredient = warp::path("ingredients")
        .and(warp::path::param::<Id>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .and_then(one_ingredient);

    tags.or(tag).or(ingredients).or(ingredient)
}
