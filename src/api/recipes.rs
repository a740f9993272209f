use warp::{
    http::StatusCode,
    reject::{self, Rejection},
    reply::{self, Reply},
    Filter,
};

use crate::{
    actions::{
        add_favorite, add_to_shopping_cart, build_shopping_list, create_recipe, delete_recipe,
        fetch_recipes, get_recipe, get_recipe_short, get_user_by_id, remove_favorite,
        remove_from_shopping_cart, update_recipe, RecipeFilter,
    },
    constants::{MAX_BODY_SIZE, SHOPPING_LIST_FILENAME},
    error::FoodgramError,
    jwt::JwtSessionData,
    middleware::{with_possible_session, with_session},
    pagination::PageQuery,
    schema::{Id, RecipePayload},
};

use super::state::{with_state, AppState};

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, FoodgramError> {
    value
        .trim()
        .parse()
        .map_err(|_| FoodgramError::validation(field, "Enter a number."))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "True")
}

/// `tags` may repeat, so the query string is read as raw pairs.
pub fn parse_recipe_query(
    pairs: Vec<(String, String)>,
) -> Result<(RecipeFilter, PageQuery), FoodgramError> {
    let mut filter = RecipeFilter::default();
    let mut page = PageQuery::default();

    for (key, value) in pairs {
        match key.as_str() {
            "author" => filter.author = Some(parse_number("author", &value)?),
            "tags" => filter.tags.push(value),
            "is_favorited" => filter.is_favorited = parse_flag(&value),
            "is_in_shopping_cart" => filter.is_in_shopping_cart = parse_flag(&value),
            "page" => page.page = Some(parse_number("page", &value)?),
            "limit" => page.limit = Some(parse_number("limit", &value)?),
            _ => {}
        }
    }

    Ok((filter, page))
}

async fn list_recipes(
    state: AppState,
    session: Option<JwtSessionData>,
    pairs: Vec<(String, String)>,
) -> Result<impl Reply, Rejection> {
    let (filter, page) = parse_recipe_query(pairs).map_err(reject::custom)?;
    let viewer = session.map(|s| s.user_id);

    let recipes = fetch_recipes(viewer, filter, page, state.config.page_size, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&recipes))
}

async fn retrieve_recipe(
    id: Id,
    state: AppState,
    session: Option<JwtSessionData>,
) -> Result<impl Reply, Rejection> {
    let recipe = get_recipe(session.map(|s| s.user_id), id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&recipe))
}

async fn post_recipe(
    state: AppState,
    session: JwtSessionData,
    payload: RecipePayload,
) -> Result<impl Reply, Rejection> {
    let recipe = create_recipe(session.user_id, payload, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::with_status(reply::json(&recipe), StatusCode::CREATED))
}

async fn patch_recipe(
    id: Id,
    state: AppState,
    session: JwtSessionData,
    payload: RecipePayload,
) -> Result<impl Reply, Rejection> {
    let recipe = update_recipe(id, session.user_id, payload, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&recipe))
}

async fn remove_recipe(
    id: Id,
    state: AppState,
    session: JwtSessionData,
) -> Result<impl Reply, Rejection> {
    delete_recipe(id, session.user_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(StatusCode::NO_CONTENT)
}

async fn favorite(
    id: Id,
    state: AppState,
    session: JwtSessionData,
) -> Result<impl Reply, Rejection> {
    let recipe = get_recipe_short(id, &state.pool)
        .await
        .map_err(reject::custom)?;
    add_favorite(session.user_id, recipe.id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::with_status(reply::json(&recipe), StatusCode::CREATED))
}

async fn unfavorite(
    id: Id,
    state: AppState,
    session: JwtSessionData,
) -> Result<impl Reply, Rejection> {
    let recipe = get_recipe_short(id, &state.pool)
        .await
        .map_err(reject::custom)?;
    remove_favorite(session.user_id, recipe.id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(StatusCode::NO_CONTENT)
}

async fn add_to_cart(
    id: Id,
    state: AppState,
    session: JwtSessionData,
) -> Result<impl Reply, Rejection> {
    let recipe = get_recipe_short(id, &state.pool)
        .await
        .map_err(reject::custom)?;
    add_to_shopping_cart(session.user_id, recipe.id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::with_status(reply::json(&recipe), StatusCode::CREATED))
}

async fn remove_from_cart(
    id: Id,
    state: AppState,
    session: JwtSessionData,
) -> Result<impl Reply, Rejection> {
    let recipe = get_recipe_short(id, &state.pool)
        .await
        .map_err(reject::custom)?;
    remove_from_shopping_cart(session.user_id, recipe.id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(StatusCode::NO_CONTENT)
}

async fn download_shopping_cart(
    state: AppState,
    session: JwtSessionData,
) -> Result<impl Reply, Rejection> {
    let user = get_user_by_id(&state.pool, session.user_id)
        .await
        .map_err(reject::custom)?
        .ok_or_else(|| reject::custom(FoodgramError::Unauthenticated))?;

    let list = build_shopping_list(&user, &state.pool)
        .await
        .map_err(reject::custom)?;

    let reply = reply::with_header(list.render(), "content-type", "text/plain; charset=utf-8");
    Ok(reply::with_header(
        reply,
        "content-disposition",
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    ))
}

pub fn recipe_routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let recipes = warp::path("recipes");
    let json_body = warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json());

    let list = recipes
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_possible_session(state.secret.clone()))
        .and(warp::query::<Vec<(String, String)>>())
        .and_then(list_recipes);

    let create = recipes
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and(json_body.clone())
        .and_then(post_recipe);

    let download = recipes
        .and(warp::path("download_shopping_cart"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and_then(download_shopping_cart);

    let retrieve = recipes
        .and(warp::path::param::<Id>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_possible_session(state.secret.clone()))
        .and_then(retrieve_recipe);

    let update = recipes
        .and(warp::path::param::<Id>())
        .and(warp::path::end())
        .and(warp::patch())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and(json_body)
        .and_then(patch_recipe);

    let delete = recipes
        .and(warp::path::param::<Id>())
        .and(warp::path::end())
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and_then(remove_recipe);

    let favorite_path = recipes
        .and(warp::path::param::<Id>())
        .and(warp::path("favorite"))
        .and(warp::path::end());

    let add_favorite = favorite_path
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and_then(favorite);

    let delete_favorite = favorite_path
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and_then(unfavorite);

    let cart_path = recipes
        .and(warp::path::param::<Id>())
        .and(warp::path("shopping_cart"))
        .and(warp::path::end());

    let add_cart = cart_path
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and_then(add_to_cart);

    let delete_cart = cart_path
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and_then(remove_from_cart);

    list.or(create)
        .or(download)
        .or(retrieve)
        .or(update)
        .or(delete)
        .or(add_favorite)
        .or(delete_favorite)
        .or(add_cart)
        .or(delete_cart)
}
