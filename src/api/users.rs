use serde::Deserialize;
use serde_json::json;
use warp::{
    http::StatusCode,
    reject::{self, Rejection},
    reply::{self, Reply},
    Filter,
};

use crate::{
    actions::{
        fetch_users, follow, get_profile, get_subscription, list_subscriptions, login_user,
        register_user, unfollow,
    },
    constants::MAX_BODY_SIZE,
    jwt::JwtSessionData,
    middleware::{with_possible_session, with_session},
    pagination::PageQuery,
    schema::{Id, LoginPayload, RegisterPayload},
};

use super::state::{with_state, AppState};

#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub struct SubscriptionQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub recipes_limit: Option<i64>,
}

impl SubscriptionQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }

    /// Negative limits are ignored.
    pub fn recipes_limit(&self) -> Option<i64> {
        self.recipes_limit.filter(|limit| *limit >= 0)
    }
}

async fn register(state: AppState, payload: RegisterPayload) -> Result<impl Reply, Rejection> {
    let profile = register_user(payload, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::with_status(reply::json(&profile), StatusCode::CREATED))
}

async fn list_users(
    state: AppState,
    session: Option<JwtSessionData>,
    query: PageQuery,
) -> Result<impl Reply, Rejection> {
    let users = fetch_users(
        session.map(|s| s.user_id),
        query,
        state.config.page_size,
        &state.pool,
    )
    .await
    .map_err(reject::custom)?;

    Ok(reply::json(&users))
}

async fn me(state: AppState, session: JwtSessionData) -> Result<impl Reply, Rejection> {
    let profile = get_profile(Some(session.user_id), session.user_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&profile))
}

async fn user(
    id: Id,
    state: AppState,
    session: Option<JwtSessionData>,
) -> Result<impl Reply, Rejection> {
    let profile = get_profile(session.map(|s| s.user_id), id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&profile))
}

async fn subscriptions(
    state: AppState,
    session: JwtSessionData,
    query: SubscriptionQuery,
) -> Result<impl Reply, Rejection> {
    let page = list_subscriptions(
        session.user_id,
        query.page(),
        query.recipes_limit(),
        state.config.page_size,
        &state.pool,
    )
    .await
    .map_err(reject::custom)?;

    Ok(reply::json(&page))
}

async fn subscribe(
    id: Id,
    state: AppState,
    session: JwtSessionData,
    query: SubscriptionQuery,
) -> Result<impl Reply, Rejection> {
    follow(session.user_id, id, &state.pool)
        .await
        .map_err(reject::custom)?;

    let subscription = get_subscription(session.user_id, id, query.recipes_limit(), &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::with_status(
        reply::json(&subscription),
        StatusCode::CREATED,
    ))
}

async fn unsubscribe(
    id: Id,
    state: AppState,
    session: JwtSessionData,
) -> Result<impl Reply, Rejection> {
    unfollow(session.user_id, id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(StatusCode::NO_CONTENT)
}

async fn login(state: AppState, payload: LoginPayload) -> Result<impl Reply, Rejection> {
    let token = login_user(
        &payload.email,
        &payload.password,
        &state.secret,
        state.config.session_lifetime(),
        &state.pool,
    )
    .await
    .map_err(reject::custom)?;

    Ok(reply::json(&json!({ "auth_token": token })))
}

// Tokens are stateless; the client drops its copy
async fn logout(session: JwtSessionData) -> Result<impl Reply, Rejection> {
    log::debug!("User {} logged out", session.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn user_routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let users = warp::path("users");

    let create = users
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::content_length_limit(MAX_BODY_SIZE))
        .and(warp::body::json())
        .and_then(register);

    let list = users
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_possible_session(state.secret.clone()))
        .and(warp::query::<PageQuery>())
        .and_then(list_users);

    let current = users
        .and(warp::path("me"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and_then(me);

    let subscription_list = users
        .and(warp::path("subscriptions"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and(warp::query::<SubscriptionQuery>())
        .and_then(subscriptions);

    let retrieve = users
        .and(warp::path::param::<Id>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_possible_session(state.secret.clone()))
        .and_then(user);

    let subscribe_path = users
        .and(warp::path::param::<Id>())
        .and(warp::path("subscribe"))
        .and(warp::path::end());

    let add_subscription = subscribe_path
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and(warp::query::<SubscriptionQuery>())
        .and_then(subscribe);

    let remove_subscription = subscribe_path
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and(with_session(state.secret.clone()))
        .and_then(unsubscribe);

    let token = warp::path("auth").and(warp::path("token"));

    let token_login = token
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::content_length_limit(MAX_BODY_SIZE))
        .and(warp::body::json())
        .and_then(login);

    let token_logout = token
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_session(state.secret.clone()))
        .and_then(logout);

    create
        .or(list)
        .or(current)
        .or(subscription_list)
        .or(retrieve)
        .or(add_subscription)
        .or(remove_subscription)
        .or(token_login)
        .or(token_logout)
}
