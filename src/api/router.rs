use std::convert::Infallible;

use warp::{reply::Reply, Filter};

use super::{
    catalog::catalog_routes, recipes::recipe_routes, rejection::handle_rejection,
    state::AppState, users::user_routes,
};

/// Every endpoint, with errors rendered as JSON.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    recipe_routes(state.clone())
        .or(user_routes(state.clone()))
        .or(catalog_routes(state))
        .recover(handle_rejection)
        .with(warp::log("foodgram::api"))
}
