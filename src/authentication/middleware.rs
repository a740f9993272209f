use std::sync::Arc;

use warp::{
    reject::{self, Rejection},
    Filter,
};

use crate::error::FoodgramError;

use super::jwt::{verify_jwt_session, JwtSessionData};

/// Accepts `Authorization: Token <jwt>` as well as the `Bearer` scheme.
fn token_from_header(header: &str) -> Option<&str> {
    header
        .strip_prefix("Token ")
        .or_else(|| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn with_session(
    secret: Arc<Vec<u8>>,
) -> impl Filter<Extract = (JwtSessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let secret = secret.clone();
        async move {
            let token = header
                .as_deref()
                .and_then(token_from_header)
                .ok_or_else(|| reject::custom(FoodgramError::Unauthenticated))?;

            verify_jwt_session(token, &secret).map_err(|e| {
                log::debug!("Rejected session: {e}");
                reject::custom(FoodgramError::from(e))
            })
        }
    })
}

/// Anonymous readers get `None`; a broken token is treated the same way.
pub fn with_possible_session(
    secret: Arc<Vec<u8>>,
) -> impl Filter<Extract = (Option<JwtSessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").map(move |header: Option<String>| {
        header
            .as_deref()
            .and_then(token_from_header)
            .and_then(|token| verify_jwt_session(token, &secret).ok())
    })
}
