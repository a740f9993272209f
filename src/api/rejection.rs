use std::convert::Infallible;

use serde_json::{json, Map, Value};
use warp::{
    filters::body::BodyDeserializeError,
    http::StatusCode,
    reject::{
        InvalidQuery, LengthRequired, MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType,
    },
    reply, Rejection, Reply,
};

use crate::error::FoodgramError;

/// Body of an error response: field errors map the field to a list of
/// messages, relation errors use `errors`, everything else `detail`.
pub fn error_body(error: &FoodgramError) -> Value {
    match error {
        FoodgramError::Validation { field, message } => {
            let mut body = Map::new();
            body.insert(field.to_string(), json!([message]));
            Value::Object(body)
        }
        FoodgramError::AlreadyExists(_)
        | FoodgramError::NotFound(_)
        | FoodgramError::SelfFollow
        | FoodgramError::EmptyCart => json!({ "errors": error.to_string() }),
        FoodgramError::Session(_) => json!({ "detail": "Invalid token." }),
        e if e.status() >= 500 => json!({ "detail": "Internal server error" }),
        e => json!({ "detail": e.to_string() }),
    }
}

fn detail(status: StatusCode, message: &str) -> (StatusCode, Value) {
    (status, json!({ "detail": message }))
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = if let Some(e) = err.find::<FoodgramError>() {
        if e.status() >= 500 {
            log::error!("{e}");
        } else {
            log::debug!("{e}");
        }
        let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, error_body(e))
    } else if err.is_not_found() {
        detail(StatusCode::NOT_FOUND, "Not found.")
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        detail(StatusCode::BAD_REQUEST, &format!("Malformed body: {e}"))
    } else if let Some(e) = err.find::<InvalidQuery>() {
        detail(StatusCode::BAD_REQUEST, &format!("{e}"))
    } else if err.find::<PayloadTooLarge>().is_some() {
        detail(StatusCode::PAYLOAD_TOO_LARGE, "Request body is too large.")
    } else if err.find::<LengthRequired>().is_some() {
        detail(StatusCode::LENGTH_REQUIRED, "Content-Length is required.")
    } else if err.find::<UnsupportedMediaType>().is_some() {
        detail(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported media type.")
    } else if err.find::<MethodNotAllowed>().is_some() {
        detail(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.")
    } else {
        log::error!("Unhandled rejection: {err:?}");
        detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(reply::with_status(reply::json(&body), status))
}
