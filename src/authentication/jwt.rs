use chrono::Duration;
use chrono::Utc;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use potion::HtmlError;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::schema::{Id, User};
use crate::error::FoodgramError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub email: String,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, email: String, lifetime: Duration) -> Self {
        let now = Utc::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            email,
            iat,
            exp,
        }
    }
}

fn signing_key(secret: &[u8]) -> Result<Hmac<Sha256>, FoodgramError> {
    Hmac::new_from_slice(secret).map_err(|e| FoodgramError::Crypto(format!("{e}")))
}

pub fn generate_jwt_session(
    user: &User,
    secret: &[u8],
    lifetime: Duration,
) -> Result<String, FoodgramError> {
    let key = signing_key(secret)?;
    let claims = JwtSessionData::new(user.id, user.email.to_owned(), lifetime);

    claims
        .sign_with_key(&key)
        .map_err(|e| FoodgramError::Crypto(format!("{e}")))
}

pub fn verify_jwt_session(token: &str, secret: &[u8]) -> Result<JwtSessionData, potion::Error> {
    let key: Hmac<Sha256> = Hmac::new_from_slice(secret)
        .map_err(|_| HtmlError::InternalServerError.new("Invalid signing key"))?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| HtmlError::InvalidSession.new("Invalid session; Invalid token"))?;

    if (session.exp - Utc::now().timestamp()).is_negative() {
        return Err(HtmlError::InvalidSession.new("Invalid session; Token expired"));
    }

    Ok(session)
}
