use std::fmt::{self, Display};

use warp::reject::Reject;

#[derive(Debug)]
pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self::new(format!("{e}")),
            sqlx::Error::RowNotFound => Self::new(format!("RowNotFound")),
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("Column not found: {e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::PoolTimedOut => Self::new(format!("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(format!("Pool closed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info)
    }
}

#[derive(Debug)]
pub struct CacheError {
    info: String,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info)
    }
}

/// Every failure a foodgram operation can report.
///
/// The first group are client errors and carry the message shown to the API
/// consumer; the rest are server-side failures.
#[derive(Debug)]
pub enum FoodgramError {
    Validation { field: &'static str, message: String },
    AlreadyExists(String),
    NotFound(String),
    SelfFollow,
    EmptyCart,
    DoesNotExist(&'static str),
    Forbidden(String),
    Unauthenticated,
    Session(potion::Error),

    Query(QueryError),
    Cache(CacheError),
    Config(String),
    Dataset(String),
    Crypto(String),
}

impl FoodgramError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Validation { .. }
            | Self::AlreadyExists(_)
            | Self::NotFound(_)
            | Self::SelfFollow
            | Self::EmptyCart => 400,
            Self::Unauthenticated | Self::Session(_) => 401,
            Self::Forbidden(_) => 403,
            Self::DoesNotExist(_) => 404,
            Self::Query(_) | Self::Cache(_) | Self::Config(_) | Self::Dataset(_) | Self::Crypto(_) => {
                500
            }
        }
    }
}

impl Display for FoodgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { field, message } => write!(f, "{field}: {message}"),
            Self::AlreadyExists(info) => write!(f, "{info}"),
            Self::NotFound(info) => write!(f, "{info}"),
            Self::SelfFollow => write!(f, "You cannot subscribe to yourself"),
            Self::EmptyCart => write!(f, "Shopping cart is empty"),
            Self::DoesNotExist(what) => write!(f, "{what} not found"),
            Self::Forbidden(info) => write!(f, "{info}"),
            Self::Unauthenticated => write!(f, "Authentication credentials were not provided"),
            Self::Session(e) => write!(f, "{e}"),
            Self::Query(e) => write!(f, "Query failed: {e}"),
            Self::Cache(e) => write!(f, "Cache failed: {e}"),
            Self::Config(info) => write!(f, "Misconfigured: {info}"),
            Self::Dataset(info) => write!(f, "Invalid dataset: {info}"),
            Self::Crypto(info) => write!(f, "Crypto failure: {info}"),
        }
    }
}

impl std::error::Error for FoodgramError {}

impl Reject for FoodgramError {}

impl From<sqlx::Error> for FoodgramError {
    fn from(value: sqlx::Error) -> Self {
        if let Some(e) = value.as_database_error() {
            if e.is_unique_violation() {
                return Self::AlreadyExists(String::from("Object already exists"));
            }
            if e.is_foreign_key_violation() {
                return Self::DoesNotExist("Related object");
            }
        }

        Self::Query(QueryError::from(value))
    }
}

impl From<sqlx::migrate::MigrateError> for FoodgramError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        Self::Query(QueryError::new(format!("{value}")))
    }
}

impl From<redis::RedisError> for FoodgramError {
    fn from(value: redis::RedisError) -> Self {
        Self::Cache(CacheError::from(value))
    }
}

impl From<potion::Error> for FoodgramError {
    fn from(value: potion::Error) -> Self {
        Self::Session(value)
    }
}
