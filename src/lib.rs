mod database {
    pub mod actions;
    pub mod error;
    pub mod pagination;
    pub mod schema;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
}
pub mod api {
    pub mod catalog;
    pub mod recipes;
    pub mod rejection;
    pub mod router;
    pub mod state;
    pub mod users;
}
mod constants;

mod cache {
    pub mod cache;
}

pub mod config;
pub mod server;

pub use api::{router::routes, state::AppState};
pub use authentication::*;
pub use cache::cache::*;
pub use constants::*;
pub use database::*;
