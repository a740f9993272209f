use foodgram::{
    config::Config,
    error::FoodgramError,
    server::{init_logging, start_server},
};

#[tokio::main]
async fn main() -> Result<(), FoodgramError> {
    init_logging();

    let config = Config::load()?;
    start_server(config).await
}
