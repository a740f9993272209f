use std::{env, path::PathBuf};

use foodgram::{
    actions::{bulk_create_ingredients, create_tags, read_ingredient_dataset, read_tag_dataset},
    config::Config,
    error::FoodgramError,
    invalidate_catalog,
    server::{connect_cache, connect_database, init_logging},
};

const USAGE: &str = "usage: load_data <ingredients|tags> [path]";

#[tokio::main]
async fn main() -> Result<(), FoodgramError> {
    init_logging();

    let mut args = env::args().skip(1);
    let kind = args
        .next()
        .ok_or_else(|| FoodgramError::Config(USAGE.to_owned()))?;
    let path = args.next().map(PathBuf::from);

    let config = Config::load()?;
    let pool = connect_database(&config).await?;

    let inserted = match kind.as_str() {
        "ingredients" => {
            let path = path.unwrap_or_else(|| config.ingredients_path.clone());
            let ingredients = read_ingredient_dataset(&path).await?;
            log::info!("Read {} ingredients from {}", ingredients.len(), path.display());
            bulk_create_ingredients(&ingredients, &pool).await?
        }
        "tags" => {
            let path = path.ok_or_else(|| FoodgramError::Config(USAGE.to_owned()))?;
            let tags = read_tag_dataset(&path).await?;
            log::info!("Read {} tags from {}", tags.len(), path.display());
            create_tags(&tags, &pool).await?
        }
        _ => return Err(FoodgramError::Config(USAGE.to_owned())),
    };
    log::info!("Inserted {inserted} new {kind}");

    if let Some(mut cache) = connect_cache(&config).await {
        if let Err(e) = invalidate_catalog(&mut cache).await {
            log::warn!("Could not invalidate catalog cache: {e}");
        }
    }

    Ok(())
}
