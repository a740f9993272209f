use std::path::Path;

use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    constants::{MAX_BIND_PARAMETERS, MAX_NAME_LENGTH},
    error::FoodgramError,
    schema::{Id, NewTag, Tag},
};

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, FoodgramError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(list)
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Tag, FoodgramError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    tag.ok_or(FoodgramError::DoesNotExist("Tag"))
}

/// `#RRGGBB` or `#RRGGBBAA`.
pub fn is_valid_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => matches!(hex.len(), 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

pub fn validate_tag(tag: &NewTag) -> Result<(), FoodgramError> {
    if tag.name.trim().is_empty() || tag.name.chars().count() > MAX_NAME_LENGTH {
        return Err(FoodgramError::Dataset(format!("Invalid tag name {:?}", tag.name)));
    }
    if !is_valid_color(&tag.color) {
        return Err(FoodgramError::Dataset(format!(
            "Invalid color {:?} for tag {}",
            tag.color, tag.name
        )));
    }
    let valid_slug = !tag.slug.is_empty()
        && tag
            .slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_slug {
        return Err(FoodgramError::Dataset(format!("Invalid slug {:?}", tag.slug)));
    }
    Ok(())
}

/// Inserts tags, skipping any that collide with an existing name, color or
/// slug. Returns the number of new rows.
pub async fn create_tags(tags: &[NewTag], pool: &Pool<Postgres>) -> Result<u64, FoodgramError> {
    for tag in tags {
        validate_tag(tag)?;
    }

    let mut inserted = 0;
    for chunk in tags.chunks(MAX_BIND_PARAMETERS / 3) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO tags (name, color, slug) ");

        query_builder.push_values(chunk, |mut b, tag| {
            b.push_bind(tag.name.trim())
                .push_bind(tag.color.to_uppercase())
                .push_bind(tag.slug.as_str());
        });
        query_builder.push(" ON CONFLICT DO NOTHING");

        inserted += query_builder.build().execute(pool).await?.rows_affected();
    }

    Ok(inserted)
}

/// Parses `[{"name": .., "color": .., "slug": ..}]`.
pub fn parse_tag_dataset(contents: &str) -> Result<Vec<NewTag>, FoodgramError> {
    let tags: Vec<NewTag> =
        serde_json::from_str(contents).map_err(|e| FoodgramError::Dataset(format!("{e}")))?;

    for tag in &tags {
        validate_tag(tag)?;
    }
    Ok(tags)
}

pub async fn read_tag_dataset(path: &Path) -> Result<Vec<NewTag>, FoodgramError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| FoodgramError::Dataset(format!("{}: {e}", path.display())))?;

    parse_tag_dataset(&contents)
}
