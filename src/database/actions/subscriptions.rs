use std::collections::HashMap;

use sqlx::{Pool, Postgres};

use crate::{
    error::FoodgramError,
    pagination::{needs_recount, PageContext, PageQuery},
    schema::{Id, RecipePreviewRow, RecipeShort, Subscription, SubscriptionRow, UserProfile},
};

/// Newest recipes of each author, at most `limit` per author.
pub async fn list_recipe_previews(
    authors: &[Id],
    limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipePreviewRow>, FoodgramError> {
    let rows: Vec<RecipePreviewRow> = sqlx::query_as(
        "
        SELECT author_id, id, name, image, cooking_time
        FROM (
            SELECT r.author_id, r.id, r.name, r.image, r.cooking_time,
                ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.pub_date DESC, r.id DESC) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) previews
        WHERE $2::BIGINT IS NULL OR position <= $2
        ORDER BY author_id, position
    ",
    )
    .bind(authors)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Pairs followed authors with their previews. The follower never appears in
/// their own subscription list.
pub fn build_subscriptions(
    user_id: Id,
    rows: Vec<SubscriptionRow>,
    previews: Vec<RecipePreviewRow>,
    limit: Option<i64>,
) -> Vec<Subscription> {
    let mut preview_map: HashMap<Id, Vec<RecipeShort>> = HashMap::new();
    for preview in previews {
        preview_map
            .entry(preview.author_id)
            .or_default()
            .push(preview.into());
    }

    rows.into_iter()
        .filter(|row| row.id != user_id)
        .map(|row| {
            let mut recipes = preview_map.remove(&row.id).unwrap_or_default();
            if let Some(limit) = limit.and_then(|l| usize::try_from(l).ok()) {
                recipes.truncate(limit);
            }

            Subscription {
                author: UserProfile {
                    id: row.id,
                    email: row.email,
                    username: row.username,
                    first_name: row.first_name,
                    last_name: row.last_name,
                    is_subscribed: true,
                },
                recipes,
                recipes_count: row.recipes_count,
            }
        })
        .collect()
}

pub async fn list_subscriptions(
    user_id: Id,
    query: PageQuery,
    recipes_limit: Option<i64>,
    default_page_size: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<Subscription>, FoodgramError> {
    let page_size = query.page_size(default_page_size);
    let offset = query.offset(page_size);

    let rows: Vec<SubscriptionRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
            COUNT(*) OVER() AS count
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1 AND f.author_id <> $1
        ORDER BY u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(page_size)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total_count = match rows.first() {
        Some(row) => row.count,
        None if needs_recount(&rows, offset) => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM follows WHERE user_id = $1 AND author_id <> $1",
            )
            .bind(user_id)
            .fetch_one(pool)
            .await?
        }
        None => 0,
    };
    let authors: Vec<Id> = rows.iter().map(|row| row.id).collect();
    let previews = list_recipe_previews(&authors, recipes_limit, pool).await?;

    Ok(PageContext::from_rows(
        build_subscriptions(user_id, rows, previews, recipes_limit),
        total_count,
        page_size,
        offset,
    ))
}

/// Subscription view of one author, as returned after subscribing.
pub async fn get_subscription(
    user_id: Id,
    author_id: Id,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Subscription, FoodgramError> {
    let row: Option<SubscriptionRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
            1::BIGINT AS count
        FROM users u
        WHERE u.id = $1
    ",
    )
    .bind(author_id)
    .fetch_optional(pool)
    .await?;
    let row = row.ok_or(FoodgramError::DoesNotExist("User"))?;

    let previews = list_recipe_previews(&[author_id], recipes_limit, pool).await?;

    build_subscriptions(user_id, vec![row], previews, recipes_limit)
        .pop()
        .ok_or(FoodgramError::SelfFollow)
}
