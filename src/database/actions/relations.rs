use sqlx::{Pool, Postgres};

use crate::{
    error::FoodgramError,
    schema::{Id, RelationRecord},
};

/// A uniqueness-constrained join between a user and some target row.
pub trait Relation {
    const TABLE: &'static str;
    const TARGET: &'static str;
    const ALREADY_EXISTS: &'static str;
    const NOT_FOUND: &'static str;

    /// Runs before an insert touches the database.
    fn check(_user_id: Id, _target_id: Id) -> Result<(), FoodgramError> {
        Ok(())
    }
}

pub struct Favorite;

impl Relation for Favorite {
    const TABLE: &'static str = "favorites";
    const TARGET: &'static str = "recipe_id";
    const ALREADY_EXISTS: &'static str = "Recipe is already in favorites";
    const NOT_FOUND: &'static str = "Recipe is not in favorites";
}

pub struct ShoppingCart;

impl Relation for ShoppingCart {
    const TABLE: &'static str = "shopping_cart";
    const TARGET: &'static str = "recipe_id";
    const ALREADY_EXISTS: &'static str = "Recipe is already in the shopping cart";
    const NOT_FOUND: &'static str = "Recipe is not in the shopping cart";
}

pub struct Follow;

impl Relation for Follow {
    const TABLE: &'static str = "follows";
    const TARGET: &'static str = "author_id";
    const ALREADY_EXISTS: &'static str = "You are already subscribed to this author";
    const NOT_FOUND: &'static str = "You are not subscribed to this author";

    fn check(user_id: Id, target_id: Id) -> Result<(), FoodgramError> {
        if user_id == target_id {
            return Err(FoodgramError::SelfFollow);
        }
        Ok(())
    }
}

fn insert_statement<R: Relation>() -> String {
    format!(
        "INSERT INTO {table} (user_id, {target}) VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        RETURNING user_id, {target} AS target_id, created_at",
        table = R::TABLE,
        target = R::TARGET
    )
}

fn delete_statement<R: Relation>() -> String {
    format!(
        "DELETE FROM {} WHERE user_id = $1 AND {} = $2",
        R::TABLE,
        R::TARGET
    )
}

// The losing side of a concurrent insert gets no row back
fn added<R: Relation>(row: Option<RelationRecord>) -> Result<RelationRecord, FoodgramError> {
    row.ok_or_else(|| FoodgramError::AlreadyExists(R::ALREADY_EXISTS.to_owned()))
}

fn removed<R: Relation>(rows_affected: u64) -> Result<(), FoodgramError> {
    if rows_affected == 0 {
        return Err(FoodgramError::NotFound(R::NOT_FOUND.to_owned()));
    }
    Ok(())
}

pub async fn add_relation<R: Relation>(
    user_id: Id,
    target_id: Id,
    pool: &Pool<Postgres>,
) -> Result<RelationRecord, FoodgramError> {
    R::check(user_id, target_id)?;

    let row: Option<RelationRecord> = sqlx::query_as(&insert_statement::<R>())
        .bind(user_id)
        .bind(target_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| match FoodgramError::from(e) {
            FoodgramError::AlreadyExists(_) => {
                FoodgramError::AlreadyExists(R::ALREADY_EXISTS.to_owned())
            }
            e => e,
        })?;

    let record = added::<R>(row)?;
    log::debug!("{}: {} -> {}", R::TABLE, user_id, target_id);
    Ok(record)
}

pub async fn remove_relation<R: Relation>(
    user_id: Id,
    target_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), FoodgramError> {
    let result = sqlx::query(&delete_statement::<R>())
        .bind(user_id)
        .bind(target_id)
        .execute(pool)
        .await?;

    removed::<R>(result.rows_affected())
}

pub async fn add_favorite(
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<RelationRecord, FoodgramError> {
    add_relation::<Favorite>(user_id, recipe_id, pool).await
}

pub async fn remove_favorite(
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), FoodgramError> {
    remove_relation::<Favorite>(user_id, recipe_id, pool).await
}

pub async fn add_to_shopping_cart(
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<RelationRecord, FoodgramError> {
    add_relation::<ShoppingCart>(user_id, recipe_id, pool).await
}

pub async fn remove_from_shopping_cart(
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), FoodgramError> {
    remove_relation::<ShoppingCart>(user_id, recipe_id, pool).await
}

pub async fn follow(
    user_id: Id,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<RelationRecord, FoodgramError> {
    add_relation::<Follow>(user_id, author_id, pool).await
}

pub async fn unfollow(user_id: Id, author_id: Id, pool: &Pool<Postgres>) -> Result<(), FoodgramError> {
    remove_relation::<Follow>(user_id, author_id, pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> RelationRecord {
        RelationRecord {
            user_id: 1,
            target_id: 2,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn self_follow_is_rejected_up_front() {
        assert!(matches!(Follow::check(3, 3), Err(FoodgramError::SelfFollow)));
        assert!(Follow::check(3, 4).is_ok());
        assert!(Favorite::check(3, 3).is_ok());
    }

    #[test]
    fn second_add_reports_already_exists() {
        assert!(added::<Favorite>(Some(record())).is_ok());
        match added::<Favorite>(None) {
            Err(FoodgramError::AlreadyExists(info)) => assert_eq!(info, Favorite::ALREADY_EXISTS),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn removing_nothing_reports_not_found() {
        assert!(removed::<ShoppingCart>(1).is_ok());
        assert!(matches!(
            removed::<ShoppingCart>(0),
            Err(FoodgramError::NotFound(_))
        ));
    }

    #[test]
    fn statements_target_the_right_table() {
        let sql = insert_statement::<Follow>();
        assert!(sql.starts_with("INSERT INTO follows (user_id, author_id)"));
        assert!(sql.contains("author_id AS target_id"));

        assert_eq!(
            delete_statement::<ShoppingCart>(),
            "DELETE FROM shopping_cart WHERE user_id = $1 AND recipe_id = $2"
        );
    }
}
