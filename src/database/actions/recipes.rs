use std::collections::{HashMap, HashSet};

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    constants::MAX_NAME_LENGTH,
    error::{FoodgramError, QueryError},
    pagination::{needs_recount, PageContext, PageQuery},
    schema::{
        Id, IngredientAmount, Recipe, RecipeIngredient, RecipeIngredientRow, RecipePayload,
        RecipeRow, RecipeShort, RecipeTagRow, Tag, UserProfile,
    },
};

use super::users::list_profiles;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecipeMode {
    Create,
    Update,
}

/// A payload that passed validation. Scalar fields are `None` only for
/// updates that leave them untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRecipe {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientAmount>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

#[derive(sqlx::FromRow, Debug, Clone, Copy)]
pub struct RecipeOwner {
    pub id: Id,
    pub author_id: Id,
}

fn required_text(
    field: &'static str,
    value: Option<String>,
    mode: RecipeMode,
    max_length: Option<usize>,
) -> Result<Option<String>, FoodgramError> {
    match value {
        None if mode == RecipeMode::Create => {
            Err(FoodgramError::validation(field, "this field is required"))
        }
        None => Ok(None),
        Some(value) => {
            let value = value.trim().to_owned();
            if value.is_empty() {
                return Err(FoodgramError::validation(field, "This field may not be blank."));
            }
            if let Some(max) = max_length {
                if value.chars().count() > max {
                    return Err(FoodgramError::validation(
                        field,
                        format!("Ensure this field has no more than {max} characters."),
                    ));
                }
            }
            Ok(Some(value))
        }
    }
}

/// Checks run in a fixed order so the first failing rule is reported:
/// tags, ingredients, duplicate ingredients, amounts, then scalar fields.
pub fn validate_recipe(
    payload: RecipePayload,
    mode: RecipeMode,
) -> Result<ValidRecipe, FoodgramError> {
    if payload.tags.is_empty() {
        return Err(FoodgramError::validation("tags", "no tags"));
    }
    if payload.ingredients.is_empty() {
        return Err(FoodgramError::validation("ingredients", "no ingredients"));
    }

    let mut seen = HashSet::new();
    if !payload.ingredients.iter().all(|i| seen.insert(i.id)) {
        return Err(FoodgramError::validation("ingredients", "duplicate ingredient"));
    }
    if payload.ingredients.iter().any(|i| i.amount < 1) {
        return Err(FoodgramError::validation("ingredients", "amount too small"));
    }

    let cooking_time = match payload.cooking_time {
        Some(time) if time < 1 => {
            return Err(FoodgramError::validation("cooking_time", "cooking time too small"))
        }
        None if mode == RecipeMode::Create => {
            return Err(FoodgramError::validation("cooking_time", "this field is required"))
        }
        time => time,
    };

    let name = required_text("name", payload.name, mode, Some(MAX_NAME_LENGTH))?;
    let text = required_text("text", payload.text, mode, None)?;
    let image = required_text("image", payload.image, mode, None)?;

    let mut seen = HashSet::new();
    let tags = payload
        .tags
        .into_iter()
        .filter(|tag| seen.insert(*tag))
        .collect();

    Ok(ValidRecipe {
        name,
        image,
        text,
        cooking_time,
        tags,
        ingredients: payload.ingredients,
    })
}

async fn ensure_tags_exist(tags: &[Id], conn: &mut PgConnection) -> Result<(), FoodgramError> {
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(tags)
        .fetch_all(&mut *conn)
        .await?;

    if found.len() != tags.len() {
        return Err(FoodgramError::validation("tags", "unknown tag"));
    }
    Ok(())
}

async fn ensure_ingredients_exist(
    ingredients: &[IngredientAmount],
    conn: &mut PgConnection,
) -> Result<(), FoodgramError> {
    let ids: Vec<Id> = ingredients.iter().map(|i| i.id).collect();
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

    if found.len() != ids.len() {
        return Err(FoodgramError::validation("ingredients", "unknown ingredient"));
    }
    Ok(())
}

async fn insert_associations(
    recipe_id: Id,
    recipe: &ValidRecipe,
    conn: &mut PgConnection,
) -> Result<(), FoodgramError> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    query_builder.push_values(&recipe.tags, |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(*tag_id);
    });
    query_builder.build().execute(&mut *conn).await?;

    // Serial ids follow VALUES order, which keeps the ingredient order stable
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    query_builder.push_values(&recipe.ingredients, |mut b, ingredient| {
        b.push_bind(recipe_id)
            .push_bind(ingredient.id)
            .push_bind(ingredient.amount);
    });
    query_builder.build().execute(&mut *conn).await?;

    Ok(())
}

fn begin_failed() -> FoodgramError {
    FoodgramError::Query(QueryError::new("Could not start transaction".to_owned()))
}

fn commit_failed() -> FoodgramError {
    FoodgramError::Query(QueryError::new("Could not commit transaction".to_owned()))
}

pub async fn create_recipe(
    author_id: Id,
    payload: RecipePayload,
    pool: &Pool<Postgres>,
) -> Result<Recipe, FoodgramError> {
    let recipe = validate_recipe(payload, RecipeMode::Create)?;

    let mut tr = pool.begin().await.map_err(|_| begin_failed())?;

    ensure_tags_exist(&recipe.tags, &mut tr).await?;
    ensure_ingredients_exist(&recipe.ingredients, &mut tr).await?;

    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(&recipe.image)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tr)
    .await?;

    insert_associations(id.0, &recipe, &mut tr).await?;

    tr.commit().await.map_err(|_| commit_failed())?;
    log::info!("User {author_id} created recipe {}", id.0);

    get_recipe(Some(author_id), id.0, pool).await
}

/// Loads the recipe for a write, checking that `user_id` is its author.
pub async fn get_recipe_mut(
    id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<RecipeOwner, FoodgramError> {
    let recipe: Option<RecipeOwner> =
        sqlx::query_as("SELECT id, author_id FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    match recipe {
        Some(recipe) if recipe.author_id == user_id => Ok(recipe),
        Some(_) => Err(FoodgramError::Forbidden(String::from(
            "You do not have permission to perform this action.",
        ))),
        None => Err(FoodgramError::DoesNotExist("Recipe")),
    }
}

/// Full-replace update: scalar fields absent from the payload keep their
/// value, tag and ingredient sets are rebuilt from scratch.
pub async fn update_recipe(
    id: Id,
    user_id: Id,
    payload: RecipePayload,
    pool: &Pool<Postgres>,
) -> Result<Recipe, FoodgramError> {
    let owner = get_recipe_mut(id, user_id, pool).await?;
    let recipe = validate_recipe(payload, RecipeMode::Update)?;

    let mut tr = pool.begin().await.map_err(|_| begin_failed())?;

    ensure_tags_exist(&recipe.tags, &mut tr).await?;
    ensure_ingredients_exist(&recipe.ingredients, &mut tr).await?;

    let updated = sqlx::query(
        "
        UPDATE recipes SET
            name = COALESCE($1, name),
            image = COALESCE($2, image),
            text = COALESCE($3, text),
            cooking_time = COALESCE($4, cooking_time)
        WHERE id = $5
    ",
    )
    .bind(&recipe.name)
    .bind(&recipe.image)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .bind(owner.id)
    .execute(&mut *tr)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(FoodgramError::DoesNotExist("Recipe"));
    }

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(owner.id)
        .execute(&mut *tr)
        .await?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(owner.id)
        .execute(&mut *tr)
        .await?;

    insert_associations(owner.id, &recipe, &mut tr).await?;

    tr.commit().await.map_err(|_| commit_failed())?;
    log::info!("User {user_id} updated recipe {}", owner.id);

    get_recipe(Some(user_id), owner.id, pool).await
}

pub async fn delete_recipe(id: Id, user_id: Id, pool: &Pool<Postgres>) -> Result<(), FoodgramError> {
    let owner = get_recipe_mut(id, user_id, pool).await?;

    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(owner.id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(FoodgramError::DoesNotExist("Recipe"));
    }
    log::info!("User {user_id} deleted recipe {}", owner.id);
    Ok(())
}

fn push_recipe_select(query_builder: &mut QueryBuilder<'_, Postgres>, viewer: Option<Id>) {
    query_builder
        .push(
            "
        SELECT r.id, r.author_id, r.name, r.image, r.text, r.cooking_time, r.pub_date,
            EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ",
        )
        .push_bind(viewer)
        .push(
            ") AS is_favorited,
            EXISTS (SELECT 1 FROM shopping_cart s WHERE s.recipe_id = r.id AND s.user_id = ",
        )
        .push_bind(viewer)
        .push(
            ") AS is_in_shopping_cart,
            (SELECT COUNT(*) FROM favorites f WHERE f.recipe_id = r.id) AS favorites_count,
            COUNT(*) OVER() AS count
        FROM recipes r
        WHERE TRUE",
        );
}

pub async fn get_recipe(
    viewer: Option<Id>,
    id: Id,
    pool: &Pool<Postgres>,
) -> Result<Recipe, FoodgramError> {
    let mut query_builder = QueryBuilder::new("");
    push_recipe_select(&mut query_builder, viewer);
    query_builder.push(" AND r.id = ").push_bind(id);

    let row: Option<RecipeRow> = query_builder.build_query_as().fetch_optional(pool).await?;
    let row = row.ok_or(FoodgramError::DoesNotExist("Recipe"))?;

    hydrate_recipes(viewer, vec![row], pool)
        .await?
        .pop()
        .ok_or(FoodgramError::DoesNotExist("Recipe"))
}

fn push_recipe_filters(
    query_builder: &mut QueryBuilder<'_, Postgres>,
    viewer: Option<Id>,
    filter: &RecipeFilter,
) {
    if let Some(author) = filter.author {
        query_builder.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query_builder
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id
                WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }
    if let Some(viewer) = viewer {
        if filter.is_favorited {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
        if filter.is_in_shopping_cart {
            query_builder
                .push(
                    " AND EXISTS (SELECT 1 FROM shopping_cart s WHERE s.recipe_id = r.id AND s.user_id = ",
                )
                .push_bind(viewer)
                .push(")");
        }
    }
}

/// Newest first. `is_favorited` and `is_in_shopping_cart` only apply to
/// signed-in viewers.
pub async fn fetch_recipes(
    viewer: Option<Id>,
    filter: RecipeFilter,
    query: PageQuery,
    default_page_size: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<Recipe>, FoodgramError> {
    let page_size = query.page_size(default_page_size);
    let offset = query.offset(page_size);

    let mut query_builder = QueryBuilder::new("");
    push_recipe_select(&mut query_builder, viewer);
    push_recipe_filters(&mut query_builder, viewer, &filter);

    query_builder
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(page_size)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows: Vec<RecipeRow> = query_builder.build_query_as().fetch_all(pool).await?;
    let total_count = match rows.first() {
        Some(row) => row.count,
        None if needs_recount(&rows, offset) => {
            let mut query_builder = QueryBuilder::new("SELECT COUNT(*) FROM recipes r WHERE TRUE");
            push_recipe_filters(&mut query_builder, viewer, &filter);
            query_builder.build_query_scalar().fetch_one(pool).await?
        }
        None => 0,
    };

    let recipes = hydrate_recipes(viewer, rows, pool).await?;
    Ok(PageContext::from_rows(
        recipes,
        total_count,
        page_size,
        offset,
    ))
}

async fn hydrate_recipes(
    viewer: Option<Id>,
    rows: Vec<RecipeRow>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Recipe>, FoodgramError> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<Id> = rows.iter().map(|row| row.id).collect();
    let mut authors: Vec<Id> = rows.iter().map(|row| row.author_id).collect();
    authors.sort_unstable();
    authors.dedup();

    let profiles = list_profiles(viewer, &authors, pool).await?;

    let tags: Vec<RecipeTagRow> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.id
    ",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let ingredients: Vec<RecipeIngredientRow> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    assemble_recipes(rows, profiles, tags, ingredients)
}

/// Joins recipe rows with their authors and association rows, keeping the
/// order of `rows` and of the association rows within each recipe.
pub fn assemble_recipes(
    rows: Vec<RecipeRow>,
    profiles: Vec<UserProfile>,
    tags: Vec<RecipeTagRow>,
    ingredients: Vec<RecipeIngredientRow>,
) -> Result<Vec<Recipe>, FoodgramError> {
    let profiles: HashMap<Id, UserProfile> = profiles.into_iter().map(|p| (p.id, p)).collect();

    let mut tag_map: HashMap<Id, Vec<Tag>> = HashMap::new();
    for row in tags {
        tag_map.entry(row.recipe_id).or_default().push(row.into());
    }

    let mut ingredient_map: HashMap<Id, Vec<RecipeIngredient>> = HashMap::new();
    for row in ingredients {
        ingredient_map
            .entry(row.recipe_id)
            .or_default()
            .push(row.into());
    }

    rows.into_iter()
        .map(|row| {
            let author = profiles.get(&row.author_id).cloned().ok_or_else(|| {
                FoodgramError::Query(QueryError::new(format!(
                    "Author {} of recipe {} is missing",
                    row.author_id, row.id
                )))
            })?;

            Ok(Recipe {
                id: row.id,
                tags: tag_map.remove(&row.id).unwrap_or_default(),
                author,
                ingredients: ingredient_map.remove(&row.id).unwrap_or_default(),
                is_favorited: row.is_favorited,
                is_in_shopping_cart: row.is_in_shopping_cart,
                favorites_count: row.favorites_count,
                name: row.name,
                image: row.image,
                text: row.text,
                cooking_time: row.cooking_time,
                pub_date: row.pub_date,
            })
        })
        .collect()
}

pub async fn get_recipe_short(id: Id, pool: &Pool<Postgres>) -> Result<RecipeShort, FoodgramError> {
    let row: Option<RecipeShort> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    row.ok_or(FoodgramError::DoesNotExist("Recipe"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn payload() -> RecipePayload {
        RecipePayload {
            name: Some(String::from("Borscht")),
            image: Some(String::from("data:image/png;base64,AAAA")),
            text: Some(String::from("Boil beets.")),
            cooking_time: Some(90),
            tags: vec![1, 2],
            ingredients: vec![
                IngredientAmount { id: 10, amount: 300 },
                IngredientAmount { id: 11, amount: 5 },
            ],
        }
    }

    fn rejected(payload: RecipePayload, mode: RecipeMode) -> (&'static str, String) {
        match validate_recipe(payload, mode) {
            Err(FoodgramError::Validation { field, message }) => (field, message),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_payload_passes() {
        let recipe = validate_recipe(payload(), RecipeMode::Create).unwrap();
        assert_eq!(recipe.name.as_deref(), Some("Borscht"));
        assert_eq!(recipe.tags, vec![1, 2]);
        assert_eq!(recipe.ingredients.len(), 2);
    }

    #[test]
    fn empty_tags_fail_first() {
        let mut p = payload();
        p.tags.clear();
        p.ingredients.clear();
        assert_eq!(
            rejected(p, RecipeMode::Create),
            ("tags", String::from("no tags"))
        );
    }

    #[test]
    fn empty_ingredients_fail() {
        let mut p = payload();
        p.ingredients.clear();
        assert_eq!(
            rejected(p, RecipeMode::Update),
            ("ingredients", String::from("no ingredients"))
        );
    }

    #[test]
    fn duplicate_ingredient_fails_before_amount() {
        let mut p = payload();
        p.ingredients = vec![
            IngredientAmount { id: 10, amount: 0 },
            IngredientAmount { id: 10, amount: 3 },
        ];
        assert_eq!(
            rejected(p, RecipeMode::Create),
            ("ingredients", String::from("duplicate ingredient"))
        );
    }

    #[test]
    fn amount_and_cooking_time_bounds() {
        let mut p = payload();
        p.ingredients[1].amount = 0;
        assert_eq!(
            rejected(p, RecipeMode::Create),
            ("ingredients", String::from("amount too small"))
        );

        let mut p = payload();
        p.cooking_time = Some(0);
        assert_eq!(
            rejected(p, RecipeMode::Create),
            ("cooking_time", String::from("cooking time too small"))
        );
    }

    #[test]
    fn scalar_fields_required_only_on_create() {
        let mut p = payload();
        p.name = None;
        p.cooking_time = None;
        assert_eq!(rejected(p.clone(), RecipeMode::Create).0, "cooking_time");

        let recipe = validate_recipe(p, RecipeMode::Update).unwrap();
        assert_eq!(recipe.name, None);
        assert_eq!(recipe.cooking_time, None);
    }

    #[test]
    fn long_or_blank_names_fail() {
        let mut p = payload();
        p.name = Some("x".repeat(MAX_NAME_LENGTH + 1));
        assert_eq!(rejected(p, RecipeMode::Create).0, "name");

        let mut p = payload();
        p.text = Some(String::from("  "));
        assert_eq!(rejected(p, RecipeMode::Update).0, "text");
    }

    #[test]
    fn duplicate_tags_collapse() {
        let mut p = payload();
        p.tags = vec![3, 1, 3, 2, 1];
        let recipe = validate_recipe(p, RecipeMode::Create).unwrap();
        assert_eq!(recipe.tags, vec![3, 1, 2]);
    }

    fn profile(id: Id) -> UserProfile {
        UserProfile {
            id,
            email: format!("user{id}@example.com"),
            username: format!("user{id}"),
            first_name: String::new(),
            last_name: String::new(),
            is_subscribed: false,
        }
    }

    fn row(id: Id, author_id: Id) -> RecipeRow {
        RecipeRow {
            id,
            author_id,
            name: format!("Recipe {id}"),
            image: String::from("img"),
            text: String::from("text"),
            cooking_time: 10,
            pub_date: Utc::now(),
            is_favorited: false,
            is_in_shopping_cart: true,
            favorites_count: 2,
            count: 2,
        }
    }

    fn ingredient_row(recipe_id: Id, id: Id, amount: i32) -> RecipeIngredientRow {
        RecipeIngredientRow {
            recipe_id,
            id,
            name: format!("Ingredient {id}"),
            measurement_unit: String::from("g"),
            amount,
        }
    }

    #[test]
    fn assembled_recipe_keeps_supplied_associations() {
        let supplied = payload();
        let tags = supplied
            .tags
            .iter()
            .map(|id| RecipeTagRow {
                recipe_id: 5,
                id: *id,
                name: format!("Tag {id}"),
                color: String::from("#FFFFFF"),
                slug: format!("tag-{id}"),
            })
            .collect();
        let ingredients = supplied
            .ingredients
            .iter()
            .map(|i| ingredient_row(5, i.id, i.amount))
            .collect();

        let recipes =
            assemble_recipes(vec![row(5, 1)], vec![profile(1)], tags, ingredients).unwrap();
        let recipe = &recipes[0];

        assert_eq!(
            recipe.tags.iter().map(|t| t.id).collect::<Vec<_>>(),
            supplied.tags
        );
        assert_eq!(
            recipe
                .ingredients
                .iter()
                .map(|i| IngredientAmount {
                    id: i.id,
                    amount: i.amount
                })
                .collect::<Vec<_>>(),
            supplied.ingredients
        );
        assert_eq!(recipe.author.id, 1);
        assert!(recipe.is_in_shopping_cart);
    }

    #[test]
    fn assembly_keeps_row_order_and_splits_associations() {
        let recipes = assemble_recipes(
            vec![row(9, 1), row(4, 2)],
            vec![profile(2), profile(1)],
            vec![],
            vec![
                ingredient_row(4, 1, 1),
                ingredient_row(9, 2, 2),
                ingredient_row(4, 3, 3),
            ],
        )
        .unwrap();

        assert_eq!(recipes.iter().map(|r| r.id).collect::<Vec<_>>(), vec![9, 4]);
        assert_eq!(
            recipes[1].ingredients.iter().map(|i| i.id).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert!(recipes[0].tags.is_empty());
    }

    #[test]
    fn missing_author_is_an_error() {
        assert!(assemble_recipes(vec![row(1, 7)], vec![], vec![], vec![]).is_err());
    }
}
