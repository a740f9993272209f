//! These run against a real Postgres: `DATABASE_URL=postgres://... cargo test -- --ignored`.
//! Every test gets a fresh database with the migrations applied.

use chrono::Duration;
use foodgram::{
    actions::*,
    error::FoodgramError,
    pagination::PageQuery,
    schema::{IngredientAmount, NewIngredient, NewTag, RecipePayload, RegisterPayload, User},
};
use pretty_assertions::assert_eq;
use sqlx::PgPool;

struct Catalog {
    breakfast: i32,
    dinner: i32,
    pepper: i32,
    salt: i32,
}

async fn seed_catalog(pool: &PgPool) -> Catalog {
    let tags = [
        NewTag {
            name: String::from("Breakfast"),
            color: String::from("#E26C2D"),
            slug: String::from("breakfast"),
        },
        NewTag {
            name: String::from("Dinner"),
            color: String::from("#49B64E"),
            slug: String::from("dinner"),
        },
    ];
    create_tags(&tags, pool).await.unwrap();

    let ingredients = [
        NewIngredient {
            name: String::from("salt"),
            measurement_unit: String::from("g"),
        },
        NewIngredient {
            name: String::from("pepper"),
            measurement_unit: String::from("pinch"),
        },
    ];
    bulk_create_ingredients(&ingredients, pool).await.unwrap();

    let tags = list_tags(pool).await.unwrap();
    let ingredients = list_ingredients(None, pool).await.unwrap();

    let found = list_ingredients(Some("SA"), pool).await.unwrap();
    assert_eq!(
        found.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
        vec!["salt"]
    );

    Catalog {
        breakfast: tags[0].id,
        dinner: tags[1].id,
        pepper: ingredients[0].id,
        salt: ingredients[1].id,
    }
}

fn registration(email: &str, username: &str) -> RegisterPayload {
    RegisterPayload {
        email: email.to_owned(),
        username: username.to_owned(),
        first_name: String::from("Ivan"),
        last_name: String::from("Petrov"),
        password: String::from("s3cret-pass"),
    }
}

async fn register(pool: &PgPool, username: &str) -> User {
    let profile = register_user(registration(&format!("{username}@example.com"), username), pool)
        .await
        .unwrap();
    get_user_by_id(pool, profile.id).await.unwrap().unwrap()
}

fn recipe(name: &str, cooking_time: i32, tags: Vec<i32>, ingredients: &[(i32, i32)]) -> RecipePayload {
    RecipePayload {
        name: Some(name.to_owned()),
        image: Some(String::from("data:image/png;base64,AAAA")),
        text: Some(String::from("Mix and serve.")),
        cooking_time: Some(cooking_time),
        tags,
        ingredients: ingredients
            .iter()
            .map(|&(id, amount)| IngredientAmount { id, amount })
            .collect(),
    }
}

async fn recipe_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM recipes")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn email_is_unique_ignoring_case(pool: PgPool) {
    register_user(registration("Cook@Example.com", "cook"), &pool)
        .await
        .unwrap();

    let second = register_user(registration("cook@example.com", "other_cook"), &pool).await;
    assert!(matches!(
        second,
        Err(FoodgramError::Validation { field: "email", .. })
    ));

    let token = login_user(
        "COOK@example.com",
        "s3cret-pass",
        b"secret",
        Duration::hours(1),
        &pool,
    )
    .await;
    assert!(token.is_ok());
}

#[sqlx::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn created_recipe_reads_back(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let cook = register(&pool, "cook").await;

    let created = create_recipe(
        cook.id,
        recipe(
            "Omelette",
            15,
            vec![catalog.breakfast, catalog.breakfast],
            &[(catalog.salt, 2), (catalog.pepper, 1)],
        ),
        &pool,
    )
    .await
    .unwrap();

    let read = get_recipe(None, created.id, &pool).await.unwrap();
    assert_eq!(read.name, "Omelette");
    assert_eq!(read.author.id, cook.id);
    assert_eq!(
        read.tags.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![catalog.breakfast]
    );
    assert_eq!(
        read.ingredients
            .iter()
            .map(|i| (i.name.as_str(), i.amount))
            .collect::<Vec<_>>(),
        vec![("salt", 2), ("pepper", 1)]
    );
    assert!(!read.is_favorited);
    assert_eq!(read.favorites_count, 0);
}

#[sqlx::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn unknown_ingredient_leaves_no_recipe(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let cook = register(&pool, "cook").await;

    let result = create_recipe(
        cook.id,
        recipe("Ghost soup", 30, vec![catalog.dinner], &[(catalog.salt, 1), (9999, 1)]),
        &pool,
    )
    .await;

    match result {
        Err(FoodgramError::Validation { field, message }) => {
            assert_eq!(field, "ingredients");
            assert_eq!(message, "unknown ingredient");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(recipe_count(&pool).await, 0);

    let result = create_recipe(
        cook.id,
        recipe("Ghost soup", 30, vec![9999], &[(catalog.salt, 1)]),
        &pool,
    )
    .await;
    assert!(matches!(
        result,
        Err(FoodgramError::Validation { field: "tags", .. })
    ));
    assert_eq!(recipe_count(&pool).await, 0);
}

#[sqlx::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn update_replaces_tags_and_ingredients(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let cook = register(&pool, "cook").await;
    let stranger = register(&pool, "stranger").await;

    let created = create_recipe(
        cook.id,
        recipe("Porridge", 20, vec![catalog.breakfast], &[(catalog.salt, 5)]),
        &pool,
    )
    .await
    .unwrap();

    let change = RecipePayload {
        tags: vec![catalog.dinner],
        ingredients: vec![IngredientAmount {
            id: catalog.pepper,
            amount: 2,
        }],
        ..Default::default()
    };

    let denied = update_recipe(created.id, stranger.id, change.clone(), &pool).await;
    assert!(matches!(denied, Err(FoodgramError::Forbidden(_))));

    let updated = update_recipe(created.id, cook.id, change, &pool).await.unwrap();
    assert_eq!(updated.name, "Porridge");
    assert_eq!(updated.cooking_time, 20);
    assert_eq!(
        updated.tags.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![catalog.dinner]
    );
    assert_eq!(
        updated
            .ingredients
            .iter()
            .map(|i| (i.id, i.amount))
            .collect::<Vec<_>>(),
        vec![(catalog.pepper, 2)]
    );
}

#[sqlx::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn favorites_toggle_once(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let cook = register(&pool, "cook").await;
    let fan = register(&pool, "fan").await;

    let created = create_recipe(
        cook.id,
        recipe("Toast", 5, vec![catalog.breakfast], &[(catalog.salt, 1)]),
        &pool,
    )
    .await
    .unwrap();

    add_favorite(fan.id, created.id, &pool).await.unwrap();
    assert!(matches!(
        add_favorite(fan.id, created.id, &pool).await,
        Err(FoodgramError::AlreadyExists(_))
    ));

    let seen = get_recipe(Some(fan.id), created.id, &pool).await.unwrap();
    assert!(seen.is_favorited);
    assert_eq!(seen.favorites_count, 1);

    remove_favorite(fan.id, created.id, &pool).await.unwrap();
    assert!(matches!(
        remove_favorite(fan.id, created.id, &pool).await,
        Err(FoodgramError::NotFound(_))
    ));
}

#[sqlx::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn unsubscribing_from_yourself_is_not_found(pool: PgPool) {
    let cook = register(&pool, "cook").await;

    assert!(matches!(
        follow(cook.id, cook.id, &pool).await,
        Err(FoodgramError::SelfFollow)
    ));
    assert!(matches!(
        unfollow(cook.id, cook.id, &pool).await,
        Err(FoodgramError::NotFound(_))
    ));
}

#[sqlx::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn shopping_list_sums_the_cart(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let cook = register(&pool, "cook").await;

    assert!(matches!(
        build_shopping_list(&cook, &pool).await,
        Err(FoodgramError::EmptyCart)
    ));

    let soup = create_recipe(
        cook.id,
        recipe("Soup", 60, vec![catalog.dinner], &[(catalog.salt, 5), (catalog.pepper, 2)]),
        &pool,
    )
    .await
    .unwrap();
    let stew = create_recipe(
        cook.id,
        recipe("Stew", 40, vec![catalog.dinner], &[(catalog.salt, 3)]),
        &pool,
    )
    .await
    .unwrap();

    add_to_shopping_cart(cook.id, soup.id, &pool).await.unwrap();
    add_to_shopping_cart(cook.id, stew.id, &pool).await.unwrap();

    let list = build_shopping_list(&cook, &pool).await.unwrap();
    assert_eq!(list.owner, "Ivan Petrov");
    assert_eq!(list.recipes, vec!["Soup", "Stew"]);
    assert_eq!(
        list.items
            .iter()
            .map(|i| (i.name.as_str(), i.amount, i.measurement_unit.as_str()))
            .collect::<Vec<_>>(),
        vec![("pepper", 2, "pinch"), ("salt", 8, "g")]
    );
    assert_eq!(list.hours_and_minutes(), (1, 40));
    assert!(list.render().contains("☐ salt — 8 — g"));
}

#[sqlx::test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn page_past_the_end_keeps_the_total(pool: PgPool) {
    let catalog = seed_catalog(&pool).await;
    let cook = register(&pool, "cook").await;

    for name in ["Soup", "Stew"] {
        create_recipe(
            cook.id,
            recipe(name, 10, vec![catalog.dinner], &[(catalog.salt, 1)]),
            &pool,
        )
        .await
        .unwrap();
    }

    for page in [5, i64::MAX] {
        let query = PageQuery {
            page: Some(page),
            limit: Some(1),
        };
        let recipes = fetch_recipes(None, RecipeFilter::default(), query, 6, &pool)
            .await
            .unwrap();
        assert_eq!(recipes.count, 2);
        assert!(recipes.results.is_empty());
        assert_eq!(recipes.next, None);

        let users = fetch_users(None, query, 6, &pool).await.unwrap();
        assert_eq!(users.count, 1);
        assert!(users.results.is_empty());
    }

    let filtered = fetch_recipes(
        None,
        RecipeFilter {
            tags: vec![String::from("breakfast")],
            ..Default::default()
        },
        PageQuery {
            page: Some(3),
            limit: Some(1),
        },
        6,
        &pool,
    )
    .await
    .unwrap();
    assert_eq!(filtered.count, 0);
}
