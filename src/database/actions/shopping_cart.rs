use std::{collections::BTreeMap, fmt::Write};

use sqlx::{Pool, Postgres};

use crate::{
    error::FoodgramError,
    schema::{CartIngredientRow, CartRecipeRow, User},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ShoppingItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShoppingList {
    pub owner: String,
    pub recipes: Vec<String>,
    pub items: Vec<ShoppingItem>,
    pub total_cooking_time: i64,
}

impl ShoppingList {
    /// Sums amounts per (name, unit); units are never converted, so the same
    /// ingredient measured differently stays on separate lines.
    pub fn aggregate(
        owner: String,
        recipes: Vec<CartRecipeRow>,
        ingredients: Vec<CartIngredientRow>,
    ) -> Result<Self, FoodgramError> {
        if recipes.is_empty() {
            return Err(FoodgramError::EmptyCart);
        }

        let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
        for row in ingredients {
            *totals.entry((row.name, row.measurement_unit)).or_default() += i64::from(row.amount);
        }

        let total_cooking_time = recipes.iter().map(|r| i64::from(r.cooking_time)).sum();

        Ok(Self {
            owner,
            recipes: recipes.into_iter().map(|r| r.name).collect(),
            items: totals
                .into_iter()
                .map(|((name, measurement_unit), amount)| ShoppingItem {
                    name,
                    measurement_unit,
                    amount,
                })
                .collect(),
            total_cooking_time,
        })
    }

    pub fn hours_and_minutes(&self) -> (i64, i64) {
        (self.total_cooking_time / 60, self.total_cooking_time % 60)
    }

    pub fn render(&self) -> String {
        let mut content = format!("Shopping list for {}\nRecipes:\n", self.owner);
        for recipe in &self.recipes {
            let _ = writeln!(content, " - {recipe}");
        }

        content.push('\n');
        for item in &self.items {
            let _ = writeln!(
                content,
                "☐ {} — {} — {}",
                item.name, item.amount, item.measurement_unit
            );
        }

        let (hours, minutes) = self.hours_and_minutes();
        let _ = writeln!(content, "\nTotal cooking time: {hours} h. {minutes} min.");
        content
    }
}

pub async fn build_shopping_list(
    user: &User,
    pool: &Pool<Postgres>,
) -> Result<ShoppingList, FoodgramError> {
    let recipes: Vec<CartRecipeRow> = sqlx::query_as(
        "
        SELECT r.name, r.cooking_time
        FROM shopping_cart s
        INNER JOIN recipes r ON r.id = s.recipe_id
        WHERE s.user_id = $1
        ORDER BY s.created_at, r.id
    ",
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    if recipes.is_empty() {
        return Err(FoodgramError::EmptyCart);
    }

    let ingredients: Vec<CartIngredientRow> = sqlx::query_as(
        "
        SELECT i.name, i.measurement_unit, ri.amount
        FROM shopping_cart s
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = s.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE s.user_id = $1
    ",
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    log::debug!(
        "Shopping list for user {}: {} recipes, {} ingredient rows",
        user.id,
        recipes.len(),
        ingredients.len()
    );

    ShoppingList::aggregate(user.full_name(), recipes, ingredients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recipe(name: &str, cooking_time: i32) -> CartRecipeRow {
        CartRecipeRow {
            name: name.to_owned(),
            cooking_time,
        }
    }

    fn ingredient(name: &str, unit: &str, amount: i32) -> CartIngredientRow {
        CartIngredientRow {
            name: name.to_owned(),
            measurement_unit: unit.to_owned(),
            amount,
        }
    }

    #[test]
    fn same_ingredient_is_summed() {
        let list = ShoppingList::aggregate(
            String::from("Ivan Petrov"),
            vec![recipe("Soup", 30), recipe("Stew", 45)],
            vec![ingredient("Salt", "g", 5), ingredient("Salt", "g", 3)],
        )
        .unwrap();

        assert_eq!(
            list.items,
            vec![ShoppingItem {
                name: String::from("Salt"),
                measurement_unit: String::from("g"),
                amount: 8,
            }]
        );
    }

    #[test]
    fn different_units_stay_separate() {
        let list = ShoppingList::aggregate(
            String::from("Ivan Petrov"),
            vec![recipe("Soup", 30)],
            vec![
                ingredient("Salt", "tsp", 1),
                ingredient("Pepper", "g", 2),
                ingredient("Salt", "g", 5),
            ],
        )
        .unwrap();

        let lines: Vec<(&str, &str, i64)> = list
            .items
            .iter()
            .map(|i| (i.name.as_str(), i.measurement_unit.as_str(), i.amount))
            .collect();
        assert_eq!(lines, vec![("Pepper", "g", 2), ("Salt", "g", 5), ("Salt", "tsp", 1)]);
    }

    #[test]
    fn cooking_time_is_summed_per_recipe() {
        let list = ShoppingList::aggregate(
            String::from("Ivan Petrov"),
            vec![recipe("Soup", 50), recipe("Stew", 45), recipe("Tea", 5)],
            vec![],
        )
        .unwrap();

        assert_eq!(list.total_cooking_time, 100);
        assert_eq!(list.hours_and_minutes(), (1, 40));
    }

    #[test]
    fn empty_cart_is_rejected() {
        let result = ShoppingList::aggregate(String::from("Ivan Petrov"), vec![], vec![]);
        assert!(matches!(result, Err(FoodgramError::EmptyCart)));
    }

    #[test]
    fn renders_report() {
        let list = ShoppingList::aggregate(
            String::from("Ivan Petrov"),
            vec![recipe("Soup", 30), recipe("Stew", 45)],
            vec![ingredient("Salt", "g", 5), ingredient("Salt", "g", 3)],
        )
        .unwrap();

        assert_eq!(
            list.render(),
            "Shopping list for Ivan Petrov\n\
             Recipes:\n \
             - Soup\n \
             - Stew\n\
             \n\
             ☐ Salt — 8 — g\n\
             \n\
             Total cooking time: 1 h. 15 min.\n"
        );
    }
}
