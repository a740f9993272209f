use std::path::Path;

use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    constants::{MAX_BIND_PARAMETERS, MAX_NAME_LENGTH},
    error::FoodgramError,
    schema::{Id, Ingredient, NewIngredient},
};

/// Case-insensitive prefix search, ordered by name.
pub async fn list_ingredients(
    name_prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, FoodgramError> {
    let list: Vec<Ingredient> = match name_prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => {
            let pattern = format!("{}%", escape_like(&prefix.to_lowercase()));
            sqlx::query_as(
                "SELECT * FROM ingredients WHERE LOWER(name) LIKE $1 ORDER BY name, measurement_unit",
            )
            .bind(pattern)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM ingredients ORDER BY name, measurement_unit")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(list)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Ingredient, FoodgramError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.ok_or(FoodgramError::DoesNotExist("Ingredient"))
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Inserts in chunks; pairs that already exist are skipped, so repeated loads
/// of the same dataset are no-ops. Returns the number of new rows.
pub async fn bulk_create_ingredients(
    ingredients: &[NewIngredient],
    pool: &Pool<Postgres>,
) -> Result<u64, FoodgramError> {
    let mut inserted = 0;

    for chunk in ingredients.chunks(MAX_BIND_PARAMETERS / 2) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");

        query_builder.push_values(chunk, |mut b, ingredient| {
            b.push_bind(ingredient.name.as_str())
                .push_bind(ingredient.measurement_unit.as_str());
        });
        query_builder.push(" ON CONFLICT (name, measurement_unit) DO NOTHING");

        let result = query_builder.build().execute(pool).await?;
        inserted += result.rows_affected();
        log::debug!("Inserted {} of {} ingredients", result.rows_affected(), chunk.len());
    }

    Ok(inserted)
}

/// Parses `[{"name": .., "measurement_unit": ..}]` JSON or `name,unit` CSV.
pub fn parse_ingredient_dataset(
    contents: &str,
    csv: bool,
) -> Result<Vec<NewIngredient>, FoodgramError> {
    let parsed: Vec<NewIngredient> = if csv {
        parse_csv(contents)?
    } else {
        serde_json::from_str(contents).map_err(|e| FoodgramError::Dataset(format!("{e}")))?
    };

    let mut ingredients = Vec::with_capacity(parsed.len());
    for ingredient in parsed {
        let name = ingredient.name.trim();
        let unit = ingredient.measurement_unit.trim();
        if name.is_empty() || unit.is_empty() {
            return Err(FoodgramError::Dataset(format!(
                "Ingredient {:?} is missing a name or unit",
                ingredient.name
            )));
        }
        if name.chars().count() > MAX_NAME_LENGTH || unit.chars().count() > MAX_NAME_LENGTH {
            return Err(FoodgramError::Dataset(format!("Ingredient {name:?} is too long")));
        }
        ingredients.push(NewIngredient {
            name: name.to_owned(),
            measurement_unit: unit.to_owned(),
        });
    }

    Ok(ingredients)
}

fn parse_csv(contents: &str) -> Result<Vec<NewIngredient>, FoodgramError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let mut parsed = vec![];
    for record in reader.records() {
        let record = record.map_err(|e| FoodgramError::Dataset(format!("{e}")))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        match (record.get(0), record.get(1), record.len()) {
            (Some(name), Some(unit), 2) => parsed.push(NewIngredient {
                name: name.to_owned(),
                measurement_unit: unit.to_owned(),
            }),
            _ => {
                return Err(FoodgramError::Dataset(format!(
                    "Line {line}: expected `name,unit`"
                )))
            }
        }
    }

    Ok(parsed)
}

pub async fn read_ingredient_dataset(path: &Path) -> Result<Vec<NewIngredient>, FoodgramError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| FoodgramError::Dataset(format!("{}: {e}", path.display())))?;

    let csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    parse_ingredient_dataset(&contents, csv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_json() {
        let data = r#"[
            {"name": "абрикосовое варенье", "measurement_unit": "г"},
            {"name": " salt ", "measurement_unit": "g"}
        ]"#;
        let parsed = parse_ingredient_dataset(data, false).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].measurement_unit, "г");
        assert_eq!(parsed[1].name, "salt");
    }

    #[test]
    fn parses_csv_with_commas_in_name() {
        let data = "salt,g\n\n\"pepper, black\",pinch\n";
        let parsed = parse_ingredient_dataset(data, true).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].name, "pepper, black");
        assert_eq!(parsed[1].measurement_unit, "pinch");
    }

    #[test]
    fn parses_csv_quoting() {
        let data = "\"5\"\" pan\",piece\nsalt,\"g, coarse\"\n";
        let parsed = parse_ingredient_dataset(data, true).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "5\" pan");
        assert_eq!(parsed[0].measurement_unit, "piece");
        assert_eq!(parsed[1].name, "salt");
        assert_eq!(parsed[1].measurement_unit, "g, coarse");
    }

    #[test]
    fn rejects_extra_columns() {
        assert!(parse_ingredient_dataset("salt,g,extra\n", true).is_err());
    }

    #[test]
    fn rejects_incomplete_rows() {
        assert!(parse_ingredient_dataset("salt\n", true).is_err());
        assert!(parse_ingredient_dataset("salt, \n", true).is_err());
        assert!(parse_ingredient_dataset(r#"[{"name": "salt"}]"#, false).is_err());
    }

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }
}
