use sqlx::{Pool, QueryBuilder, Sqlite};

use crate::{
    constants::{INGREDIENT_NAME_MAX_LENGTH, MEASUREMENT_UNIT_MAX_LENGTH},
    error::{ApiError, FieldErrors},
    schema::{Id, Ingredient, NewIngredient, RecipePart},
};

// SQLite caps bound parameters per statement
const IMPORT_CHUNK: usize = 32766 / 2;

fn check_ingredient(name: &str, measurement_unit: &str) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();

    if name.trim().is_empty() || name.chars().count() > INGREDIENT_NAME_MAX_LENGTH {
        errors.add("name", "Invalid ingredient name.");
    }
    if measurement_unit.trim().is_empty()
        || measurement_unit.chars().count() > MEASUREMENT_UNIT_MAX_LENGTH
    {
        errors.add("measurement_unit", "Invalid measurement unit.");
    }

    errors.into_result()
}

/// Escapes LIKE wildcards so a user-supplied prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

pub async fn create_ingredient(
    name: &str,
    measurement_unit: &str,
    pool: &Pool<Sqlite>,
) -> Result<Ingredient, ApiError> {
    check_ingredient(name, measurement_unit)?;

    let ingredient: Ingredient = sqlx::query_as(
        "
        INSERT INTO ingredients (name, measurement_unit)
        VALUES ($1, $2)
        RETURNING id, name, measurement_unit
    ",
    )
    .bind(name.trim())
    .bind(measurement_unit.trim())
    .fetch_one(pool)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::Conflict(format!(
            "Ingredient {name} ({measurement_unit}) already exists."
        )),
        other => other,
    })?;

    Ok(ingredient)
}

/// Bulk seed; rows clashing on (name, measurement_unit) are skipped.
/// Returns the number of inserted rows.
pub async fn import_ingredients(
    ingredients: &[NewIngredient],
    pool: &Pool<Sqlite>,
) -> Result<u64, ApiError> {
    for ingredient in ingredients {
        check_ingredient(&ingredient.name, &ingredient.measurement_unit)?;
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for chunk in ingredients.chunks(IMPORT_CHUNK) {
        let mut query_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");

        query_builder.push_values(chunk, |mut b, ingredient| {
            b.push_bind(ingredient.name.trim())
                .push_bind(ingredient.measurement_unit.trim());
        });
        query_builder.push(" ON CONFLICT DO NOTHING");

        inserted += query_builder
            .build()
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    tx.commit().await?;

    log::info!(
        "Imported {inserted} of {} ingredients",
        ingredients.len()
    );
    Ok(inserted)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Sqlite>) -> Result<Option<Ingredient>, ApiError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn ingredient_exists(id: Id, pool: &Pool<Sqlite>) -> Result<bool, ApiError> {
    let row: Option<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

/// Lists ingredients, optionally those whose name starts with `name`
/// (case-insensitive).
pub async fn list_ingredients(
    name: Option<&str>,
    pool: &Pool<Sqlite>,
) -> Result<Vec<Ingredient>, ApiError> {
    let rows: Vec<Ingredient> = match name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => {
            sqlx::query_as(
                "SELECT * FROM ingredients WHERE name LIKE $1 ESCAPE '\\' ORDER BY name, id",
            )
            .bind(like_prefix(name))
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM ingredients ORDER BY name, id")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows)
}

pub async fn list_recipe_parts(
    recipe_id: Id,
    pool: &Pool<Sqlite>,
) -> Result<Vec<RecipePart>, ApiError> {
    let rows: Vec<RecipePart> = sqlx::query_as(
        "
        SELECT i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY ri.id
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_escaping() {
        assert_eq!(like_prefix("sug"), "sug%");
        assert_eq!(like_prefix("100%_"), "100\\%\\_%");
    }

    #[test]
    fn ingredient_fields() {
        assert!(check_ingredient("salt", "g").is_ok());
        assert!(matches!(
            check_ingredient(" ", ""),
            Err(ApiError::Validation(errors))
                if errors.contains("name") && errors.contains("measurement_unit")
        ));
    }
}
