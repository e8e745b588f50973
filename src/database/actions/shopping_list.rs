use std::fmt::Write;

use sqlx::{Pool, Sqlite};

use crate::{error::ApiError, jwt::Principal, schema::ShoppingListItem};

/// Ingredient totals across every recipe in the principal's shopping list.
pub async fn collect_shopping_list(
    principal: &Principal,
    pool: &Pool<Sqlite>,
) -> Result<Vec<ShoppingListItem>, ApiError> {
    let session = principal.require()?;

    let rows: Vec<ShoppingListItem> = sqlx::query_as(
        "
        SELECT i.name AS name, i.measurement_unit AS measurement_unit, SUM(ri.amount) AS total_amount
        FROM shopping_list s
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = s.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE s.user_id = $1
        GROUP BY i.name, i.measurement_unit
        ORDER BY i.name, i.measurement_unit
    ",
    )
    .bind(session.user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub fn render_shopping_list(items: &[ShoppingListItem]) -> String {
    let mut out = String::from("Shopping list\n\n");

    if items.is_empty() {
        out.push_str("Nothing to buy.\n");
        return out;
    }

    for item in items {
        // writing into a String cannot fail
        let _ = writeln!(
            out,
            "{} ({}) - {}",
            item.name, item.measurement_unit, item.total_amount
        );
    }
    out
}

pub async fn download_shopping_list(
    principal: &Principal,
    pool: &Pool<Sqlite>,
) -> Result<String, ApiError> {
    let items = collect_shopping_list(principal, pool).await?;
    Ok(render_shopping_list(&items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_lines() {
        let items = vec![
            ShoppingListItem {
                name: String::from("flour"),
                measurement_unit: String::from("g"),
                total_amount: 700,
            },
            ShoppingListItem {
                name: String::from("milk"),
                measurement_unit: String::from("ml"),
                total_amount: 250,
            },
        ];

        assert_eq!(
            render_shopping_list(&items),
            "Shopping list\n\nflour (g) - 700\nmilk (ml) - 250\n"
        );
    }

    #[test]
    fn renders_empty() {
        assert_eq!(render_shopping_list(&[]), "Shopping list\n\nNothing to buy.\n");
    }
}
