use crate::{
    constants::{DEFAULT_TAG_COLOR, TAG_NAME_MAX_LENGTH},
    error::{ApiError, FieldErrors},
    schema::{Id, Tag},
};

use sqlx::{Pool, Sqlite};

fn is_hex_color(color: &str) -> bool {
    let Some(digits) = color.strip_prefix('#') else {
        return false;
    };

    matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub async fn create_tag(
    name: &str,
    slug: &str,
    color: Option<&str>,
    pool: &Pool<Sqlite>,
) -> Result<Tag, ApiError> {
    let color = color.unwrap_or(DEFAULT_TAG_COLOR);

    let mut errors = FieldErrors::new();
    if name.trim().is_empty() || name.chars().count() > TAG_NAME_MAX_LENGTH {
        errors.add("name", "Invalid tag name.");
    }
    if !is_slug(slug) {
        errors.add("slug", "Enter a valid slug.");
    }
    if !is_hex_color(color) {
        errors.add("color", "Enter a valid HEX color.");
    }
    errors.into_result()?;

    let tag: Tag = sqlx::query_as(
        "INSERT INTO tags (name, slug, color) VALUES ($1, $2, $3) RETURNING id, name, slug, color",
    )
    .bind(name.trim())
    .bind(slug)
    .bind(color.to_lowercase())
    .fetch_one(pool)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::Conflict(String::from(
            "A tag with this name, slug or color already exists.",
        )),
        other => other,
    })?;

    log::info!("Created tag {} ({})", tag.id, tag.slug);
    Ok(tag)
}

pub async fn get_tag(id: Id, pool: &Pool<Sqlite>) -> Result<Option<Tag>, ApiError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(tag)
}

pub async fn tag_exists(id: Id, pool: &Pool<Sqlite>) -> Result<bool, ApiError> {
    let row: Option<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

pub async fn list_tags(pool: &Pool<Sqlite>) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(list)
}

pub async fn list_recipe_tags(recipe_id: Id, pool: &Pool<Sqlite>) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as(
        "
        SELECT t.id, t.name, t.slug, t.color
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = $1
        ORDER BY t.id
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors() {
        assert!(is_hex_color("#ffffff"));
        assert!(is_hex_color("#E26C2D"));
        assert!(is_hex_color("#abc"));
        assert!(!is_hex_color("ffffff"));
        assert!(!is_hex_color("#ggg"));
    }

    #[test]
    fn slugs() {
        assert!(is_slug("breakfast"));
        assert!(is_slug("late-dinner_2"));
        assert!(!is_slug("two words"));
        assert!(!is_slug(""));
    }
}
