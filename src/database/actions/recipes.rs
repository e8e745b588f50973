use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    authentication::permissions::{authorize_modify, ActionType},
    error::{ApiError, FieldErrors},
    form::{IngredientAmount, ValidatedRecipe},
    jwt::Principal,
    media::MediaStore,
    pagination::{Page, PageParams},
    schema::{Id, Recipe, RecipeSummaryRow},
};

/// Query-string filters for the recipe list.
#[derive(Debug, Clone, Default)]
pub struct RecipeFilters {
    pub author: Option<Id>,
    /// Tag slugs; a recipe matches when it has any of them.
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

fn push_filters<'a>(
    query_builder: &mut QueryBuilder<'a, Sqlite>,
    filters: &'a RecipeFilters,
    viewer: Option<Id>,
) {
    query_builder.push(" WHERE 1 = 1");

    if let Some(author) = filters.author {
        query_builder.push(" AND r.author_id = ").push_bind(author);
    }

    if !filters.tags.is_empty() {
        query_builder.push(
            " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug IN (",
        );
        let mut separated = query_builder.separated(", ");
        for slug in filters.tags.iter() {
            separated.push_bind(slug.as_str());
        }
        separated.push_unseparated("))");
    }

    // membership filters only make sense for a known viewer
    if let Some(viewer) = viewer {
        if filters.is_favorited {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
        if filters.is_in_shopping_cart {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM shopping_list s WHERE s.recipe_id = r.id AND s.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
    }
}

pub async fn fetch_recipes(
    filters: &RecipeFilters,
    principal: &Principal,
    params: &PageParams,
    pool: &Pool<Sqlite>,
) -> Result<Page<Recipe>, ApiError> {
    let viewer = principal.user_id();

    let mut count_builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM recipes r");
    push_filters(&mut count_builder, filters, viewer);
    let total: (i64,) = count_builder
        .build_query_as::<(i64,)>()
        .fetch_one(pool)
        .await?;

    let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT r.* FROM recipes r");
    push_filters(&mut query_builder, filters, viewer);
    query_builder
        .push(" ORDER BY r.id DESC LIMIT ")
        .push_bind(params.page_size())
        .push(" OFFSET ")
        .push_bind(params.offset());

    let rows: Vec<Recipe> = query_builder
        .build_query_as::<Recipe>()
        .fetch_all(pool)
        .await?;

    Ok(Page::from_rows(rows, total.0, params, "/api/recipes/"))
}

pub async fn get_recipe(id: Id, pool: &Pool<Sqlite>) -> Result<Option<Recipe>, ApiError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Loads a recipe the principal is allowed to change.
pub async fn get_recipe_mut(
    id: Id,
    principal: &Principal,
    pool: &Pool<Sqlite>,
) -> Result<Recipe, ApiError> {
    principal.require()?;

    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipe"))?;

    authorize_modify(principal, &recipe)?;
    Ok(recipe)
}

pub async fn count_author_recipes(author_id: Id, pool: &Pool<Sqlite>) -> Result<i64, ApiError> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await?;

    Ok(count.0)
}

/// The author's first `limit` recipes in default order, all of them without a limit.
pub async fn list_author_recipes(
    author_id: Id,
    limit: Option<i64>,
    pool: &Pool<Sqlite>,
) -> Result<Vec<RecipeSummaryRow>, ApiError> {
    let rows: Vec<RecipeSummaryRow> = sqlx::query_as(
        "
        SELECT id, name, image, cooking_time
        FROM recipes
        WHERE author_id = $1
        ORDER BY id DESC
        LIMIT $2
    ",
    )
    .bind(author_id)
    // negative LIMIT means no limit in SQLite
    .bind(limit.map(|limit| limit.max(0)).unwrap_or(-1))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

async fn attach_associations(
    recipe_id: Id,
    tags: &[Id],
    ingredients: &[IngredientAmount],
    conn: &mut SqliteConnection,
) -> Result<(), ApiError> {
    if tags.is_empty() || ingredients.is_empty() {
        return Err(ApiError::InvalidRequest(String::from(
            "A recipe needs at least one tag and one ingredient",
        )));
    }

    let mut query_builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    query_builder.push_values(tags, |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(*tag_id);
    });
    query_builder.build().execute(&mut *conn).await?;

    let mut query_builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    query_builder.push_values(ingredients, |mut b, ingredient| {
        b.push_bind(recipe_id)
            .push_bind(ingredient.id)
            .push_bind(ingredient.amount);
    });
    query_builder.build().execute(&mut *conn).await?;

    Ok(())
}

async fn clear_associations(recipe_id: Id, conn: &mut SqliteConnection) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

fn name_taken(e: ApiError) -> ApiError {
    match e {
        ApiError::Conflict(_) => ApiError::Validation(FieldErrors::single(
            "name",
            "A recipe with this name already exists.",
        )),
        other => other,
    }
}

async fn insert_recipe(
    recipe: &ValidatedRecipe,
    author_id: Id,
    image: &str,
    pool: &Pool<Sqlite>,
) -> Result<Recipe, ApiError> {
    let mut tx = pool.begin().await?;

    let created: Recipe = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    ",
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(image)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| name_taken(e.into()))?;

    attach_associations(created.id, &recipe.tags, &recipe.ingredients, &mut tx).await?;

    tx.commit().await?;
    Ok(created)
}

/// Persists a validated recipe authored by the principal. The recipe row and
/// its associations become visible together or not at all.
pub async fn create_recipe(
    recipe: ValidatedRecipe,
    principal: &Principal,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<Recipe, ApiError> {
    let session = principal.require()?;
    session.authenticate(ActionType::CreateRecipes)?;

    let upload = recipe.image.as_ref().ok_or_else(|| {
        ApiError::Validation(FieldErrors::single("image", "This field is required."))
    })?;
    let image = media.store(upload).await?;

    match insert_recipe(&recipe, session.user_id, &image, pool).await {
        Ok(created) => {
            log::info!(
                "Created recipe {} by user {}",
                created.id,
                created.author_id
            );
            Ok(created)
        }
        Err(e) => {
            media.remove(&image).await;
            Err(e)
        }
    }
}

async fn replace_recipe(
    recipe_id: Id,
    recipe: &ValidatedRecipe,
    image: Option<&str>,
    pool: &Pool<Sqlite>,
) -> Result<Recipe, ApiError> {
    let mut tx = pool.begin().await?;

    let updated: Recipe = sqlx::query_as(
        "
        UPDATE recipes
        SET name = $1, text = $2, cooking_time = $3, image = COALESCE($4, image)
        WHERE id = $5
        RETURNING *
    ",
    )
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .bind(image)
    .bind(recipe_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| name_taken(e.into()))?;

    clear_associations(recipe_id, &mut tx).await?;
    attach_associations(recipe_id, &recipe.tags, &recipe.ingredients, &mut tx).await?;

    tx.commit().await?;
    Ok(updated)
}

/// Full replace: tags and ingredients are rebuilt from the payload. The
/// author never changes.
pub async fn update_recipe(
    current: Recipe,
    recipe: ValidatedRecipe,
    principal: &Principal,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<Recipe, ApiError> {
    authorize_modify(principal, &current)?;

    let image = match recipe.image.as_ref() {
        Some(upload) => Some(media.store(upload).await?),
        None => None,
    };

    match replace_recipe(current.id, &recipe, image.as_deref(), pool).await {
        Ok(updated) => {
            if image.is_some() {
                media.remove(&current.image).await;
            }
            log::info!("Updated recipe {}", updated.id);
            Ok(updated)
        }
        Err(e) => {
            if let Some(image) = image {
                media.remove(&image).await;
            }
            Err(e)
        }
    }
}

/// Deletes the recipe; its ingredients, tags and memberships go by cascade.
pub async fn delete_recipe(
    id: Id,
    principal: &Principal,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<(), ApiError> {
    let recipe = get_recipe_mut(id, principal, pool).await?;

    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe.id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Recipe"));
    }

    media.remove(&recipe.image).await;
    log::info!("Deleted recipe {} (author {})", recipe.id, recipe.author_id);
    Ok(())
}
