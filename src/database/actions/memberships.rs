use sqlx::{Pool, Sqlite};

use crate::{
    authentication::permissions::ActionType,
    error::ApiError,
    jwt::Principal,
    pagination::{Page, PageParams},
    schema::{Id, MembershipEntry, RecipeSummaryRow, User},
};

/// The per-user membership sets layered over recipes and authors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Favorites,
    ShoppingList,
    Subscriptions,
}

impl Collection {
    fn table(self) -> &'static str {
        match self {
            Collection::Favorites => "favorites",
            Collection::ShoppingList => "shopping_list",
            Collection::Subscriptions => "subscriptions",
        }
    }

    fn target_column(self) -> &'static str {
        match self {
            Collection::Favorites | Collection::ShoppingList => "recipe_id",
            Collection::Subscriptions => "author_id",
        }
    }

    fn action(self) -> ActionType {
        match self {
            Collection::Favorites => ActionType::ManageOwnFavorites,
            Collection::ShoppingList => ActionType::ManageOwnShoppingList,
            Collection::Subscriptions => ActionType::ManageOwnSubscriptions,
        }
    }

    fn target_name(self) -> &'static str {
        match self {
            Collection::Favorites | Collection::ShoppingList => "Recipe",
            Collection::Subscriptions => "User",
        }
    }

    fn conflict_message(self) -> &'static str {
        match self {
            Collection::Favorites => "This recipe is already in favorites.",
            Collection::ShoppingList => "This recipe is already in the shopping list.",
            Collection::Subscriptions => "You are already subscribed to this author.",
        }
    }

    fn missing_message(self) -> &'static str {
        match self {
            Collection::Favorites => "This recipe is not in favorites.",
            Collection::ShoppingList => "This recipe is not in the shopping list.",
            Collection::Subscriptions => "You are not subscribed to this author.",
        }
    }

    async fn target_exists(self, target: Id, pool: &Pool<Sqlite>) -> Result<bool, ApiError> {
        let query = match self {
            Collection::Favorites | Collection::ShoppingList => "SELECT id FROM recipes WHERE id = $1",
            Collection::Subscriptions => "SELECT id FROM users WHERE id = $1",
        };

        let row: Option<(Id,)> = sqlx::query_as(query)
            .bind(target)
            .fetch_optional(pool)
            .await?;

        Ok(row.is_some())
    }
}

/// Adds `(principal, target)` to the collection.
///
/// The unique constraint on the pair is the final arbiter: a concurrent add
/// that loses the race inserts nothing and is reported as a conflict.
pub async fn add_membership(
    collection: Collection,
    principal: &Principal,
    target: Id,
    pool: &Pool<Sqlite>,
) -> Result<MembershipEntry, ApiError> {
    let session = principal.require()?;
    session.authenticate(collection.action())?;

    if collection == Collection::Subscriptions && session.user_id == target {
        return Err(ApiError::Conflict(String::from(
            "You cannot subscribe to yourself.",
        )));
    }

    if !collection.target_exists(target, pool).await? {
        return Err(ApiError::not_found(collection.target_name()));
    }

    let entry: Option<MembershipEntry> = sqlx::query_as(&format!(
        "INSERT INTO {table} (user_id, {column}) VALUES ($1, $2) ON CONFLICT DO NOTHING RETURNING id, user_id, {column} AS target_id",
        table = collection.table(),
        column = collection.target_column(),
    ))
    .bind(session.user_id)
    .bind(target)
    .fetch_optional(pool)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::Conflict(collection.conflict_message().to_string()),
        other => other,
    })?;

    match entry {
        Some(entry) => {
            log::info!(
                "User {} added {} to {}",
                session.user_id,
                target,
                collection.table()
            );
            Ok(entry)
        }
        None => Err(ApiError::Conflict(collection.conflict_message().to_string())),
    }
}

pub async fn remove_membership(
    collection: Collection,
    principal: &Principal,
    target: Id,
    pool: &Pool<Sqlite>,
) -> Result<(), ApiError> {
    let session = principal.require()?;
    session.authenticate(collection.action())?;

    let result = sqlx::query(&format!(
        "DELETE FROM {table} WHERE user_id = $1 AND {column} = $2",
        table = collection.table(),
        column = collection.target_column(),
    ))
    .bind(session.user_id)
    .bind(target)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(collection.missing_message().to_string()));
    }

    log::info!(
        "User {} removed {} from {}",
        session.user_id,
        target,
        collection.table()
    );
    Ok(())
}

/// Whether the viewer holds `target` in the collection; always false for
/// anonymous viewers.
pub async fn is_member(
    collection: Collection,
    viewer: Option<Id>,
    target: Id,
    pool: &Pool<Sqlite>,
) -> Result<bool, ApiError> {
    let Some(viewer) = viewer else {
        return Ok(false);
    };

    let row: Option<(Id,)> = sqlx::query_as(&format!(
        "SELECT id FROM {table} WHERE user_id = $1 AND {column} = $2",
        table = collection.table(),
        column = collection.target_column(),
    ))
    .bind(viewer)
    .bind(target)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// Recipes held in the principal's favorites or shopping list.
pub async fn list_member_recipes(
    collection: Collection,
    principal: &Principal,
    params: &PageParams,
    pool: &Pool<Sqlite>,
) -> Result<Page<RecipeSummaryRow>, ApiError> {
    let session = principal.require()?;

    if collection == Collection::Subscriptions {
        return Err(ApiError::InvalidRequest(String::from(
            "Subscriptions hold authors, not recipes",
        )));
    }

    let table = collection.table();

    let total: (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM {table} m INNER JOIN recipes r ON r.id = m.recipe_id WHERE m.user_id = $1"
    ))
    .bind(session.user_id)
    .fetch_one(pool)
    .await?;

    let rows: Vec<RecipeSummaryRow> = sqlx::query_as(&format!(
        "
        SELECT r.id, r.name, r.image, r.cooking_time
        FROM {table} m
        INNER JOIN recipes r ON r.id = m.recipe_id
        WHERE m.user_id = $1
        ORDER BY m.id
        LIMIT $2 OFFSET $3
    "
    ))
    .bind(session.user_id)
    .bind(params.page_size())
    .bind(params.offset())
    .fetch_all(pool)
    .await?;

    let path = match collection {
        Collection::Favorites => "/api/recipes/favorites/",
        _ => "/api/recipes/shopping_cart/",
    };

    Ok(Page::from_rows(rows, total.0, params, path))
}

/// Authors the principal is subscribed to.
pub async fn list_subscribed_authors(
    principal: &Principal,
    params: &PageParams,
    pool: &Pool<Sqlite>,
) -> Result<Page<User>, ApiError> {
    let session = principal.require()?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE user_id = $1")
        .bind(session.user_id)
        .fetch_one(pool)
        .await?;

    let rows: Vec<User> = sqlx::query_as(
        "
        SELECT u.*
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY s.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(params.page_size())
    .bind(params.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page::from_rows(
        rows,
        total.0,
        params,
        "/api/users/subscriptions/",
    ))
}
