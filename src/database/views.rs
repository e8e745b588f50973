//! Wire projections of store rows, resolved for a particular viewer.

use serde::Serialize;
use sqlx::{Pool, Sqlite};

use crate::{
    actions::{
        ingredients::list_recipe_parts,
        memberships::{is_member, Collection},
        recipes::{count_author_recipes, list_author_recipes},
        tags::list_recipe_tags,
        users::get_user,
    },
    error::ApiError,
    jwt::Principal,
    media::MediaStore,
    schema::{Id, Recipe, RecipePart, RecipeSummaryRow, Tag, User},
};

/// Everything a projection needs besides the row itself.
#[derive(Clone, Copy)]
pub struct ViewContext<'a> {
    pub principal: &'a Principal,
    pub media: &'a MediaStore,
    pub pool: &'a Pool<Sqlite>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserView {
    pub fn new(user: &User, is_subscribed: bool) -> Self {
        Self {
            email: user.email.to_owned(),
            id: user.id,
            username: user.username.to_owned(),
            first_name: user.first_name.to_owned(),
            last_name: user.last_name.to_owned(),
            is_subscribed,
        }
    }

    pub async fn build(user: &User, ctx: ViewContext<'_>) -> Result<Self, ApiError> {
        let is_subscribed = is_member(
            Collection::Subscriptions,
            ctx.principal.user_id(),
            user.id,
            ctx.pool,
        )
        .await?;

        Ok(Self::new(user, is_subscribed))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeSummary {
    pub id: Id,
    pub name: String,
    pub image: String,
    pub cooking_time: i64,
}

impl RecipeSummary {
    pub fn new(row: RecipeSummaryRow, media: &MediaStore) -> Self {
        Self {
            id: row.id,
            image: media.url(&row.image),
            name: row.name,
            cooking_time: row.cooking_time,
        }
    }

    pub fn from_recipe(recipe: &Recipe, media: &MediaStore) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.to_owned(),
            image: media.url(&recipe.image),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct RecipeView {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<RecipePart>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i64,
}

impl RecipeView {
    pub async fn build(recipe: &Recipe, ctx: ViewContext<'_>) -> Result<Self, ApiError> {
        let author = get_user(recipe.author_id, ctx.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Author"))?;
        let viewer = ctx.principal.user_id();

        Ok(Self {
            id: recipe.id,
            tags: list_recipe_tags(recipe.id, ctx.pool).await?,
            author: UserView::build(&author, ctx).await?,
            ingredients: list_recipe_parts(recipe.id, ctx.pool).await?,
            is_favorited: is_member(Collection::Favorites, viewer, recipe.id, ctx.pool).await?,
            is_in_shopping_cart: is_member(Collection::ShoppingList, viewer, recipe.id, ctx.pool)
                .await?,
            name: recipe.name.to_owned(),
            image: ctx.media.url(&recipe.image),
            text: recipe.text.to_owned(),
            cooking_time: recipe.cooking_time,
        })
    }
}

/// An author as seen from the subscriptions list: profile plus a capped
/// selection of their recipes.
#[derive(Serialize, Debug, Clone)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub author: UserView,
    pub recipes: Vec<RecipeSummary>,
    pub recipes_count: i64,
}

impl SubscriptionView {
    pub async fn build(
        author: &User,
        recipes_limit: Option<i64>,
        media: &MediaStore,
        pool: &Pool<Sqlite>,
    ) -> Result<Self, ApiError> {
        let recipes = list_author_recipes(author.id, recipes_limit, pool)
            .await?
            .into_iter()
            .map(|row| RecipeSummary::new(row, media))
            .collect();

        Ok(Self {
            author: UserView::new(author, true),
            recipes,
            recipes_count: count_author_recipes(author.id, pool).await?,
        })
    }
}
