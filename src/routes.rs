//! The HTTP surface: a `warp` filter tree over the store actions.

use std::{convert::Infallible, sync::Arc};

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use sqlx::{Pool, Sqlite};
use warp::{
    filters::BoxedFilter,
    http::{header, StatusCode},
    reject::Rejection,
    reply::{self, Response},
    Filter, Reply,
};

use crate::{
    actions::{
        ingredients, memberships,
        memberships::Collection,
        recipes::{self, RecipeFilters},
        shopping_list, tags, users,
        users::RegisterForm,
    },
    constants::{PAGE_QUERY_PARAM, PAGE_SIZE_QUERY_PARAM, SHOPPING_LIST_FILENAME},
    error::ApiError,
    form::{validate_recipe_form, FormMode, RecipeForm},
    jwt::{Principal, SessionData, SessionKey},
    media::MediaStore,
    middleware::{with_principal, with_session},
    pagination::{Page, PageParams},
    schema::{Id, Recipe, UserRole},
    views::{RecipeSummary, RecipeView, SubscriptionView, UserView, ViewContext},
};

const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Sqlite>,
    pub media: MediaStore,
    pub key: SessionKey,
}

impl AppState {
    fn ctx<'a>(&'a self, principal: &'a Principal) -> ViewContext<'a> {
        ViewContext {
            principal,
            media: &self.media,
            pool: &self.pool,
        }
    }
}

type Shared = Arc<AppState>;

/// Raw query pairs; repeated keys (`tags=a&tags=b`) are kept.
#[derive(Debug, Clone, Default)]
pub struct QueryPairs(Vec<(String, String)>);

impl QueryPairs {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v.as_str()))
    }

    fn all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.to_owned())
            .collect()
    }

    fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("1") | Some("true") | Some("True"))
    }

    fn int(&self, key: &str) -> Result<Option<i64>, ApiError> {
        self.get(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ApiError::InvalidRequest(format!("Invalid {key} value")))
            })
            .transpose()
    }

    fn page_params(&self) -> Result<PageParams, ApiError> {
        Ok(PageParams {
            page: self.int(PAGE_QUERY_PARAM)?,
            limit: self.int(PAGE_SIZE_QUERY_PARAM)?,
        })
    }
}

#[derive(Deserialize, Debug)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct PasswordForm {
    pub current_password: String,
    pub new_password: String,
}

fn with_state(state: Shared) -> impl Filter<Extract = (Shared,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn query_pairs() -> impl Filter<Extract = (QueryPairs,), Error = Rejection> + Clone {
    warp::query::<Vec<(String, String)>>().map(QueryPairs)
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn created<T: serde::Serialize>(value: &T) -> Response {
    reply::with_status(reply::json(value), StatusCode::CREATED).into_response()
}

async fn recipe_page(
    page: Page<Recipe>,
    ctx: ViewContext<'_>,
) -> Result<Page<RecipeView>, ApiError> {
    let mut results = Vec::with_capacity(page.results.len());
    for recipe in page.results.iter() {
        results.push(RecipeView::build(recipe, ctx).await?);
    }

    Ok(Page {
        count: page.count,
        next: page.next,
        previous: page.previous,
        results,
    })
}

// tags

async fn list_tags(state: Shared) -> Result<Response, Rejection> {
    let tags = tags::list_tags(&state.pool).await?;
    Ok(reply::json(&tags).into_response())
}

async fn get_tag(id: Id, state: Shared) -> Result<Response, Rejection> {
    let tag = tags::get_tag(id, &state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Tag"))?;
    Ok(reply::json(&tag).into_response())
}

// ingredients

async fn list_ingredients(query: QueryPairs, state: Shared) -> Result<Response, Rejection> {
    let rows = ingredients::list_ingredients(query.get("name"), &state.pool).await?;
    Ok(reply::json(&rows).into_response())
}

async fn get_ingredient(id: Id, state: Shared) -> Result<Response, Rejection> {
    let ingredient = ingredients::get_ingredient(id, &state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Ingredient"))?;
    Ok(reply::json(&ingredient).into_response())
}

// recipes

async fn list_recipes(
    principal: Principal,
    query: QueryPairs,
    state: Shared,
) -> Result<Response, Rejection> {
    let filters = RecipeFilters {
        author: query.int("author")?,
        tags: query.all("tags"),
        is_favorited: query.flag("is_favorited"),
        is_in_shopping_cart: query.flag("is_in_shopping_cart"),
    };
    let params = query.page_params()?;

    let page = recipes::fetch_recipes(&filters, &principal, &params, &state.pool).await?;
    let page = recipe_page(page, state.ctx(&principal)).await?;
    Ok(reply::json(&page).into_response())
}

async fn get_recipe(id: Id, principal: Principal, state: Shared) -> Result<Response, Rejection> {
    let recipe = recipes::get_recipe(id, &state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipe"))?;
    let view = RecipeView::build(&recipe, state.ctx(&principal)).await?;
    Ok(reply::json(&view).into_response())
}

async fn create_recipe(
    principal: Principal,
    form: RecipeForm,
    state: Shared,
) -> Result<Response, Rejection> {
    let validated = validate_recipe_form(form, &principal, FormMode::Create, &state.pool).await?;
    let recipe = recipes::create_recipe(validated, &principal, &state.media, &state.pool).await?;
    let view = RecipeView::build(&recipe, state.ctx(&principal)).await?;
    Ok(created(&view))
}

async fn update_recipe(
    id: Id,
    principal: Principal,
    form: RecipeForm,
    state: Shared,
) -> Result<Response, Rejection> {
    let current = recipes::get_recipe_mut(id, &principal, &state.pool).await?;
    let validated = validate_recipe_form(form, &principal, FormMode::Update, &state.pool).await?;
    let recipe =
        recipes::update_recipe(current, validated, &principal, &state.media, &state.pool).await?;
    let view = RecipeView::build(&recipe, state.ctx(&principal)).await?;
    Ok(reply::json(&view).into_response())
}

async fn delete_recipe(id: Id, principal: Principal, state: Shared) -> Result<Response, Rejection> {
    recipes::delete_recipe(id, &principal, &state.media, &state.pool).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn add_recipe_membership(
    collection: Collection,
    id: Id,
    principal: Principal,
    state: Shared,
) -> Result<Response, Rejection> {
    memberships::add_membership(collection, &principal, id, &state.pool).await?;
    let recipe = recipes::get_recipe(id, &state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipe"))?;
    Ok(created(&RecipeSummary::from_recipe(&recipe, &state.media)))
}

async fn remove_membership(
    collection: Collection,
    id: Id,
    principal: Principal,
    state: Shared,
) -> Result<Response, Rejection> {
    memberships::remove_membership(collection, &principal, id, &state.pool).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_member_recipes(
    collection: Collection,
    principal: Principal,
    query: QueryPairs,
    state: Shared,
) -> Result<Response, Rejection> {
    let params = query.page_params()?;
    let page = memberships::list_member_recipes(collection, &principal, &params, &state.pool)
        .await?
        .map(|row| RecipeSummary::new(row, &state.media));
    Ok(reply::json(&page).into_response())
}

async fn download_shopping_cart(principal: Principal, state: Shared) -> Result<Response, Rejection> {
    let body = shopping_list::download_shopping_list(&principal, &state.pool).await?;

    let reply = reply::with_header(body, header::CONTENT_TYPE, "text/plain; charset=utf-8");
    let reply = reply::with_header(
        reply,
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    );
    Ok(reply.into_response())
}

// users

async fn list_users(
    principal: Principal,
    query: QueryPairs,
    state: Shared,
) -> Result<Response, Rejection> {
    let params = query.page_params()?;
    let page = users::list_users(&params, &state.pool).await?;

    let mut results = Vec::with_capacity(page.results.len());
    for user in page.results.iter() {
        results.push(UserView::build(user, state.ctx(&principal)).await?);
    }

    Ok(reply::json(&Page {
        count: page.count,
        next: page.next,
        previous: page.previous,
        results,
    })
    .into_response())
}

async fn register_user(form: RegisterForm, state: Shared) -> Result<Response, Rejection> {
    let user = users::register_user(form, UserRole::User, &state.pool).await?;

    Ok(created(&json!({
        "email": user.email,
        "id": user.id,
        "username": user.username,
        "first_name": user.first_name,
        "last_name": user.last_name,
    })))
}

async fn get_user(id: Id, principal: Principal, state: Shared) -> Result<Response, Rejection> {
    let user = users::get_user(id, &state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let view = UserView::build(&user, state.ctx(&principal)).await?;
    Ok(reply::json(&view).into_response())
}

async fn me(session: SessionData, state: Shared) -> Result<Response, Rejection> {
    let user = users::get_user(session.user_id, &state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let principal = Principal::Authenticated(session);
    let view = UserView::build(&user, state.ctx(&principal)).await?;
    Ok(reply::json(&view).into_response())
}

async fn set_password(
    session: SessionData,
    form: PasswordForm,
    state: Shared,
) -> Result<Response, Rejection> {
    users::set_password(
        session.user_id,
        &form.current_password,
        &form.new_password,
        &state.pool,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn login(form: LoginForm, state: Shared) -> Result<Response, Rejection> {
    let token = users::login_user(&form.email, &form.password, &state.key, &state.pool).await?;
    Ok(reply::json(&json!({ "auth_token": token })).into_response())
}

async fn subscriptions(
    principal: Principal,
    query: QueryPairs,
    state: Shared,
) -> Result<Response, Rejection> {
    let params = query.page_params()?;
    let recipes_limit = query.int("recipes_limit")?;
    let page = memberships::list_subscribed_authors(&principal, &params, &state.pool).await?;

    let mut results = Vec::with_capacity(page.results.len());
    for author in page.results.iter() {
        results.push(
            SubscriptionView::build(author, recipes_limit, &state.media, &state.pool).await?,
        );
    }

    Ok(reply::json(&Page {
        count: page.count,
        next: page.next,
        previous: page.previous,
        results,
    })
    .into_response())
}

async fn subscribe(
    id: Id,
    principal: Principal,
    query: QueryPairs,
    state: Shared,
) -> Result<Response, Rejection> {
    memberships::add_membership(Collection::Subscriptions, &principal, id, &state.pool).await?;
    let author = users::get_user(id, &state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let view =
        SubscriptionView::build(&author, query.int("recipes_limit")?, &state.media, &state.pool)
            .await?;
    Ok(created(&view))
}

async fn unsubscribe(id: Id, principal: Principal, state: Shared) -> Result<Response, Rejection> {
    memberships::remove_membership(Collection::Subscriptions, &principal, id, &state.pool).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn tag_routes(state: Shared) -> BoxedFilter<(Response,)> {
    let list = warp::path!("api" / "tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_tags);
    let detail = warp::path!("api" / "tags" / Id)
        .and(warp::get())
        .and(with_state(state))
        .and_then(get_tag);

    list.or(detail).unify().boxed()
}

fn ingredient_routes(state: Shared) -> BoxedFilter<(Response,)> {
    let list = warp::path!("api" / "ingredients")
        .and(warp::get())
        .and(query_pairs())
        .and(with_state(state.clone()))
        .and_then(list_ingredients);
    let detail = warp::path!("api" / "ingredients" / Id)
        .and(warp::get())
        .and(with_state(state))
        .and_then(get_ingredient);

    list.or(detail).unify().boxed()
}

fn with_collection(
    collection: Collection,
) -> impl Filter<Extract = (Collection,), Error = Infallible> + Clone {
    warp::any().map(move || collection)
}

fn membership_routes(state: Shared) -> BoxedFilter<(Response,)> {
    let principal = with_principal(state.key.clone());

    let favorite = with_collection(Collection::Favorites)
        .and(warp::path!("api" / "recipes" / Id / "favorite"))
        .and(warp::post())
        .and(principal.clone())
        .and(with_state(state.clone()))
        .and_then(add_recipe_membership);
    let unfavorite = with_collection(Collection::Favorites)
        .and(warp::path!("api" / "recipes" / Id / "favorite"))
        .and(warp::delete())
        .and(principal.clone())
        .and(with_state(state.clone()))
        .and_then(remove_membership);
    let favorites = with_collection(Collection::Favorites)
        .and(warp::path!("api" / "recipes" / "favorites"))
        .and(warp::get())
        .and(principal.clone())
        .and(query_pairs())
        .and(with_state(state.clone()))
        .and_then(list_member_recipes);

    let add_to_cart = with_collection(Collection::ShoppingList)
        .and(warp::path!("api" / "recipes" / Id / "shopping_cart"))
        .and(warp::post())
        .and(principal.clone())
        .and(with_state(state.clone()))
        .and_then(add_recipe_membership);
    let remove_from_cart = with_collection(Collection::ShoppingList)
        .and(warp::path!("api" / "recipes" / Id / "shopping_cart"))
        .and(warp::delete())
        .and(principal.clone())
        .and(with_state(state.clone()))
        .and_then(remove_membership);
    let cart = with_collection(Collection::ShoppingList)
        .and(warp::path!("api" / "recipes" / "shopping_cart"))
        .and(warp::get())
        .and(principal)
        .and(query_pairs())
        .and(with_state(state))
        .and_then(list_member_recipes);

    favorite
        .or(unfavorite)
        .unify()
        .or(favorites)
        .unify()
        .or(add_to_cart)
        .unify()
        .or(remove_from_cart)
        .unify()
        .or(cart)
        .unify()
        .boxed()
}

fn recipe_routes(state: Shared) -> BoxedFilter<(Response,)> {
    let principal = with_principal(state.key.clone());

    let download = warp::path!("api" / "recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(principal.clone())
        .and(with_state(state.clone()))
        .and_then(download_shopping_cart);
    let list = warp::path!("api" / "recipes")
        .and(warp::get())
        .and(principal.clone())
        .and(query_pairs())
        .and(with_state(state.clone()))
        .and_then(list_recipes);
    let create = warp::path!("api" / "recipes")
        .and(warp::post())
        .and(principal.clone())
        .and(json_body::<RecipeForm>())
        .and(with_state(state.clone()))
        .and_then(create_recipe);
    let detail = warp::path!("api" / "recipes" / Id)
        .and(warp::get())
        .and(principal.clone())
        .and(with_state(state.clone()))
        .and_then(get_recipe);
    let update = warp::path!("api" / "recipes" / Id)
        .and(warp::patch().or(warp::put()).unify())
        .and(principal.clone())
        .and(json_body::<RecipeForm>())
        .and(with_state(state.clone()))
        .and_then(update_recipe);
    let delete = warp::path!("api" / "recipes" / Id)
        .and(warp::delete())
        .and(principal)
        .and(with_state(state.clone()))
        .and_then(delete_recipe);

    membership_routes(state)
        .or(download)
        .unify()
        .or(list)
        .unify()
        .or(create)
        .unify()
        .or(detail)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .boxed()
}

fn user_routes(state: Shared) -> BoxedFilter<(Response,)> {
    let principal = with_principal(state.key.clone());

    let login = warp::path!("api" / "auth" / "token" / "login")
        .and(warp::post())
        .and(json_body::<LoginForm>())
        .and(with_state(state.clone()))
        .and_then(login);
    let me = warp::path!("api" / "users" / "me")
        .and(warp::get())
        .and(with_session(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(me);
    let set_password = warp::path!("api" / "users" / "set_password")
        .and(warp::post())
        .and(with_session(state.key.clone()))
        .and(json_body::<PasswordForm>())
        .and(with_state(state.clone()))
        .and_then(set_password);
    let subscriptions = warp::path!("api" / "users" / "subscriptions")
        .and(warp::get())
        .and(principal.clone())
        .and(query_pairs())
        .and(with_state(state.clone()))
        .and_then(subscriptions);
    let list = warp::path!("api" / "users")
        .and(warp::get())
        .and(principal.clone())
        .and(query_pairs())
        .and(with_state(state.clone()))
        .and_then(list_users);
    let register = warp::path!("api" / "users")
        .and(warp::post())
        .and(json_body::<RegisterForm>())
        .and(with_state(state.clone()))
        .and_then(register_user);
    let detail = warp::path!("api" / "users" / Id)
        .and(warp::get())
        .and(principal.clone())
        .and(with_state(state.clone()))
        .and_then(get_user);
    let subscribe = warp::path!("api" / "users" / Id / "subscribe")
        .and(warp::post())
        .and(principal.clone())
        .and(query_pairs())
        .and(with_state(state.clone()))
        .and_then(subscribe);
    let unsubscribe = warp::path!("api" / "users" / Id / "subscribe")
        .and(warp::delete())
        .and(principal)
        .and(with_state(state))
        .and_then(unsubscribe);

    login
        .or(me)
        .unify()
        .or(set_password)
        .unify()
        .or(subscriptions)
        .unify()
        .or(list)
        .unify()
        .or(register)
        .unify()
        .or(detail)
        .unify()
        .or(subscribe)
        .unify()
        .or(unsubscribe)
        .unify()
        .boxed()
}

/// The complete API plus media serving, with rejections rendered as JSON.
pub fn api(state: AppState) -> BoxedFilter<(Response,)> {
    let media_root = state.media.root().to_path_buf();
    let state = Arc::new(state);

    let media = warp::path("media")
        .and(warp::fs::dir(media_root))
        .map(|file: warp::filters::fs::File| file.into_response());

    tag_routes(state.clone())
        .or(ingredient_routes(state.clone()))
        .unify()
        .or(recipe_routes(state.clone()))
        .unify()
        .or(user_routes(state))
        .unify()
        .or(media)
        .unify()
        .recover(handle_rejection)
        .unify()
        .boxed()
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, body) = if let Some(e) = err.find::<ApiError>() {
        (e.status(), e.body())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, json!({ "detail": "Not found." }))
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, json!({ "detail": e.to_string() }))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, json!({ "detail": e.to_string() }))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            json!({ "detail": "Payload too large." }),
        )
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            json!({ "detail": "Unsupported media type." }),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "detail": "Method not allowed." }),
        )
    } else {
        log::error!("Unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "detail": "Internal server error." }),
        )
    };

    Ok(reply::with_status(reply::json(&body), status).into_response())
}
