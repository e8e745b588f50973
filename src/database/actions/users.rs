use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::{generate_jwt_session, SessionKey},
    },
    constants::{EMAIL_MAX_LENGTH, USER_NAME_MAX_LENGTH},
    error::{ApiError, FieldErrors},
    pagination::{Page, PageParams},
    schema::{Id, User, UserRole},
};

use serde::Deserialize;
use sqlx::{Pool, Sqlite};

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RegisterForm {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

fn required<'a>(
    value: &'a Option<String>,
    field: &str,
    max_length: usize,
    errors: &mut FieldErrors,
) -> &'a str {
    match value.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add(field, "This field is required.");
            ""
        }
        Some(value) if value.chars().count() > max_length => {
            errors.add(
                field,
                &format!("Ensure this field has no more than {max_length} characters."),
            );
            value
        }
        Some(value) => value,
    }
}

fn is_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn is_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '@' | '+' | '-' | '_'))
}

pub async fn get_user(id: Id, pool: &Pool<Sqlite>) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_user_by_email(email: &str, pool: &Pool<Sqlite>) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email.trim())
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn list_users(params: &PageParams, pool: &Pool<Sqlite>) -> Result<Page<User>, ApiError> {
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    let rows: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY id LIMIT $1 OFFSET $2")
        .bind(params.page_size())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

    Ok(Page::from_rows(rows, total.0, params, "/api/users/"))
}

/// Creates a user; the stored password is the argon2 hash of the given one.
pub async fn register_user(
    form: RegisterForm,
    role: UserRole,
    pool: &Pool<Sqlite>,
) -> Result<User, ApiError> {
    let mut errors = FieldErrors::new();

    let email = required(&form.email, "email", EMAIL_MAX_LENGTH, &mut errors);
    if !email.is_empty() && !is_email(email) {
        errors.add("email", "Enter a valid email address.");
    }
    let username = required(&form.username, "username", USER_NAME_MAX_LENGTH, &mut errors);
    if !username.is_empty() && !is_username(username) {
        errors.add("username", "Enter a valid username.");
    }
    let first_name = required(&form.first_name, "first_name", USER_NAME_MAX_LENGTH, &mut errors);
    let last_name = required(&form.last_name, "last_name", USER_NAME_MAX_LENGTH, &mut errors);
    let password = match form.password.as_deref() {
        None | Some("") => {
            errors.add("password", "This field is required.");
            ""
        }
        Some(password) => password,
    };
    errors.into_result()?;

    let password = hash_password(password)?;

    let user: User = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password, role)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
    ",
    )
    .bind(email.to_lowercase())
    .bind(username)
    .bind(first_name)
    .bind(last_name)
    .bind(password)
    .bind(role)
    .fetch_one(pool)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::Validation(FieldErrors::single(
            "email",
            "A user with this email or username already exists.",
        )),
        other => other,
    })?;

    log::info!("Registered user {} ({})", user.id, user.username);
    Ok(user)
}

pub async fn set_superuser(id: Id, pool: &Pool<Sqlite>) -> Result<(), ApiError> {
    let result = sqlx::query("UPDATE users SET is_superuser = TRUE WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User"));
    }
    Ok(())
}

pub async fn set_password(
    user_id: Id,
    current_password: &str,
    new_password: &str,
    pool: &Pool<Sqlite>,
) -> Result<(), ApiError> {
    let user = get_user(user_id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    if !verify_password(current_password, &user.password)? {
        return Err(ApiError::Validation(FieldErrors::single(
            "current_password",
            "Invalid password.",
        )));
    }
    if new_password.is_empty() {
        return Err(ApiError::Validation(FieldErrors::single(
            "new_password",
            "This field is required.",
        )));
    }

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(hash_password(new_password)?)
        .bind(user_id)
        .execute(pool)
        .await?;

    log::info!("User {user_id} changed their password");
    Ok(())
}

pub async fn login_user(
    email: &str,
    password: &str,
    key: &SessionKey,
    pool: &Pool<Sqlite>,
) -> Result<String, ApiError> {
    let invalid = || ApiError::InvalidRequest(String::from("Invalid credentials"));

    let user = get_user_by_email(email, pool).await?.ok_or_else(invalid)?;
    if !verify_password(password, &user.password)? {
        return Err(invalid());
    }

    generate_jwt_session(&user, key)
}
