use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use warp::{
    http::StatusCode,
    reject::Reject,
};

/// Field-keyed validation messages, rendered as `{"field": ["message", ...]}`.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: &str) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.0.get(field)
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid payload")]
    Validation(FieldErrors),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Authentication credentials were not provided.")]
    Unauthenticated,

    #[error("Invalid session; {0}")]
    InvalidSession(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Internal store failure: {0}")]
    Store(String),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found."))
    }

    pub fn forbidden() -> Self {
        Self::Forbidden(String::from(
            "You do not have permission to modify or delete someone else's content.",
        ))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidRequest(_) | ApiError::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthenticated | ApiError::InvalidSession(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            ApiError::Validation(errors) => json!(errors),
            ApiError::Conflict(info) => json!({ "errors": info }),
            // store details stay in the logs
            ApiError::Store(_) => json!({ "detail": "Internal server error." }),
            other => json!({ "detail": other.to_string() }),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self::NotFound(String::from("Not found.")),
            sqlx::Error::Database(e) if e.is_unique_violation() => {
                Self::Conflict(String::from("Object already exists."))
            }
            sqlx::Error::Database(e) if e.is_foreign_key_violation() => {
                Self::NotFound(String::from("Referenced object does not exist."))
            }
            sqlx::Error::Database(e) if e.is_check_violation() => {
                Self::InvalidRequest(format!("Constraint failed: {e}"))
            }
            sqlx::Error::PoolTimedOut => {
                log::error!("Store pool timed out");
                Self::Store(String::from("Pool timed out"))
            }
            sqlx::Error::PoolClosed => {
                log::error!("Store pool closed");
                Self::Store(String::from("Pool closed"))
            }
            e => {
                log::error!("Store query failed: {e}");
                Self::Store(format!("{e}"))
            }
        }
    }
}

impl From<sqlx::migrate::MigrateError> for ApiError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        log::error!("Migrating the store failed: {value}");
        Self::Store(format!("{value}"))
    }
}

impl Reject for ApiError {}
