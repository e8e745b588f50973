//! Helps to connect to the store.

use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};

use crate::error::ApiError;

/// Opens the pool with foreign keys enforced, so the declared cascades run in
/// the store, and applies pending migrations.
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>, ApiError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .inspect_err(|e| log::error!("Failed to connect to {database_url}. err: {e}"))?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    log::info!("Connected to {database_url}");
    Ok(pool)
}
