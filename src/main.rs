use std::process::ExitCode;

use foodgram_sdk::{
    actions::ingredients::import_ingredients,
    config::Config,
    connect::connect,
    error::ApiError,
    jwt::SessionKey,
    media::MediaStore,
    routes::{api, AppState},
    schema::NewIngredient,
};
use warp::Filter;

async fn seed_ingredients(config: &Config, state: &AppState) -> Result<(), ApiError> {
    let Some(path) = config.ingredients_file.as_ref() else {
        return Ok(());
    };

    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        ApiError::InvalidRequest(format!("Failed to read {}: {e}", path.display()))
    })?;
    let ingredients: Vec<NewIngredient> = serde_json::from_str(&raw).map_err(|e| {
        ApiError::InvalidRequest(format!("Failed to parse {}: {e}", path.display()))
    })?;

    import_ingredients(&ingredients, &state.pool).await?;
    Ok(())
}

async fn run() -> Result<(), ApiError> {
    let config = Config::load()?;

    let state = AppState {
        pool: connect(&config.database_url).await?,
        media: MediaStore::new(config.media_root.clone(), &config.media_url),
        key: SessionKey::new(config.secret.as_bytes(), config.session_hours)?,
    };
    seed_ingredients(&config, &state).await?;

    log::info!("Listening on {}", config.addr);
    warp::serve(api(state).with(warp::log("foodgram")))
        .run(config.addr)
        .await;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
