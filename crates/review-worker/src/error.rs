//! Review worker error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Review error: {0}")]
    Review(String),

    #[error("Annotation error: {0}")]
    Annotation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<game_session::SessionError> for ReviewError {
    fn from(e: game_session::SessionError) -> Self {
        ReviewError::Engine(e.to_string())
    }
}
