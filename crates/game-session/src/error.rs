//! Session error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("engine error: {0}")]
    Engine(String),

    #[error("engine produced illegal move '{0}'")]
    IllegalEngineMove(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("time control can only be changed between games")]
    TimeControlLocked,
}
