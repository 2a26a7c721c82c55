//! Worker configuration from environment variables

use std::env;

use crate::error::ReviewError;

#[derive(Clone, Debug)]
pub struct ReviewConfig {
    /// Database connection URL
    pub database_url: String,

    /// Path to the UCI engine binary
    pub engine_path: String,

    /// Fixed search budget per position
    pub search_movetime_ms: u64,

    /// Progress lines below this depth are ignored
    pub min_info_depth: u32,

    /// Identifies the engine build + budget for cache keys
    pub engine_fingerprint: String,

    /// Path to the binary opening book
    pub book_path: String,

    /// AI annotation endpoint; unset means fallback comments only
    pub ai_endpoint: Option<String>,
    pub ai_api_key: Option<String>,

    /// Minimum WPL for annotation candidates
    pub ai_threshold: f64,

    /// Annotation budget per game
    pub max_ai_items: usize,

    /// Games fetched per drain iteration
    pub batch_size: i64,
}

impl ReviewConfig {
    pub fn load() -> Result<Self, ReviewError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ReviewError::Config("DATABASE_URL not set"))?;

        let engine_path =
            env::var("ENGINE_PATH").unwrap_or_else(|_| "/usr/local/bin/stockfish".to_string());

        let search_movetime_ms = env::var("SEARCH_MOVETIME_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000);

        let min_info_depth = env::var("MIN_INFO_DEPTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8);

        let engine_fingerprint = env::var("ENGINE_FINGERPRINT")
            .unwrap_or_else(|_| format!("stockfish-mt{search_movetime_ms}"));

        let book_path =
            env::var("BOOK_PATH").unwrap_or_else(|_| "data/opening_book.bin".to_string());

        let ai_endpoint = env::var("AI_ENDPOINT").ok();
        let ai_api_key = env::var("AI_API_KEY").ok();

        let ai_threshold = env::var("AI_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.2);

        let max_ai_items = env::var("MAX_AI_ITEMS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let batch_size = env::var("BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        Ok(Self {
            database_url,
            engine_path,
            search_movetime_ms,
            min_info_depth,
            engine_fingerprint,
            book_path,
            ai_endpoint,
            ai_api_key,
            ai_threshold,
            max_ai_items,
            batch_size,
        })
    }
}
