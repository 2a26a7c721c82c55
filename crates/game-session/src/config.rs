//! Live-session configuration from environment variables

use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Path to the UCI engine binary
    pub engine_path: String,

    /// Fixed search budget per engine reply
    pub search_movetime_ms: u64,

    /// Progress lines below this depth are not reported upward
    pub min_info_depth: u32,

    /// Clock tick cadence
    pub clock_tick: Duration,

    /// Path to the binary opening book
    pub book_path: String,

    /// Engine strength (Skill Level option, 0-20)
    pub skill_level: u8,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self {
            engine_path: env::var("ENGINE_PATH")
                .unwrap_or_else(|_| "/usr/local/bin/stockfish".to_string()),
            search_movetime_ms: env::var("SEARCH_MOVETIME_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            min_info_depth: env::var("MIN_INFO_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            clock_tick: Duration::from_millis(
                env::var("CLOCK_TICK_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(100),
            ),
            book_path: env::var("BOOK_PATH").unwrap_or_else(|_| "data/opening_book.bin".to_string()),
            skill_level: env::var("SKILL_LEVEL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
