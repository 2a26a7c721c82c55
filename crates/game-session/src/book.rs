//! Opening repertoire and humanized reply timing.
//!
//! The book is keyed by 4-field FEN (move counters stripped) and stores
//! per-move game statistics. A binary book file can be loaded at startup;
//! without one, a small built-in repertoire of main lines keeps the opening
//! phase from going straight to search.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Stats for a single book move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookMoveStats {
    pub games: i32,
    pub white_wins: i32,
    pub draws: i32,
    pub black_wins: i32,
}

/// The entire repertoire: FEN -> (move_san -> stats)
pub type Repertoire = HashMap<String, HashMap<String, BookMoveStats>>;

/// First reply of a game never waits longer than this, whatever the time
/// control; a long pause on move one reads as a hang, not as thinking.
pub const FIRST_MOVE_DELAY_CAP_MS: u64 = 2000;

/// Opening book with explicit ownership: constructed once per session and
/// injected where needed, never a process-wide global.
#[derive(Debug, Clone)]
pub struct OpeningBook {
    entries: Repertoire,
}

impl OpeningBook {
    pub fn from_entries(entries: Repertoire) -> Self {
        Self { entries }
    }

    /// Load the book from a binary file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let entries: Repertoire = bincode::deserialize_from(reader)?;
        Ok(Self { entries })
    }

    /// Load from file, falling back to the built-in repertoire.
    pub fn load_or_builtin<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(book) => {
                let total_moves: usize = book.entries.values().map(|m| m.len()).sum();
                info!(
                    positions = book.entries.len(),
                    moves = total_moves,
                    "Loaded opening book"
                );
                book
            }
            Err(e) => {
                warn!(
                    path = %path.as_ref().display(),
                    error = %e,
                    "Failed to load opening book, using built-in repertoire"
                );
                Self::builtin()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pick a reply for the position, weighted by how often each move was
    /// played. None means the position is out of book; the caller latches
    /// that and stops asking for the rest of the game.
    pub fn reply_for(&self, fen: &str) -> Option<String> {
        let moves = self.entries.get(&normalize_fen(fen))?;
        if moves.is_empty() {
            return None;
        }

        let total: i64 = moves.values().map(|s| i64::from(s.games.max(1))).sum();
        let mut roll = rand::rng().random_range(0..total);
        for (san, stats) in moves {
            roll -= i64::from(stats.games.max(1));
            if roll < 0 {
                return Some(san.clone());
            }
        }
        // Rounding can't get here, but don't panic over a book lookup.
        moves.keys().next().cloned()
    }

    /// Check if a move is in the book.
    pub fn is_book_move(&self, fen: &str, move_san: &str) -> bool {
        self.entries
            .get(&normalize_fen(fen))
            .map(|moves| moves.contains_key(move_san))
            .unwrap_or(false)
    }

    /// A handful of main lines, enough to give the first few plies of most
    /// games a book reply.
    pub fn builtin() -> Self {
        let mut entries: Repertoire = HashMap::new();

        let mut add = |fen: &str, moves: &[(&str, i32)]| {
            let table = moves
                .iter()
                .map(|&(san, games)| (san.to_string(), stats(games)))
                .collect();
            entries.insert(fen.to_string(), table);
        };

        add(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -",
            &[("e4", 4500), ("d4", 3800), ("Nf3", 1200), ("c4", 900)],
        );
        add(
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq -",
            &[("e5", 2400), ("c5", 3100), ("e6", 900), ("c6", 700)],
        );
        add(
            "rnbqkbnr/pppppppp/8/8/3P4/8/PPP1PPPP/RNBQKBNR b KQkq -",
            &[("d5", 1900), ("Nf6", 2300)],
        );
        add(
            "rnbqkbnr/pppppppp/8/8/2P5/8/PP1PPPPP/RNBQKBNR b KQkq -",
            &[("e5", 500), ("Nf6", 700), ("c5", 400)],
        );
        add(
            "rnbqkbnr/pppppppp/8/8/8/5N2/PPPPPPPP/RNBQKB1R b KQkq -",
            &[("d5", 600), ("Nf6", 800)],
        );
        add(
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq -",
            &[("Nf3", 2100), ("Bc4", 400), ("Nc3", 300)],
        );
        add(
            "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq -",
            &[("Nf3", 2600), ("Nc3", 700), ("c3", 500)],
        );
        add(
            "rnbqkbnr/pppp1ppp/4p3/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq -",
            &[("d4", 900), ("d3", 150)],
        );
        add(
            "rnbqkbnr/pp1ppppp/2p5/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq -",
            &[("d4", 650), ("Nc3", 250)],
        );
        add(
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq -",
            &[("Nc6", 1800), ("Nf6", 600), ("d6", 300)],
        );
        add(
            "rnbqkbnr/pp1ppppp/8/2p5/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq -",
            &[("d6", 1100), ("Nc6", 900), ("e6", 700)],
        );
        add(
            "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq -",
            &[("Bb5", 1200), ("Bc4", 700), ("d4", 400)],
        );
        add(
            "rnbqkb1r/pppp1ppp/5n2/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq -",
            &[("Nxe5", 500), ("Nc3", 200)],
        );
        add(
            "r1bqkbnr/pppp1ppp/2n5/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R b KQkq -",
            &[("a6", 900), ("Nf6", 400)],
        );
        add(
            "rnbqkbnr/ppp1pppp/8/3p4/3P4/8/PPP1PPPP/RNBQKBNR w KQkq -",
            &[("c4", 1100), ("Nf3", 800), ("Bf4", 300)],
        );
        add(
            "rnbqkb1r/pppppppp/5n2/8/3P4/8/PPP1PPPP/RNBQKBNR w KQkq -",
            &[("c4", 1400), ("Nf3", 900)],
        );
        add(
            "rnbqkbnr/ppp1pppp/8/3p4/2PP4/8/PP2PPPP/RNBQKBNR b KQkq -",
            &[("e6", 800), ("c6", 700), ("dxc4", 300)],
        );

        Self { entries }
    }
}

fn stats(games: i32) -> BookMoveStats {
    BookMoveStats {
        games,
        white_wins: games * 2 / 5,
        draws: games / 4,
        black_wins: games - games * 2 / 5 - games / 4,
    }
}

/// Strips move counters from FEN, keeping only position + side + castling + ep.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// A human-plausible "thinking time" for a book reply, proportional to the
/// clock: roughly a sixtieth of the remaining time plus half the increment,
/// jittered. The first move of a game is capped hard so the opening never
/// feels dead.
pub fn book_move_delay(remaining_ms: u64, increment_ms: u64, fullmove: u32) -> Duration {
    let base = remaining_ms / 60 + increment_ms / 2;
    let jitter = rand::rng().random_range(0.6..1.4);
    let mut ms = ((base as f64) * jitter) as u64;
    ms = ms.clamp(250, 8_000);
    if fullmove <= 1 {
        ms = ms.min(FIRST_MOVE_DELAY_CAP_MS);
    }
    Duration::from_millis(ms)
}
