//! Cache-aware position evaluation.
//!
//! Everything that wants an evaluation goes through here: the cache is
//! consulted before the engine, and every completed search is written back,
//! so re-reviewing a game (or two games sharing an opening) never pays for
//! the same search twice.

use chess_oracle::{Board, GameStatus};
use chrono::Utc;
use game_session::engine::{EngineEvaluation, UciEngine};
use game_session::protocol::MATE_SCORE_BASE;
use shakmaty::Color;
use tracing::debug;

use crate::cache::{cache_key, CacheEntry, EvalCache};
use crate::error::ReviewError;

/// Evaluations for a whole game: one entry per position (before each ply,
/// plus the final position), parallel to the `fens` list.
pub struct GameEvaluations {
    pub evals: Vec<EngineEvaluation>,
    pub fens: Vec<String>,
}

pub struct CachedEvaluator {
    cache: EvalCache,
    /// Identifies the engine build and search budget the cached numbers came
    /// from; different fingerprints never share entries.
    fingerprint: String,
    movetime_ms: u64,
    min_depth: u32,
}

impl CachedEvaluator {
    pub fn new(cache: EvalCache, fingerprint: String, movetime_ms: u64, min_depth: u32) -> Self {
        Self {
            cache,
            fingerprint,
            movetime_ms,
            min_depth,
        }
    }

    pub fn cache(&mut self) -> &mut EvalCache {
        &mut self.cache
    }

    /// Evaluate one position, cache-first.
    pub async fn evaluate_position(
        &mut self,
        engine: &mut UciEngine,
        fen: &str,
    ) -> Result<CacheEntry, ReviewError> {
        let key = cache_key(&self.fingerprint, fen);
        if let Some(hit) = self.cache.get(&key).await {
            debug!(fen, "evaluation cache hit");
            return Ok(hit);
        }

        let eval = engine
            .search(fen, self.movetime_ms, self.min_depth)
            .await
            .map_err(|e| ReviewError::Engine(e.to_string()))?;

        let entry = CacheEntry {
            cp: eval.evaluation,
            depth: eval.depth,
            best_move: eval.best_move,
            pv: eval.principal_variation,
            multipv: None,
            timestamp: Utc::now(),
        };
        self.cache.set(&key, entry.clone()).await;
        Ok(entry)
    }

    /// Replay a game and evaluate every position. Best moves and PVs are
    /// converted to SAN through the oracle for human display; a PV move that
    /// no longer converts truncates the line rather than failing the game.
    pub async fn evaluate_game(
        &mut self,
        engine: &mut UciEngine,
        moves: &[String],
    ) -> Result<GameEvaluations, ReviewError> {
        let mut board = Board::start();
        let mut evals = Vec::with_capacity(moves.len() + 1);
        let mut fens = Vec::with_capacity(moves.len() + 1);

        for i in 0..=moves.len() {
            let fen = board.fen();

            // Terminal positions get no search: the engine would answer
            // `bestmove (none)` with a depth-0 score, and the mating move
            // must not read as an eval collapse for the winner.
            if let Some(eval) = terminal_evaluation(&board) {
                evals.push(eval);
                fens.push(fen);
                if let Some(san) = moves.get(i) {
                    return Err(ReviewError::Review(format!(
                        "move '{san}' played in a finished position"
                    )));
                }
                continue;
            }

            let entry = self.evaluate_position(engine, &fen).await?;

            let best_san = board
                .san_line_from_uci(std::slice::from_ref(&entry.best_move))
                .into_iter()
                .next()
                .unwrap_or_else(|| entry.best_move.clone());
            let pv_san = board.san_line_from_uci(&entry.pv);

            evals.push(EngineEvaluation {
                evaluation: entry.cp,
                best_move: best_san,
                principal_variation: pv_san,
                depth: entry.depth,
                calculation_time_ms: 0,
            });
            fens.push(fen);

            if let Some(san) = moves.get(i) {
                board = board
                    .play_san(san)
                    .map_err(|e| ReviewError::Review(format!("invalid move '{san}': {e}")))?
                    .board;
            }
        }

        Ok(GameEvaluations { evals, fens })
    }
}

/// Synthesized evaluation for a finished position: mate-now for checkmate,
/// level for a rule draw, None when play continues.
fn terminal_evaluation(board: &Board) -> Option<EngineEvaluation> {
    let evaluation = match board.status() {
        GameStatus::Checkmate { winner } => {
            if winner == Color::White {
                MATE_SCORE_BASE
            } else {
                -MATE_SCORE_BASE
            }
        }
        GameStatus::Draw => 0,
        GameStatus::Ongoing => return None,
    };
    Some(EngineEvaluation {
        evaluation,
        best_move: String::new(),
        principal_variation: Vec::new(),
        depth: 0,
        calculation_time_ms: 0,
    })
}
