//! Post-game review pipeline.
//!
//! Input is the finished game's SAN move list plus an evaluation list one
//! longer: `evals[i]` describes the position before `moves[i]`, so
//! `evals[i + 1]` is the post-move view. Classification is cheap and runs for
//! every ply; AI annotation is the expensive, rate-limited resource, so
//! worthiness and selection are tracked separately — the UI can show "worthy
//! but throttled" distinctly from "selected".

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use game_session::engine::EngineEvaluation;

use crate::metrics::{
    accuracy, centipawn_change, classify_cp, classify_wpl, win_probability_loss, Severity,
};

#[derive(Debug, Clone)]
pub struct ReviewOptions {
    /// Minimum WPL for a classified ply to become an annotation candidate.
    pub ai_threshold: f64,
    /// Annotation budget per game.
    pub max_ai_items: usize,
}

impl Default for ReviewOptions {
    fn default() -> Self {
        Self {
            ai_threshold: 0.2,
            max_ai_items: 5,
        }
    }
}

/// Per-ply result. Immutable once the review is built.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewItem {
    /// Stable ply index into the move list.
    pub ply: usize,
    pub move_number: u32,
    pub is_white_move: bool,
    pub san: String,
    pub eval_before: i32,
    /// None on the final ply when no trailing evaluation exists; such plies
    /// are not classified.
    pub eval_after: Option<i32>,
    pub centipawn_change: i32,
    pub wpl: f64,
    pub severity: Severity,
    /// Secondary metric kept for compatibility with older persisted reviews.
    pub legacy_severity: Severity,
    pub is_book_move: bool,
    pub matched_engine_best: bool,
    pub is_ai_worthy: bool,
    pub will_use_ai: bool,
    /// Filled in by the annotation step for selected plies.
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameReview {
    pub items: Vec<ReviewItem>,
    pub white_accuracy: f64,
    pub black_accuracy: f64,
    pub white_avg_cp_loss: f64,
    pub black_avg_cp_loss: f64,
}

/// Classify every ply, then rank annotation candidates by WPL (descending,
/// stable for ties) and select up to the configured budget.
pub fn review_game(
    moves: &[String],
    evals: &[EngineEvaluation],
    book_plies: &[bool],
    opts: &ReviewOptions,
) -> GameReview {
    let mut items: Vec<ReviewItem> = Vec::with_capacity(moves.len());

    let mut cp_loss = [0i32; 2];
    let mut counted = [0u32; 2];

    for (i, san) in moves.iter().enumerate() {
        let is_white_move = i % 2 == 0;
        let side = usize::from(!is_white_move);
        let eval_before = evals.get(i).map(|e| e.evaluation).unwrap_or(0);
        let eval_after = evals.get(i + 1).map(|e| e.evaluation);
        let is_book = book_plies.get(i).copied().unwrap_or(false);

        let mut item = ReviewItem {
            ply: i,
            move_number: (i / 2 + 1) as u32,
            is_white_move,
            san: san.clone(),
            eval_before,
            eval_after,
            centipawn_change: 0,
            wpl: 0.0,
            severity: Severity::None,
            legacy_severity: Severity::None,
            is_book_move: is_book,
            matched_engine_best: false,
            is_ai_worthy: false,
            will_use_ai: false,
            comment: None,
        };

        // No trailing evaluation: the ply stays unclassified.
        let post = match eval_after {
            Some(post) => post,
            None => {
                items.push(item);
                continue;
            }
        };

        item.centipawn_change = centipawn_change(eval_before, post, is_white_move);
        item.wpl = win_probability_loss(eval_before, post, is_white_move);
        item.legacy_severity = classify_cp(item.centipawn_change);

        item.matched_engine_best = evals
            .get(i)
            .map(|e| normalize_move_text(san) == normalize_move_text(&e.best_move))
            .unwrap_or(false);

        item.severity = if item.matched_engine_best {
            // The played move *is* the engine's choice; any apparent loss is
            // noise between two separate searches.
            Severity::None
        } else {
            let severity = classify_wpl(item.wpl);
            if is_book && severity != Severity::Blunder {
                // Book theory is not penalized at low severity. A genuine
                // blunder inside book still surfaces.
                Severity::None
            } else {
                severity
            }
        };

        item.is_ai_worthy = item.severity != Severity::None && item.wpl >= opts.ai_threshold;

        if !is_book {
            cp_loss[side] += item.centipawn_change;
            counted[side] += 1;
        }

        items.push(item);
    }

    // Selection pass: the budget gate for the paid annotation resource.
    let mut candidates: Vec<usize> = items
        .iter()
        .filter(|it| it.is_ai_worthy)
        .map(|it| it.ply)
        .collect();
    candidates.sort_by(|&a, &b| {
        items[b]
            .wpl
            .partial_cmp(&items[a].wpl)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for &ply in candidates.iter().take(opts.max_ai_items) {
        items[ply].will_use_ai = true;
    }

    let white_avg = if counted[0] > 0 {
        f64::from(cp_loss[0]) / f64::from(counted[0])
    } else {
        0.0
    };
    let black_avg = if counted[1] > 0 {
        f64::from(cp_loss[1]) / f64::from(counted[1])
    } else {
        0.0
    };

    GameReview {
        white_accuracy: accuracy(cp_loss[0], counted[0]),
        black_accuracy: accuracy(cp_loss[1], counted[1]),
        white_avg_cp_loss: white_avg,
        black_avg_cp_loss: black_avg,
        items,
    }
}

/// Normalize move text for best-move comparison: strip a move-number prefix
/// (`"2...Nf6"` -> `"Nf6"`), check/annotation suffixes, and case.
pub fn normalize_move_text(text: &str) -> String {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    let re = PREFIX.get_or_init(|| Regex::new(r"^\d+\.*\s*").unwrap());
    re.replace(text.trim(), "")
        .trim_end_matches(|c: char| matches!(c, '+' | '#' | '!' | '?'))
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(cp: i32, best: &str) -> EngineEvaluation {
        EngineEvaluation {
            evaluation: cp,
            best_move: best.to_string(),
            principal_variation: vec![],
            depth: 12,
            calculation_time_ms: 0,
        }
    }

    fn evals_from(cps: &[i32]) -> Vec<EngineEvaluation> {
        // Best move that no test SAN ever matches.
        cps.iter().map(|&cp| eval(cp, "Kh1")).collect()
    }

    fn sans(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_move_text() {
        assert_eq!(normalize_move_text("2...Nf6"), "nf6");
        assert_eq!(normalize_move_text("14. Qxe5"), "qxe5");
        assert_eq!(normalize_move_text("Nf6"), "nf6");
        assert_eq!(normalize_move_text("Qxe5+"), "qxe5");
    }

    #[test]
    fn test_hanging_queen_sequence() {
        let moves = sans(&["e4", "e5", "Qh5", "g6", "Qxe5+"]);
        let evals = evals_from(&[30, 97, 21, -39, 807]);
        let books = vec![false; 5];
        let review = review_game(&moves, &evals, &books, &ReviewOptions::default());

        // g6 hangs the e5 pawn with check and the rook to follow.
        let g6 = &review.items[3];
        assert_eq!(g6.severity, Severity::Blunder);
        assert_eq!(g6.centipawn_change, 846);
        assert!(g6.wpl >= 0.45);
        assert!(!g6.is_white_move);

        // e5 improved Black's position: no loss from the mover's side.
        assert_eq!(review.items[1].severity, Severity::None);
        assert_eq!(review.items[1].centipawn_change, 0);

        // Final ply has no trailing evaluation and is skipped.
        let last = &review.items[4];
        assert_eq!(last.eval_after, None);
        assert_eq!(last.severity, Severity::None);
        assert!(!last.is_ai_worthy);
    }

    #[test]
    fn test_ai_budget_selects_most_severe() {
        let moves = sans(&["a3", "a6", "b3", "b6", "c3", "c6", "d3", "d6", "e3", "e6"]);
        // Zigzag of growing amplitude: every ply loses more winning chances
        // than the one before it.
        let evals = evals_from(&[0, -100, 150, -300, 500, -800, 1200, -1800, 2600, -3600, 4800]);
        let books = vec![false; 10];

        let opts = ReviewOptions {
            ai_threshold: 0.2,
            max_ai_items: 1,
        };
        let review = review_game(&moves, &evals, &books, &opts);

        for window in review.items.windows(2) {
            assert!(window[1].wpl > window[0].wpl);
        }

        let selected: Vec<usize> = review
            .items
            .iter()
            .filter(|it| it.will_use_ai)
            .map(|it| it.ply)
            .collect();
        assert_eq!(selected, vec![9]);

        // Worthiness is independent of the budget.
        let worthy = review.items.iter().filter(|it| it.is_ai_worthy).count();
        assert!(worthy > 1);
    }

    #[test]
    fn test_ai_budget_top_k_order_stable() {
        let moves = sans(&["a3", "a6", "b3", "b6"]);
        // The eval bounces between 0 and -400, so plies 0, 1 and 2 all lose
        // the same winning chances; stable ranking keeps original order for
        // the tie.
        let evals = evals_from(&[0, -400, 0, -400, -400]);
        let books = vec![false; 4];
        let opts = ReviewOptions {
            ai_threshold: 0.2,
            max_ai_items: 2,
        };
        let review = review_game(&moves, &evals, &books, &opts);
        assert!((review.items[0].wpl - review.items[1].wpl).abs() < 1e-12);
        assert!((review.items[1].wpl - review.items[2].wpl).abs() < 1e-12);
        let selected: Vec<usize> = review
            .items
            .iter()
            .filter(|it| it.will_use_ai)
            .map(|it| it.ply)
            .collect();
        assert_eq!(selected, vec![0, 1]);
    }

    #[test]
    fn test_engine_best_match_suppresses_even_blunder_wpl() {
        let moves = sans(&["Nf6"]);
        let mut evals = evals_from(&[0, -900]);
        evals[0].best_move = "2...Nf6".to_string();
        let review = review_game(&moves, &evals, &[false], &ReviewOptions::default());
        let item = &review.items[0];
        assert!(item.matched_engine_best);
        assert!(item.wpl >= 0.45);
        assert_eq!(item.severity, Severity::None);
        assert!(!item.is_ai_worthy);
    }

    #[test]
    fn test_book_suppresses_mistake_but_not_blunder() {
        // A mistake-sized loss inside book is forgiven.
        let moves = sans(&["e4"]);
        let evals = evals_from(&[0, -150]);
        let review = review_game(&moves, &evals, &[true], &ReviewOptions::default());
        assert_eq!(review.items[0].severity, Severity::None);
        assert!(review.items[0].is_book_move);

        // A blunder inside book is still a blunder.
        let evals = evals_from(&[0, -400]);
        let review = review_game(&moves, &evals, &[true], &ReviewOptions::default());
        assert_eq!(review.items[0].severity, Severity::Blunder);
    }

    #[test]
    fn test_legacy_classifier_rides_along() {
        let moves = sans(&["a3"]);
        let evals = evals_from(&[0, -250]);
        let review = review_game(&moves, &evals, &[false], &ReviewOptions::default());
        assert_eq!(review.items[0].legacy_severity, Severity::Mistake);
    }
}
