//! Position snapshot backed by shakmaty.

use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position, Square};

use crate::error::OracleError;

/// Immutable snapshot of a chess position. Cheap to clone; applying a move
/// produces a new snapshot and never mutates the original.
#[derive(Debug, Clone)]
pub struct Board {
    pos: Chess,
}

/// Terminal status of a position as far as the rules alone can tell.
/// Threefold repetition needs game history and is tracked by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Ongoing,
    Checkmate { winner: Color },
    Draw,
}

/// Result of applying a move: the successor position plus the move rendered
/// in both notations.
#[derive(Debug, Clone)]
pub struct PlayedMove {
    pub board: Board,
    pub san: String,
    pub uci: String,
}

impl Default for Board {
    fn default() -> Self {
        Self::start()
    }
}

impl Board {
    /// The standard starting position.
    pub fn start() -> Self {
        Self {
            pos: Chess::default(),
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, OracleError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|_| OracleError::InvalidFen(fen.to_string()))?;
        let pos = parsed
            .into_position::<Chess>(CastlingMode::Standard)
            .map_err(|_| OracleError::InvalidFen(fen.to_string()))?;
        Ok(Self { pos })
    }

    pub fn fen(&self) -> String {
        Fen::from_position(&self.pos, EnPassantMode::Legal).to_string()
    }

    pub fn turn(&self) -> Color {
        self.pos.turn()
    }

    pub fn fullmoves(&self) -> u32 {
        self.pos.fullmoves().get()
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.pos.halfmoves()
    }

    /// Apply a SAN move. Check/mate/annotation suffixes are tolerated.
    pub fn play_san(&self, san_str: &str) -> Result<PlayedMove, OracleError> {
        let clean = san_str.trim_end_matches(|c: char| matches!(c, '+' | '#' | '!' | '?'));
        let san: San = clean
            .parse()
            .map_err(|_| OracleError::BadMove(san_str.to_string()))?;
        let mv = san
            .to_move(&self.pos)
            .map_err(|_| OracleError::IllegalMove(san_str.to_string()))?;
        Ok(self.play(&mv))
    }

    /// Apply a UCI move (`e2e4`, `e7e8q`).
    pub fn play_uci(&self, uci_str: &str) -> Result<PlayedMove, OracleError> {
        let uci: UciMove = uci_str
            .parse()
            .map_err(|_| OracleError::BadMove(uci_str.to_string()))?;
        let mv = uci
            .to_move(&self.pos)
            .map_err(|_| OracleError::IllegalMove(uci_str.to_string()))?;
        Ok(self.play(&mv))
    }

    fn play(&self, mv: &shakmaty::Move) -> PlayedMove {
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        let mut next = self.pos.clone();
        // SanPlus carries the check/mate suffix the move history shows.
        let san = SanPlus::from_move_and_play_unchecked(&mut next, *mv).to_string();
        PlayedMove {
            board: Board { pos: next },
            san,
            uci,
        }
    }

    pub fn is_checkmate(&self) -> bool {
        self.pos.is_checkmate()
    }

    /// Rule-level termination. Covers checkmate, stalemate, insufficient
    /// material and the fifty-move rule; repetition is the caller's job.
    pub fn status(&self) -> GameStatus {
        if self.pos.is_checkmate() {
            return GameStatus::Checkmate {
                winner: self.pos.turn().other(),
            };
        }
        if self.pos.is_stalemate()
            || self.pos.is_insufficient_material()
            || self.pos.halfmoves() >= 100
        {
            return GameStatus::Draw;
        }
        GameStatus::Ongoing
    }

    /// Legal destination squares for the piece on `from`. Used by the UI for
    /// move affordances; empty when the square is empty or the piece is stuck.
    pub fn legal_destinations(&self, from: Square) -> Vec<Square> {
        self.pos
            .legal_moves()
            .iter()
            .filter(|m| m.from() == Some(from))
            .map(|m| m.to())
            .collect()
    }

    /// Convert a UCI move line (engine PV) to SAN for display, truncating at
    /// the first move that does not convert. The engine and the caller can
    /// briefly disagree about the position; a half-converted line beats a
    /// failed one.
    pub fn san_line_from_uci(&self, uci_moves: &[String]) -> Vec<String> {
        let mut pos = self.pos.clone();
        let mut out = Vec::new();
        for uci_str in uci_moves {
            let uci: UciMove = match uci_str.parse() {
                Ok(u) => u,
                Err(_) => break,
            };
            let mv = match uci.to_move(&pos) {
                Ok(m) => m,
                Err(_) => break,
            };
            out.push(San::from_move(&pos, mv).to_string());
            pos.play_unchecked(mv);
        }
        out
    }
}
