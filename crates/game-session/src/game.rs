//! Live game orchestrator.
//!
//! Composes the board oracle, the game clock, and the engine session into one
//! state machine. Human moves come in as SAN; engine replies arrive as
//! session events. Termination checks run after every applied move and win
//! over a timeout detected in the same scheduling tick; the finished-game
//! record is produced exactly once however often the terminal state is
//! re-observed.

use std::collections::HashMap;
use std::time::Instant;

use chess_oracle::{Board, GameStatus};
use shakmaty::Color;
use tracing::debug;

use crate::book;
use crate::clock::GameClock;
use crate::error::SessionError;
use crate::rating::{elo_update, engine_rating_for_level, DEFAULT_K_FACTOR};
use crate::session::{
    EngineReply, EngineSession, ReplySource, SessionAction, SessionEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    NotStarted,
    InProgress,
    Checkmate { winner: Color },
    Draw,
    Resigned,
    Timeout { loser: Color },
    Aborted,
}

impl GamePhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GamePhase::NotStarted | GamePhase::InProgress)
    }
}

/// Record handed to persistence when a game ends. Aborted games never
/// produce one.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FinishedGame {
    pub move_text: String,
    pub result_code: String,
    pub human_color: String,
    /// 1 / 0.5 / 0 from the human's perspective.
    pub human_score: f64,
    pub rating_before: u32,
    pub rating_after: u32,
    pub opponent_level: u8,
    pub tags: Vec<String>,
}

pub struct LiveGame {
    board: Board,
    phase: GamePhase,
    human_color: Color,
    moves_san: Vec<String>,
    /// Position before each ply; one longer than `moves_san` once a move is in.
    fens: Vec<String>,
    clock: GameClock,
    session: EngineSession,
    difficulty: u8,
    human_rating: u32,
    finalized: bool,
    /// 4-field FEN -> occurrences, for threefold repetition.
    seen_positions: HashMap<String, u32>,
}

impl LiveGame {
    pub fn new(
        human_color: Color,
        difficulty: u8,
        human_rating: u32,
        clock: GameClock,
        session: EngineSession,
    ) -> Self {
        Self {
            board: Board::start(),
            phase: GamePhase::NotStarted,
            human_color,
            moves_san: Vec::new(),
            fens: vec![Board::start().fen()],
            clock,
            session,
            difficulty,
            human_rating,
            finalized: false,
            seen_positions: HashMap::new(),
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn moves(&self) -> &[String] {
        &self.moves_san
    }

    /// Positions before each ply (starting position first).
    pub fn fens(&self) -> &[String] {
        &self.fens
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    pub fn is_engine_thinking(&self) -> bool {
        self.session.is_thinking()
    }

    fn engine_color(&self) -> Color {
        self.human_color.other()
    }

    /// Start the game. If the engine has the first move, this kicks off its
    /// decision; the clock stays idle until a move is actually applied.
    pub fn begin(&mut self) -> Vec<SessionAction> {
        if self.phase != GamePhase::NotStarted {
            return Vec::new();
        }
        self.phase = GamePhase::InProgress;
        self.seen_positions
            .insert(book::normalize_fen(&self.board.fen()), 1);
        if self.board.turn() == self.engine_color() {
            self.notify_engine_turn()
        } else {
            Vec::new()
        }
    }

    /// Apply a human move. Out-of-turn, out-of-phase, and illegal moves are
    /// silent no-ops: the UI re-presents the unchanged position.
    pub fn play_human_move(&mut self, san: &str, now: Instant) -> Vec<SessionAction> {
        if self.phase != GamePhase::InProgress || self.board.turn() != self.human_color {
            return Vec::new();
        }
        let played = match self.board.play_san(san) {
            Ok(p) => p,
            Err(e) => {
                debug!(san, error = %e, "rejected human move");
                return Vec::new();
            }
        };

        self.apply_move(played.board, played.san, self.human_color);
        if self.phase.is_terminal() {
            return Vec::new();
        }
        // Mover's increment is already in; start the opponent's countdown
        // before the session snapshots the clock for its delay calculation.
        self.clock.run_for(self.engine_color(), now);
        self.notify_engine_turn()
    }

    /// Feed a session event (delay expiry, search completion, skill change,
    /// cancel) through the engine session, applying any reply it produces.
    pub fn handle_session_event(
        &mut self,
        event: SessionEvent,
        now: Instant,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match self.session.handle(event) {
            SessionAction::PlayReply(reply) => {
                self.apply_engine_reply(reply, now)?;
                Ok(Vec::new())
            }
            SessionAction::None => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    fn apply_engine_reply(&mut self, reply: EngineReply, now: Instant) -> Result<(), SessionError> {
        if self.phase != GamePhase::InProgress {
            // Reply raced a terminal transition; the session generation
            // should have caught this, but the board is the last word.
            debug!(mv = %reply.mv, "engine reply after game end discarded");
            self.session.reply_taken();
            return Ok(());
        }

        let played = match reply.source {
            ReplySource::Book => self.board.play_san(&reply.mv),
            ReplySource::Search => self.board.play_uci(&reply.mv),
        }
        .map_err(|_| SessionError::IllegalEngineMove(reply.mv.clone()))?;

        let engine_color = self.engine_color();
        self.apply_move(played.board, played.san, engine_color);
        self.session.reply_taken();

        if !self.phase.is_terminal() {
            self.clock.run_for(self.human_color, now);
        }
        Ok(())
    }

    /// Shared move application: board swap, history, the single increment
    /// credit for the mover, then the termination check.
    fn apply_move(&mut self, next: Board, san: String, mover: Color) {
        self.board = next;
        self.moves_san.push(san);
        self.fens.push(self.board.fen());
        self.clock.apply_increment(mover);
        self.check_termination();
    }

    fn notify_engine_turn(&mut self) -> Vec<SessionAction> {
        let engine_color = self.engine_color();
        let event = SessionEvent::EngineTurn {
            fen: self.board.fen(),
            fullmove: self.board.fullmoves(),
            remaining_ms: self.clock.remaining_ms(engine_color),
            increment_ms: self.clock.increment_ms(engine_color),
        };
        match self.session.handle(event) {
            SessionAction::None => Vec::new(),
            action => vec![action],
        }
    }

    /// Clock driver. Timeout is a normal terminal transition, subordinate to
    /// any checkmate/draw already detected when the move was applied.
    pub fn on_clock_tick(&mut self, now: Instant) {
        if self.phase != GamePhase::InProgress {
            return;
        }
        if let Some(loser) = self.clock.tick(now) {
            self.conclude(GamePhase::Timeout { loser });
        }
    }

    /// Human resigns. Persists and rates like any other loss.
    pub fn resign(&mut self) -> Vec<SessionAction> {
        if self.phase != GamePhase::InProgress {
            return Vec::new();
        }
        self.conclude(GamePhase::Resigned);
        self.cancel_session()
    }

    /// Abort the game: terminal, but never persisted or rated.
    pub fn abort(&mut self) -> Vec<SessionAction> {
        if self.phase != GamePhase::InProgress {
            return Vec::new();
        }
        self.conclude(GamePhase::Aborted);
        self.cancel_session()
    }

    pub fn set_difficulty(&mut self, level: u8) -> Vec<SessionAction> {
        self.difficulty = level;
        match self.session.handle(SessionEvent::SkillChanged(level)) {
            SessionAction::None => Vec::new(),
            action => vec![action],
        }
    }

    /// Change the time control. Only valid before any move of a game.
    pub fn set_time_control(
        &mut self,
        initial: std::time::Duration,
        increment: std::time::Duration,
    ) -> Result<(), SessionError> {
        if self.phase == GamePhase::InProgress && !self.moves_san.is_empty() {
            return Err(SessionError::TimeControlLocked);
        }
        self.clock.set_time_control(initial, increment)
    }

    fn cancel_session(&mut self) -> Vec<SessionAction> {
        match self.session.handle(SessionEvent::Cancel) {
            SessionAction::None => Vec::new(),
            action => vec![action],
        }
    }

    fn check_termination(&mut self) {
        match self.board.status() {
            GameStatus::Checkmate { winner } => {
                self.conclude(GamePhase::Checkmate { winner });
            }
            GameStatus::Draw => {
                self.conclude(GamePhase::Draw);
            }
            GameStatus::Ongoing => {
                let key = book::normalize_fen(&self.board.fen());
                let count = self.seen_positions.entry(key).or_insert(0);
                *count += 1;
                if *count >= 3 {
                    self.conclude(GamePhase::Draw);
                }
            }
        }
    }

    fn conclude(&mut self, phase: GamePhase) {
        self.phase = phase;
        self.clock.stop();
    }

    /// Produce the persistence record. Exactly once per game: repeated calls
    /// (terminal-state re-observation) return None, as do aborted games.
    pub fn take_finished(&mut self) -> Option<FinishedGame> {
        if !self.phase.is_terminal() || self.finalized || self.phase == GamePhase::Aborted {
            return None;
        }
        self.finalized = true;

        let (result_code, human_score, tag) = self.outcome_summary();
        let opponent_rating = engine_rating_for_level(self.difficulty);
        let rating_after = elo_update(
            self.human_rating,
            opponent_rating,
            human_score,
            DEFAULT_K_FACTOR,
        );

        Some(FinishedGame {
            move_text: format_move_text(&self.moves_san),
            result_code,
            human_color: color_str(self.human_color).to_string(),
            human_score,
            rating_before: self.human_rating,
            rating_after,
            opponent_level: self.difficulty,
            tags: vec![tag.to_string()],
        })
    }

    fn outcome_summary(&self) -> (String, f64, &'static str) {
        let human = self.human_color;
        match self.phase {
            GamePhase::Checkmate { winner } => (
                result_code_for_winner(winner),
                if winner == human { 1.0 } else { 0.0 },
                "checkmate",
            ),
            GamePhase::Draw => ("1/2-1/2".to_string(), 0.5, "draw"),
            GamePhase::Resigned => (
                result_code_for_winner(human.other()),
                0.0,
                "resignation",
            ),
            GamePhase::Timeout { loser } => (
                result_code_for_winner(loser.other()),
                if loser == human { 0.0 } else { 1.0 },
                "timeout",
            ),
            // Not reachable from take_finished.
            GamePhase::NotStarted | GamePhase::InProgress | GamePhase::Aborted => {
                ("*".to_string(), 0.0, "unfinished")
            }
        }
    }
}

fn result_code_for_winner(winner: Color) -> String {
    match winner {
        Color::White => "1-0".to_string(),
        Color::Black => "0-1".to_string(),
    }
}

fn color_str(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

/// `["e4", "e5", "Nf3"]` -> `"1. e4 e5 2. Nf3"`.
fn format_move_text(moves: &[String]) -> String {
    let mut out = String::new();
    for (i, san) in moves.iter().enumerate() {
        if i % 2 == 0 {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&format!("{}. {}", i / 2 + 1, san));
        } else {
            out.push_str(&format!(" {san}"));
        }
    }
    out
}
