//! Engine-decision state machine.
//!
//! One decision may be in flight per game at any time. Every async step
//! (book delay, subprocess search) carries the generation current when it was
//! scheduled; resolutions from a previous generation are discarded, which is
//! how aborted games and restarts are kept from mutating a session that has
//! moved on. All state changes go through [`EngineSession::handle`].

use std::time::Duration;

use tracing::debug;

use crate::book::{self, OpeningBook};
use crate::engine::EngineEvaluation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Not the engine's turn, or the reply was already delivered.
    Idle,
    /// Turn noticed, book-or-search not yet chosen.
    AwaitingBookDecision,
    /// Humanized delay running before the book is consulted.
    BookDelayPending { generation: u64 },
    /// Search issued to the subprocess, bestmove not yet seen.
    SearchPending { generation: u64 },
    /// Reply produced but not yet applied by the orchestrator.
    MoveReady,
}

/// Inputs to the transition function.
#[derive(Debug)]
pub enum SessionEvent {
    /// It became the engine's turn. Clock figures must be post-increment.
    EngineTurn {
        fen: String,
        fullmove: u32,
        remaining_ms: u64,
        increment_ms: u64,
    },
    BookDelayElapsed { generation: u64 },
    SearchFinished {
        generation: u64,
        eval: EngineEvaluation,
    },
    SkillChanged(u8),
    /// Game reset or abandoned; whatever is pending must not apply.
    Cancel,
}

/// What the caller should do next. The state machine performs no I/O itself.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    None,
    ScheduleBookDelay { generation: u64, delay: Duration },
    IssueSearch {
        generation: u64,
        fen: String,
        movetime_ms: u64,
    },
    PlayReply(EngineReply),
    ForwardSkill(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Book,
    Search,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineReply {
    /// SAN for book replies, UCI for search replies.
    pub mv: String,
    pub source: ReplySource,
    pub eval: Option<EngineEvaluation>,
}

#[derive(Debug)]
pub struct EngineSession {
    state: SessionState,
    generation: u64,
    out_of_book: bool,
    pending_fen: Option<String>,
    book: OpeningBook,
    movetime_ms: u64,
}

impl EngineSession {
    pub fn new(book: OpeningBook, movetime_ms: u64) -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
            out_of_book: false,
            pending_fen: None,
            book,
            movetime_ms,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether a decision is currently in flight (drives the "engine is
    /// thinking" indicator).
    pub fn is_thinking(&self) -> bool {
        matches!(
            self.state,
            SessionState::AwaitingBookDecision
                | SessionState::BookDelayPending { .. }
                | SessionState::SearchPending { .. }
        )
    }

    pub fn is_out_of_book(&self) -> bool {
        self.out_of_book
    }

    pub fn book(&self) -> &OpeningBook {
        &self.book
    }

    /// The one authoritative transition function.
    pub fn handle(&mut self, event: SessionEvent) -> SessionAction {
        match event {
            SessionEvent::EngineTurn {
                fen,
                fullmove,
                remaining_ms,
                increment_ms,
            } => {
                if self.state != SessionState::Idle {
                    // The same turn transition gets re-triggered by incidental
                    // re-observations of the game state; one decision in
                    // flight is the invariant, so drop it.
                    debug!(state = ?self.state, "duplicate engine-turn notification ignored");
                    return SessionAction::None;
                }
                self.state = SessionState::AwaitingBookDecision;
                self.pending_fen = Some(fen.clone());
                if self.out_of_book {
                    self.begin_search(fen)
                } else {
                    let generation = self.generation;
                    self.state = SessionState::BookDelayPending { generation };
                    SessionAction::ScheduleBookDelay {
                        generation,
                        delay: book::book_move_delay(remaining_ms, increment_ms, fullmove),
                    }
                }
            }

            SessionEvent::BookDelayElapsed { generation } => {
                if generation != self.generation
                    || !matches!(self.state, SessionState::BookDelayPending { .. })
                {
                    debug!(generation, "stale book delay discarded");
                    return SessionAction::None;
                }
                let fen = self.pending_fen.clone().unwrap_or_default();
                match self.book.reply_for(&fen) {
                    Some(san) => {
                        self.state = SessionState::MoveReady;
                        SessionAction::PlayReply(EngineReply {
                            mv: san,
                            source: ReplySource::Book,
                            eval: None,
                        })
                    }
                    None => {
                        // Out of book is one-way for the rest of the game.
                        self.out_of_book = true;
                        self.begin_search(fen)
                    }
                }
            }

            SessionEvent::SearchFinished { generation, eval } => {
                if generation != self.generation
                    || !matches!(self.state, SessionState::SearchPending { .. })
                {
                    debug!(generation, "stale search result discarded");
                    return SessionAction::None;
                }
                self.state = SessionState::MoveReady;
                SessionAction::PlayReply(EngineReply {
                    mv: eval.best_move.clone(),
                    source: ReplySource::Search,
                    eval: Some(eval),
                })
            }

            // Forwarded regardless of state; an in-flight search is not
            // interrupted.
            SessionEvent::SkillChanged(level) => SessionAction::ForwardSkill(level),

            SessionEvent::Cancel => {
                self.generation += 1;
                self.state = SessionState::Idle;
                self.pending_fen = None;
                SessionAction::None
            }
        }
    }

    /// Acknowledge that a `PlayReply` was applied to the board.
    pub fn reply_taken(&mut self) {
        if self.state == SessionState::MoveReady {
            self.state = SessionState::Idle;
        }
    }

    /// Reset for a new game: fresh generation, back in book.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = SessionState::Idle;
        self.pending_fen = None;
        self.out_of_book = false;
    }

    fn begin_search(&mut self, fen: String) -> SessionAction {
        let generation = self.generation;
        self.state = SessionState::SearchPending { generation };
        SessionAction::IssueSearch {
            generation,
            fen,
            movetime_ms: self.movetime_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn turn_event(fen: &str) -> SessionEvent {
        SessionEvent::EngineTurn {
            fen: fen.to_string(),
            fullmove: 1,
            remaining_ms: 60_000,
            increment_ms: 0,
        }
    }

    fn search_eval(best: &str) -> EngineEvaluation {
        EngineEvaluation {
            evaluation: 20,
            best_move: best.to_string(),
            principal_variation: vec![best.to_string()],
            depth: 12,
            calculation_time_ms: 1000,
        }
    }

    #[test]
    fn test_turn_schedules_book_delay_while_in_book() {
        let mut session = EngineSession::new(OpeningBook::builtin(), 1000);
        match session.handle(turn_event(START_FEN)) {
            SessionAction::ScheduleBookDelay { generation, .. } => assert_eq!(generation, 0),
            other => panic!("expected book delay, got {other:?}"),
        }
        assert!(session.is_thinking());
    }

    #[test]
    fn test_duplicate_turn_notification_ignored() {
        let mut session = EngineSession::new(OpeningBook::builtin(), 1000);
        session.handle(turn_event(START_FEN));
        assert_eq!(session.handle(turn_event(START_FEN)), SessionAction::None);
    }

    #[test]
    fn test_book_hit_plays_reply() {
        let mut session = EngineSession::new(OpeningBook::builtin(), 1000);
        session.handle(turn_event(START_FEN));
        match session.handle(SessionEvent::BookDelayElapsed { generation: 0 }) {
            SessionAction::PlayReply(reply) => {
                assert_eq!(reply.source, ReplySource::Book);
                assert!(reply.eval.is_none());
            }
            other => panic!("expected reply, got {other:?}"),
        }
        assert_eq!(*session.state(), SessionState::MoveReady);
        session.reply_taken();
        assert_eq!(*session.state(), SessionState::Idle);
    }

    #[test]
    fn test_book_miss_latches_out_of_book_and_searches() {
        let out_of_book_fen = "r2q1rk1/ppp2ppp/2np1n2/2b1p3/2B1P3/2NP1N2/PPP2PPP/R1BQ1RK1 w - - 4 7";
        let mut session = EngineSession::new(OpeningBook::builtin(), 1000);
        session.handle(turn_event(out_of_book_fen));
        match session.handle(SessionEvent::BookDelayElapsed { generation: 0 }) {
            SessionAction::IssueSearch { fen, movetime_ms, .. } => {
                assert_eq!(fen, out_of_book_fen);
                assert_eq!(movetime_ms, 1000);
            }
            other => panic!("expected search, got {other:?}"),
        }
        assert!(session.is_out_of_book());

        // Subsequent turns skip the book entirely.
        session.handle(SessionEvent::Cancel);
        match session.handle(turn_event(START_FEN)) {
            SessionAction::IssueSearch { .. } => {}
            other => panic!("expected search after going out of book, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_book_delay_discarded_after_cancel() {
        let mut session = EngineSession::new(OpeningBook::builtin(), 1000);
        session.handle(turn_event(START_FEN));
        session.handle(SessionEvent::Cancel);
        assert_eq!(
            session.handle(SessionEvent::BookDelayElapsed { generation: 0 }),
            SessionAction::None
        );
        assert_eq!(*session.state(), SessionState::Idle);
    }

    #[test]
    fn test_stale_search_result_discarded_after_cancel() {
        let fen = "r2q1rk1/ppp2ppp/2np1n2/2b1p3/2B1P3/2NP1N2/PPP2PPP/R1BQ1RK1 w - - 4 7";
        let mut session = EngineSession::new(OpeningBook::builtin(), 1000);
        session.handle(turn_event(fen));
        session.handle(SessionEvent::BookDelayElapsed { generation: 0 });
        session.handle(SessionEvent::Cancel);
        assert_eq!(
            session.handle(SessionEvent::SearchFinished {
                generation: 0,
                eval: search_eval("e2e4"),
            }),
            SessionAction::None
        );
    }

    #[test]
    fn test_search_finished_plays_reply() {
        let fen = "r2q1rk1/ppp2ppp/2np1n2/2b1p3/2B1P3/2NP1N2/PPP2PPP/R1BQ1RK1 w - - 4 7";
        let mut session = EngineSession::new(OpeningBook::builtin(), 1000);
        session.handle(turn_event(fen));
        session.handle(SessionEvent::BookDelayElapsed { generation: 0 });
        match session.handle(SessionEvent::SearchFinished {
            generation: 0,
            eval: search_eval("d3d4"),
        }) {
            SessionAction::PlayReply(reply) => {
                assert_eq!(reply.mv, "d3d4");
                assert_eq!(reply.source, ReplySource::Search);
                assert!(reply.eval.is_some());
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn test_skill_change_forwards_in_any_state() {
        let mut session = EngineSession::new(OpeningBook::builtin(), 1000);
        assert_eq!(
            session.handle(SessionEvent::SkillChanged(7)),
            SessionAction::ForwardSkill(7)
        );
        session.handle(turn_event(START_FEN));
        assert_eq!(
            session.handle(SessionEvent::SkillChanged(12)),
            SessionAction::ForwardSkill(12)
        );
    }

    #[test]
    fn test_reset_rejoins_book() {
        let fen = "r2q1rk1/ppp2ppp/2np1n2/2b1p3/2B1P3/2NP1N2/PPP2PPP/R1BQ1RK1 w - - 4 7";
        let mut session = EngineSession::new(OpeningBook::builtin(), 1000);
        session.handle(turn_event(fen));
        session.handle(SessionEvent::BookDelayElapsed { generation: 0 });
        assert!(session.is_out_of_book());
        session.reset();
        assert!(!session.is_out_of_book());
        match session.handle(turn_event(START_FEN)) {
            SessionAction::ScheduleBookDelay { generation, .. } => assert_eq!(generation, 1),
            other => panic!("expected book delay after reset, got {other:?}"),
        }
    }
}
