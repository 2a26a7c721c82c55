//! Integration tests: live-game orchestration with scripted session events.
//! The engine subprocess is replaced by fabricated search results; the book,
//! clock, session state machine, and orchestrator are all real.

use std::time::{Duration, Instant};

use game_session::book::OpeningBook;
use game_session::clock::GameClock;
use game_session::engine::EngineEvaluation;
use game_session::game::{GamePhase, LiveGame};
use game_session::session::{EngineSession, SessionAction, SessionEvent};
use shakmaty::Color;

fn new_game(human: Color) -> LiveGame {
    let clock = GameClock::new(Duration::from_millis(60_000), Duration::from_millis(20_000));
    let session = EngineSession::new(OpeningBook::builtin(), 1000);
    LiveGame::new(human, 8, 1500, clock, session)
}

fn search_eval(best: &str, cp: i32) -> EngineEvaluation {
    EngineEvaluation {
        evaluation: cp,
        best_move: best.to_string(),
        principal_variation: vec![best.to_string()],
        depth: 12,
        calculation_time_ms: 950,
    }
}

#[test]
fn test_book_reply_is_always_legal() {
    // 1. e4 keeps the engine in book: the delayed book lookup must produce a
    // move the oracle accepts against the position it was computed for.
    let now = Instant::now();
    let mut game = new_game(Color::White);
    game.begin();

    let actions = game.play_human_move("e4", now);
    let generation = match actions.as_slice() {
        [SessionAction::ScheduleBookDelay { generation, .. }] => *generation,
        other => panic!("expected a book delay, got {other:?}"),
    };

    game.handle_session_event(SessionEvent::BookDelayElapsed { generation }, now)
        .expect("book reply must apply cleanly");

    assert_eq!(game.moves().len(), 2);
    assert_eq!(game.phase(), GamePhase::InProgress);
    assert!(!game.is_engine_thinking());
}

#[test]
fn test_increment_credited_once_per_move() {
    let now = Instant::now();
    let mut game = new_game(Color::White);
    game.begin();
    game.play_human_move("e4", now);

    // 60000 base + one 20000 increment. A double credit would read 100000.
    assert_eq!(game.clock().remaining_ms(Color::White), 80_000);
    // The engine side has not moved and gets nothing.
    assert_eq!(game.clock().remaining_ms(Color::Black), 60_000);
}

#[test]
fn test_search_reply_applies_and_credits_engine() {
    let now = Instant::now();
    let mut game = new_game(Color::White);
    game.begin();

    // 1. a4 leaves book immediately.
    game.play_human_move("a4", now);
    game.handle_session_event(SessionEvent::BookDelayElapsed { generation: 0 }, now)
        .unwrap();
    game.handle_session_event(
        SessionEvent::SearchFinished {
            generation: 0,
            eval: search_eval("e7e5", -30),
        },
        now,
    )
    .unwrap();

    assert_eq!(game.moves(), &["a4", "e5"]);
    assert_eq!(game.clock().remaining_ms(Color::Black), 80_000);
}

#[test]
fn test_stale_search_after_new_game_reset_is_discarded() {
    let now = Instant::now();
    let mut game = new_game(Color::White);
    game.begin();
    game.play_human_move("a4", now);
    game.handle_session_event(SessionEvent::BookDelayElapsed { generation: 0 }, now)
        .unwrap();

    // The user abandons the game while the engine is searching.
    game.abort();
    assert_eq!(game.phase(), GamePhase::Aborted);

    // The search resolves afterwards; its result must not mutate anything.
    game.handle_session_event(
        SessionEvent::SearchFinished {
            generation: 0,
            eval: search_eval("e7e5", -30),
        },
        now,
    )
    .unwrap();
    assert_eq!(game.moves(), &["a4"]);
    assert!(game.take_finished().is_none());
}

#[test]
fn test_timeout_loses_to_checkmate_found_same_instant() {
    // Mate is applied and checked before any tick fires: once the game is
    // terminal, a simultaneous flag changes nothing.
    let now = Instant::now();
    let mut game = new_game(Color::White);
    game.begin();

    game.play_human_move("f3", now);
    game.handle_session_event(SessionEvent::BookDelayElapsed { generation: 0 }, now)
        .unwrap();
    game.handle_session_event(
        SessionEvent::SearchFinished {
            generation: 0,
            eval: search_eval("e7e5", -150),
        },
        now,
    )
    .unwrap();
    game.play_human_move("g4", now);
    game.handle_session_event(
        SessionEvent::SearchFinished {
            generation: 0,
            eval: search_eval("d8h4", -5002),
        },
        now,
    )
    .unwrap();

    assert_eq!(
        game.phase(),
        GamePhase::Checkmate {
            winner: Color::Black
        }
    );
    // A very late tick after the mate is a no-op.
    game.on_clock_tick(now + Duration::from_secs(3600));
    assert_eq!(
        game.phase(),
        GamePhase::Checkmate {
            winner: Color::Black
        }
    );
}

#[test]
fn test_flag_produces_timeout_result() {
    let now = Instant::now();
    let mut game = new_game(Color::White);
    game.begin();
    game.play_human_move("e4", now);

    // The engine never answers; its clock runs out.
    game.on_clock_tick(now + Duration::from_millis(80_001));
    assert_eq!(
        game.phase(),
        GamePhase::Timeout {
            loser: Color::Black
        }
    );

    let finished = game.take_finished().expect("timeout games persist");
    assert_eq!(finished.result_code, "1-0");
    assert_eq!(finished.human_score, 1.0);
    assert!(finished.rating_after > finished.rating_before);
    assert_eq!(finished.tags, vec!["timeout".to_string()]);

    // Exactly-once: the re-observed terminal state persists nothing more.
    assert!(game.take_finished().is_none());
}

#[test]
fn test_resignation_persists_abort_does_not() {
    let now = Instant::now();

    let mut resigned = new_game(Color::White);
    resigned.begin();
    resigned.play_human_move("e4", now);
    resigned.resign();
    let finished = resigned.take_finished().expect("resignation persists");
    assert_eq!(finished.result_code, "0-1");
    assert_eq!(finished.human_score, 0.0);
    assert_eq!(finished.tags, vec!["resignation".to_string()]);

    let mut aborted = new_game(Color::White);
    aborted.begin();
    aborted.play_human_move("e4", now);
    aborted.abort();
    assert!(aborted.take_finished().is_none());
}

#[test]
fn test_duplicate_turn_observation_spawns_no_second_decision() {
    let now = Instant::now();
    let mut game = new_game(Color::Black);

    // Engine (White) to move: begin() schedules exactly one decision.
    let first = game.begin();
    assert_eq!(first.len(), 1);

    // A re-render of the same state must not queue another one; the human
    // can't move and the session is already busy.
    assert!(game.play_human_move("e5", now).is_empty());
    assert!(game.is_engine_thinking());
}
