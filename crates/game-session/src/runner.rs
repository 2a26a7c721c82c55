//! Tokio wiring for a live game.
//!
//! The engine subprocess lives in its own task and serializes commands; the
//! main loop selects over user commands, the clock interval, book-delay
//! timers, and completed searches, feeding everything through the
//! orchestrator. One subprocess per game: a new game spawns a fresh engine
//! rather than trusting a position reset mid-process.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::SessionConfig;
use crate::engine::{EngineEvaluation, UciEngine};
use crate::error::SessionError;
use crate::game::{FinishedGame, LiveGame};
use crate::persist::GameStore;
use crate::session::{SessionAction, SessionEvent};

/// Commands from the UI side of the session.
#[derive(Debug)]
pub enum UserCommand {
    /// A move in SAN.
    Move(String),
    Resign,
    Abort,
    SetSkill(u8),
}

#[derive(Debug)]
enum EngineCmd {
    Search {
        generation: u64,
        fen: String,
        movetime_ms: u64,
    },
    SetSkill(u8),
    Quit,
}

#[derive(Debug)]
struct SearchDone {
    generation: u64,
    result: Result<EngineEvaluation, SessionError>,
}

#[derive(Debug)]
pub struct GameOutcome {
    /// None when the game was aborted.
    pub finished: Option<FinishedGame>,
    pub saved_game_id: Option<i64>,
}

/// Drive one game to completion. Returns when the game reaches a terminal
/// phase (or the command channel closes, which counts as an abort).
/// Persistence failures come back as the error; the caller keeps its own view
/// of the final position and may retry the save through the store directly.
pub async fn run_game(
    mut game: LiveGame,
    config: &SessionConfig,
    store: Option<&dyn GameStore>,
    user_id: i64,
    mut commands: mpsc::Receiver<UserCommand>,
) -> Result<GameOutcome, SessionError> {
    let mut engine = UciEngine::spawn(&config.engine_path).await?;
    engine.set_skill(config.skill_level).await?;

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<EngineCmd>(8);
    let (done_tx, mut done_rx) = mpsc::channel::<SearchDone>(8);
    let (timer_tx, mut timer_rx) = mpsc::channel::<u64>(8);

    let min_depth = config.min_info_depth;
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                EngineCmd::Search {
                    generation,
                    fen,
                    movetime_ms,
                } => {
                    let result = engine.search(&fen, movetime_ms, min_depth).await;
                    if done_tx.send(SearchDone { generation, result }).await.is_err() {
                        break;
                    }
                }
                EngineCmd::SetSkill(level) => {
                    if let Err(e) = engine.set_skill(level).await {
                        warn!(error = %e, "failed to forward skill change");
                    }
                }
                EngineCmd::Quit => break,
            }
        }
        engine.quit().await;
    });

    let mut interval = tokio::time::interval(config.clock_tick);

    let actions = game.begin();
    dispatch(actions, &cmd_tx, &timer_tx).await;

    loop {
        if game.phase().is_terminal() {
            break;
        }

        tokio::select! {
            maybe_cmd = commands.recv() => match maybe_cmd {
                Some(UserCommand::Move(san)) => {
                    let actions = game.play_human_move(&san, Instant::now());
                    dispatch(actions, &cmd_tx, &timer_tx).await;
                }
                Some(UserCommand::Resign) => {
                    dispatch(game.resign(), &cmd_tx, &timer_tx).await;
                }
                Some(UserCommand::Abort) => {
                    dispatch(game.abort(), &cmd_tx, &timer_tx).await;
                }
                Some(UserCommand::SetSkill(level)) => {
                    dispatch(game.set_difficulty(level), &cmd_tx, &timer_tx).await;
                }
                None => {
                    info!("command channel closed, aborting game");
                    dispatch(game.abort(), &cmd_tx, &timer_tx).await;
                }
            },

            _ = interval.tick() => {
                game.on_clock_tick(Instant::now());
            }

            Some(generation) = timer_rx.recv() => {
                apply_event(
                    &mut game,
                    SessionEvent::BookDelayElapsed { generation },
                    &cmd_tx,
                    &timer_tx,
                )
                .await;
            }

            Some(done) = done_rx.recv() => match done.result {
                Ok(eval) => {
                    apply_event(
                        &mut game,
                        SessionEvent::SearchFinished { generation: done.generation, eval },
                        &cmd_tx,
                        &timer_tx,
                    )
                    .await;
                }
                Err(e) => {
                    // No timeout-driven auto-resign: the thinking indicator
                    // stays up and an explicit user abort is the way out.
                    error!(error = %e, "engine unavailable, game cannot proceed on its turn");
                }
            },
        }
    }

    let _ = cmd_tx.send(EngineCmd::Quit).await;

    let mut outcome = GameOutcome {
        finished: None,
        saved_game_id: None,
    };
    if let Some(finished) = game.take_finished() {
        if let Some(store) = store {
            let game_id = store.save_finished_game(user_id, &finished).await?;
            store.update_rating(user_id, finished.rating_after).await?;
            info!(game_id, result = %finished.result_code, "game persisted");
            outcome.saved_game_id = Some(game_id);
        }
        outcome.finished = Some(finished);
    }
    Ok(outcome)
}

async fn apply_event(
    game: &mut LiveGame,
    event: SessionEvent,
    cmd_tx: &mpsc::Sender<EngineCmd>,
    timer_tx: &mpsc::Sender<u64>,
) {
    match game.handle_session_event(event, Instant::now()) {
        Ok(actions) => dispatch(actions, cmd_tx, timer_tx).await,
        Err(e) => error!(error = %e, "engine reply rejected"),
    }
}

async fn dispatch(
    actions: Vec<SessionAction>,
    cmd_tx: &mpsc::Sender<EngineCmd>,
    timer_tx: &mpsc::Sender<u64>,
) {
    for action in actions {
        match action {
            SessionAction::ScheduleBookDelay { generation, delay } => {
                let tx = timer_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(generation).await;
                });
            }
            SessionAction::IssueSearch {
                generation,
                fen,
                movetime_ms,
            } => {
                let _ = cmd_tx
                    .send(EngineCmd::Search {
                        generation,
                        fen,
                        movetime_ms,
                    })
                    .await;
            }
            SessionAction::ForwardSkill(level) => {
                let _ = cmd_tx.send(EngineCmd::SetSkill(level)).await;
            }
            // Replies are consumed inside the orchestrator and never escape.
            SessionAction::PlayReply(_) | SessionAction::None => {}
        }
    }
}
