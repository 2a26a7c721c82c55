//! Review Worker
//!
//! Drains unreviewed games from the database, evaluates every position
//! through the durable cache, classifies each move, annotates the worst of
//! them, and writes the finished review back.

use std::sync::Arc;

use tracing::{error, info};

use game_session::book::OpeningBook;
use game_session::engine::UciEngine;

use review_worker::annotate::{annotate_selected, Annotator, HttpAnnotator};
use review_worker::cache::{EvalCache, PgKvStore};
use review_worker::config::ReviewConfig;
use review_worker::db::{self, PendingGame};
use review_worker::error::ReviewError;
use review_worker::evaluator::CachedEvaluator;
use review_worker::review::{review_game, ReviewOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let config = ReviewConfig::load()?;
    info!(
        engine_path = %config.engine_path,
        movetime_ms = config.search_movetime_ms,
        "Worker config loaded"
    );

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&config.database_url)
        .await?;

    let mut cache = EvalCache::new(Arc::new(PgKvStore::new(pool.clone())));
    let primed = cache.init().await;
    info!(primed, "Evaluation cache primed");

    let mut evaluator = CachedEvaluator::new(
        cache,
        config.engine_fingerprint.clone(),
        config.search_movetime_ms,
        config.min_info_depth,
    );

    let book = OpeningBook::load_or_builtin(&config.book_path);

    let annotator: Option<HttpAnnotator> = config
        .ai_endpoint
        .clone()
        .map(|endpoint| HttpAnnotator::new(endpoint, config.ai_api_key.clone()));

    let mut engine = UciEngine::spawn(&config.engine_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to start engine: {e}"))?;

    let opts = ReviewOptions {
        ai_threshold: config.ai_threshold,
        max_ai_items: config.max_ai_items,
    };

    let mut reviewed = 0u64;
    loop {
        let games = db::fetch_pending_games(&pool, config.batch_size).await?;
        if games.is_empty() {
            info!(reviewed, "No pending games, exiting");
            break;
        }

        for game in games {
            let game_id = game.id;
            match review_one(&mut engine, &mut evaluator, &book, &pool, &opts, annotator.as_ref(), game)
                .await
            {
                Ok(()) => {
                    reviewed += 1;
                    info!(game_id, "Review complete");
                }
                Err(e) => {
                    error!(game_id, error = %e, "Review failed");
                }
            }
        }
    }

    engine.quit().await;
    Ok(())
}

async fn review_one(
    engine: &mut UciEngine,
    evaluator: &mut CachedEvaluator,
    book: &OpeningBook,
    pool: &sqlx::PgPool,
    opts: &ReviewOptions,
    annotator: Option<&HttpAnnotator>,
    game: PendingGame,
) -> Result<(), ReviewError> {
    let moves = db::parse_move_text(&game.move_text);
    if moves.is_empty() {
        return Err(ReviewError::Review("game has no moves".into()));
    }
    info!(game_id = game.id, move_count = moves.len(), "Starting review");

    engine.new_game().await?;
    let evaluated = evaluator.evaluate_game(engine, &moves).await?;

    let book_plies: Vec<bool> = moves
        .iter()
        .enumerate()
        .map(|(i, san)| book.is_book_move(&evaluated.fens[i], san))
        .collect();

    let mut review = review_game(&moves, &evaluated.evals, &book_plies, opts);
    annotate_selected(
        &mut review,
        &evaluated.fens,
        &evaluated.evals,
        annotator.map(|a| a as &dyn Annotator),
    )
    .await;

    db::save_review(pool, game.id, &review).await?;
    Ok(())
}
