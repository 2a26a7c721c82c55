//! Persistence contracts for finished games and ratings.
//!
//! The store is an external collaborator: the session core only knows these
//! traits. Failures here are surfaced to the caller — losing a finished
//! game's record is user-visible — while the in-memory game state stays
//! intact so the save can be retried.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::SessionError;
use crate::game::FinishedGame;

#[async_trait]
pub trait GameStore: Send + Sync {
    /// Save a finished game, returning the generated id used to link the
    /// post-hoc review.
    async fn save_finished_game(
        &self,
        user_id: i64,
        game: &FinishedGame,
    ) -> Result<i64, SessionError>;

    async fn update_rating(&self, user_id: i64, new_rating: u32) -> Result<(), SessionError>;
}

pub struct PgGameStore {
    pool: PgPool,
}

impl PgGameStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GameStore for PgGameStore {
    async fn save_finished_game(
        &self,
        user_id: i64,
        game: &FinishedGame,
    ) -> Result<i64, SessionError> {
        let tags = serde_json::to_value(&game.tags)?;
        let row: (i64,) = sqlx::query_as(
            r#"INSERT INTO user_games (
                user_id, move_text, result_code, user_color, user_score,
                rating_before, rating_after, opponent_level, tags
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id"#,
        )
        .bind(user_id)
        .bind(&game.move_text)
        .bind(&game.result_code)
        .bind(&game.human_color)
        .bind(game.human_score)
        .bind(game.rating_before as i32)
        .bind(game.rating_after as i32)
        .bind(game.opponent_level as i32)
        .bind(&tags)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn update_rating(&self, user_id: i64, new_rating: u32) -> Result<(), SessionError> {
        sqlx::query("UPDATE users SET rating = $2 WHERE id = $1")
            .bind(user_id)
            .bind(new_rating as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
