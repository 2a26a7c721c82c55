//! Database queries for game fetching and review storage

use sqlx::PgPool;

use crate::error::ReviewError;
use crate::review::GameReview;

/// Game data needed for a review
#[derive(Debug)]
pub struct PendingGame {
    pub id: i64,
    pub move_text: String,
}

/// Fetch games that have never been reviewed, oldest first.
pub async fn fetch_pending_games(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<PendingGame>, ReviewError> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT id, move_text FROM user_games WHERE reviewed_at IS NULL ORDER BY id LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, move_text)| PendingGame { id, move_text })
        .collect())
}

/// Save a finished review and mark the game as reviewed.
pub async fn save_review(
    pool: &PgPool,
    game_id: i64,
    review: &GameReview,
) -> Result<(), ReviewError> {
    let items = serde_json::to_value(&review.items)?;

    sqlx::query(
        r#"INSERT INTO game_reviews (
            game_id, white_accuracy, black_accuracy,
            white_avg_cp_loss, black_avg_cp_loss, items
        ) VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (game_id) DO UPDATE SET
            white_accuracy = EXCLUDED.white_accuracy,
            black_accuracy = EXCLUDED.black_accuracy,
            white_avg_cp_loss = EXCLUDED.white_avg_cp_loss,
            black_avg_cp_loss = EXCLUDED.black_avg_cp_loss,
            items = EXCLUDED.items"#,
    )
    .bind(game_id)
    .bind(review.white_accuracy)
    .bind(review.black_accuracy)
    .bind(review.white_avg_cp_loss)
    .bind(review.black_avg_cp_loss)
    .bind(&items)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE user_games SET reviewed_at = NOW() WHERE id = $1")
        .bind(game_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Split numbered move text (`"1. e4 e5 2. Nf3"`) back into SAN moves.
pub fn parse_move_text(move_text: &str) -> Vec<String> {
    move_text
        .split_whitespace()
        .filter(|token| !token.ends_with('.'))
        .map(|token| token.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move_text() {
        assert_eq!(
            parse_move_text("1. e4 e5 2. Nf3 Nc6"),
            vec!["e4", "e5", "Nf3", "Nc6"]
        );
        assert_eq!(parse_move_text(""), Vec::<String>::new());
        assert_eq!(parse_move_text("1. f3 e5 2. g4 Qh4#"), vec!["f3", "e5", "g4", "Qh4#"]);
    }
}
