//! Elo rating update for finished games.

pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Rating floor; nobody drops below this.
const RATING_FLOOR: f64 = 100.0;

/// Approximate playing strength per engine skill level (0-20). Anchor points
/// only; finer interpolation would be false precision for matchmaking.
pub fn engine_rating_for_level(level: u8) -> u32 {
    match level {
        0..=1 => 800,
        2..=3 => 1000,
        4..=5 => 1200,
        6..=7 => 1400,
        8..=9 => 1600,
        10..=11 => 1800,
        12..=13 => 2000,
        14..=15 => 2200,
        16..=17 => 2400,
        18..=19 => 2600,
        _ => 2850,
    }
}

pub fn expected_score(player: u32, opponent: u32) -> f64 {
    1.0 / (1.0 + 10f64.powf((f64::from(opponent) - f64::from(player)) / 400.0))
}

/// Standard Elo update. `score` is 1.0 / 0.5 / 0.0 from the player's
/// perspective.
pub fn elo_update(player: u32, opponent: u32, score: f64, k: f64) -> u32 {
    let delta = k * (score - expected_score(player, opponent));
    (f64::from(player) + delta).round().max(RATING_FLOOR) as u32
}
