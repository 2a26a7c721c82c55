/// Move-quality metrics — pure functions only
/// (No Board/Cache/Engine dependencies)

use serde::{Deserialize, Serialize};

/// Win-chance curve steepness, in 1/centipawns.
pub const WIN_CHANCE_COEFF: f64 = 0.003_682_08;

/// WPL classification thresholds (>= semantics: a value exactly at a
/// threshold lands in that tier).
pub const WPL_INACCURACY: f64 = 0.09;
pub const WPL_MISTAKE: f64 = 0.18;
pub const WPL_BLUNDER: f64 = 0.45;

/// Legacy centipawn-loss thresholds, retained for data persisted before the
/// WPL classifier became the source of truth.
const CP_INACCURACY: i32 = 100;
const CP_MISTAKE: i32 = 200;
const CP_BLUNDER: i32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::None => "none",
            Severity::Inaccuracy => "inaccuracy",
            Severity::Mistake => "mistake",
            Severity::Blunder => "blunder",
        };
        write!(f, "{s}")
    }
}

/// White's winning chances in (-1, 1). Odd, monotonic, saturating; zero at a
/// level position. Not a probability — the sign carries the side.
pub fn win_chance(cp: i32) -> f64 {
    2.0 / (1.0 + (-WIN_CHANCE_COEFF * f64::from(cp)).exp()) - 1.0
}

/// How much the mover worsened White's evaluation from their own
/// perspective. Never negative; zero when the move held or improved it.
pub fn centipawn_change(pre: i32, post: i32, is_white_move: bool) -> i32 {
    if is_white_move {
        (pre - post).max(0)
    } else {
        (post - pre).max(0)
    }
}

/// The same loss measured in winning-chances space.
pub fn win_probability_loss(pre: i32, post: i32, is_white_move: bool) -> f64 {
    if is_white_move {
        (win_chance(pre) - win_chance(post)).max(0.0)
    } else {
        (win_chance(post) - win_chance(pre)).max(0.0)
    }
}

pub fn classify_wpl(wpl: f64) -> Severity {
    if wpl >= WPL_BLUNDER {
        Severity::Blunder
    } else if wpl >= WPL_MISTAKE {
        Severity::Mistake
    } else if wpl >= WPL_INACCURACY {
        Severity::Inaccuracy
    } else {
        Severity::None
    }
}

/// Legacy classifier over raw centipawn loss.
pub fn classify_cp(cp_loss: i32) -> Severity {
    if cp_loss >= CP_BLUNDER {
        Severity::Blunder
    } else if cp_loss >= CP_MISTAKE {
        Severity::Mistake
    } else if cp_loss >= CP_INACCURACY {
        Severity::Inaccuracy
    } else {
        Severity::None
    }
}

/// Per-side accuracy from accumulated centipawn loss.
pub fn accuracy(total_cp_loss: i32, move_count: u32) -> f64 {
    if move_count == 0 {
        return 100.0;
    }
    let acpl = f64::from(total_cp_loss) / f64::from(move_count);
    let acc = 100.0 * (1.0 / (1.0 + acpl / 100.0)).sqrt();
    acc.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_chance_zero_odd_bounded() {
        assert_eq!(win_chance(0), 0.0);
        for cp in [-2000, -500, -100, -1, 1, 100, 500, 2000, 6000] {
            assert!((win_chance(cp) + win_chance(-cp)).abs() < 1e-12);
            assert!(win_chance(cp).abs() < 1.0);
        }
    }

    #[test]
    fn test_win_chance_strictly_increasing() {
        let mut prev = win_chance(-6000);
        for cp in (-5999..=6000).step_by(37) {
            let w = win_chance(cp);
            assert!(w > prev, "win_chance not increasing at cp={cp}");
            prev = w;
        }
    }

    #[test]
    fn test_losses_never_negative() {
        for &(pre, post) in &[(0, 100), (100, 0), (-300, 250), (250, -300), (0, 0)] {
            for &white in &[true, false] {
                assert!(centipawn_change(pre, post, white) >= 0);
                assert!(win_probability_loss(pre, post, white) >= 0.0);
            }
        }
    }

    #[test]
    fn test_centipawn_change_perspective() {
        // White dropping from +100 to +80 lost 20; Black "losing" the same
        // ground gained it.
        assert_eq!(centipawn_change(100, 80, true), 20);
        assert_eq!(centipawn_change(100, 80, false), 0);
        assert_eq!(centipawn_change(100, 120, false), 20);
    }

    #[test]
    fn test_classify_wpl_boundaries_go_up() {
        assert_eq!(classify_wpl(0.0), Severity::None);
        assert_eq!(classify_wpl(0.089), Severity::None);
        assert_eq!(classify_wpl(0.09), Severity::Inaccuracy);
        assert_eq!(classify_wpl(0.18), Severity::Mistake);
        assert_eq!(classify_wpl(0.45), Severity::Blunder);
        assert_eq!(classify_wpl(1.9), Severity::Blunder);
    }

    #[test]
    fn test_classify_wpl_monotonic() {
        let mut prev = Severity::None;
        for i in 0..100 {
            let sev = classify_wpl(f64::from(i) * 0.02);
            assert!(sev >= prev);
            prev = sev;
        }
    }

    #[test]
    fn test_classify_cp_legacy() {
        assert_eq!(classify_cp(99), Severity::None);
        assert_eq!(classify_cp(100), Severity::Inaccuracy);
        assert_eq!(classify_cp(200), Severity::Mistake);
        assert_eq!(classify_cp(500), Severity::Blunder);
    }

    #[test]
    fn test_accuracy() {
        assert!((accuracy(0, 20) - 100.0).abs() < 0.1);
        assert!(accuracy(2000, 20) < accuracy(500, 20));
        assert_eq!(accuracy(0, 0), 100.0);
    }
}
