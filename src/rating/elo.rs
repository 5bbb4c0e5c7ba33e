//! Elo rating deltas for team matches
//!
//! Every participant is rated with their own rating against the *average* of
//! the opposing team. Because each side is measured against the other side's
//! average rather than a paired opponent, the deltas of a match are not
//! guaranteed to sum to zero.

use crate::types::{Team, Winner};
use serde::{Deserialize, Serialize};
use skillratings::elo::{expected_score, EloRating};

/// Default Elo K-factor
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Match outcome from the perspective of one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl Outcome {
    /// Actual score used by the Elo update
    pub fn score(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Loss => 0.0,
        }
    }

    /// Outcome for a member of `team` given the approved winner
    pub fn for_team(winner: Winner, team: Team) -> Self {
        match winner {
            Winner::Draw => Outcome::Draw,
            Winner::Team(t) if t == team => Outcome::Win,
            Winner::Team(_) => Outcome::Loss,
        }
    }
}

/// Probability that `player_rating` beats `opponent_rating`
pub fn expected(player_rating: f64, opponent_rating: f64) -> f64 {
    let (player, _) = expected_score(
        &EloRating {
            rating: player_rating,
        },
        &EloRating {
            rating: opponent_rating,
        },
    );
    player
}

/// `round(k * (actual - expected))` for one participant
pub fn compute_delta(
    player_rating: f64,
    opponent_avg_rating: f64,
    actual_score: f64,
    k_factor: f64,
) -> i32 {
    let expected = expected(player_rating, opponent_avg_rating);
    (k_factor * (actual_score - expected)).round() as i32
}

/// Elo engine bound to a configured K-factor
#[derive(Debug, Clone, Copy)]
pub struct EloEngine {
    k_factor: f64,
}

impl EloEngine {
    pub fn new(k_factor: f64) -> Self {
        Self { k_factor }
    }

    pub fn k_factor(&self) -> f64 {
        self.k_factor
    }

    /// Delta for a participant rated `player_rating` facing a team averaging `opponent_avg`
    pub fn delta(&self, player_rating: i32, opponent_avg: f64, outcome: Outcome) -> i32 {
        compute_delta(
            player_rating as f64,
            opponent_avg,
            outcome.score(),
            self.k_factor,
        )
    }
}

impl Default for EloEngine {
    fn default() -> Self {
        Self::new(DEFAULT_K_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_even_match_deltas() {
        assert_eq!(compute_delta(1000.0, 1000.0, 1.0, 32.0), 16);
        assert_eq!(compute_delta(1000.0, 1000.0, 0.0, 32.0), -16);
        assert_eq!(compute_delta(1000.0, 1000.0, 0.5, 32.0), 0);
    }

    #[test]
    fn test_favourite_gains_less_than_underdog() {
        let favourite = compute_delta(1200.0, 1000.0, 1.0, 32.0);
        let underdog = compute_delta(1000.0, 1200.0, 1.0, 32.0);
        assert!(favourite < underdog);
        assert_eq!(favourite, 8);
        assert_eq!(underdog, 24);
    }

    #[test]
    fn test_expected_score_is_symmetric() {
        let e = expected(1400.0, 1600.0);
        assert!((e + expected(1600.0, 1400.0) - 1.0).abs() < 1e-9);
        assert!(e < 0.5);
    }

    #[test]
    fn test_outcome_for_team() {
        let winner = Winner::Team(Team::One);
        assert_eq!(Outcome::for_team(winner, Team::One), Outcome::Win);
        assert_eq!(Outcome::for_team(winner, Team::Two), Outcome::Loss);
        assert_eq!(Outcome::for_team(Winner::Draw, Team::Two), Outcome::Draw);
    }

    #[test]
    fn test_engine_uses_configured_k_factor() {
        let engine = EloEngine::new(16.0);
        assert_eq!(engine.delta(1500, 1500.0, Outcome::Win), 8);
        assert_eq!(EloEngine::default().delta(1500, 1500.0, Outcome::Loss), -16);
    }

    #[test]
    fn test_team_deltas_need_not_sum_to_zero() {
        // 2v2: team one (1000, 1400) avg 1200 beats team two (1100, 1100) avg 1100
        let engine = EloEngine::default();
        let team_one: i32 = [1000, 1400]
            .iter()
            .map(|&r| engine.delta(r, 1100.0, Outcome::Win))
            .sum();
        let team_two: i32 = [1100, 1100]
            .iter()
            .map(|&r| engine.delta(r, 1200.0, Outcome::Loss))
            .sum();
        assert_eq!(team_one, 25);
        assert_eq!(team_two, -24);
    }

    proptest! {
        #[test]
        fn prop_delta_bounded_by_k(player in 0i32..4000, opponent in 0i32..4000) {
            for outcome in [Outcome::Win, Outcome::Loss, Outcome::Draw] {
                let delta = EloEngine::default().delta(player, opponent as f64, outcome);
                prop_assert!(delta.abs() <= 32);
            }
        }

        #[test]
        fn prop_win_never_loses_rating(player in 0i32..4000, opponent in 0i32..4000) {
            let engine = EloEngine::default();
            prop_assert!(engine.delta(player, opponent as f64, Outcome::Win) >= 0);
            prop_assert!(engine.delta(player, opponent as f64, Outcome::Loss) <= 0);
        }

        #[test]
        fn prop_stronger_opponent_pays_more(player in 500i32..2500, gap in 1i32..800) {
            let engine = EloEngine::default();
            let weak = engine.delta(player, (player - gap) as f64, Outcome::Win);
            let strong = engine.delta(player, (player + gap) as f64, Outcome::Win);
            prop_assert!(strong >= weak);
        }
    }
}
