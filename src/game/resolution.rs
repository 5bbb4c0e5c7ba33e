//! Match resolution: applying approved results to ratings, and voiding
//!
//! Approval writes every participant's rating change as one atomic unit keyed
//! by match id, then finishes the match. If the process stops between the two
//! steps, approving again finds the existing history rows and reuses them, so
//! ratings never move twice for the same match.

use crate::error::{MatchmakingError, Result};
use crate::game::instance::{Match, MatchStatus};
use crate::game::store::MatchStore;
use crate::metrics::MetricsCollector;
use crate::rating::{EloEngine, Outcome, RatingHistoryEntry, RatingStorage, RatingUpdate};
use crate::types::{MatchId, Team, UserId, Winner};
use crate::utils::average_rating;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// What voiding did to ratings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VoidOutcome {
    /// No rating change had been applied
    NothingToRevert,
    /// Rating changes were undone for this many players
    Reverted { players: usize },
    /// The match had finished but left no history, so ratings were not touched
    ReversalUnavailable,
}

impl VoidOutcome {
    pub fn reverted(&self) -> bool {
        matches!(self, VoidOutcome::Reverted { .. })
    }
}

/// Applies approved results and voids matches
pub struct MatchResolver {
    matches: Arc<dyn MatchStore>,
    ratings: Arc<dyn RatingStorage>,
    engine: EloEngine,
    metrics: Arc<MetricsCollector>,
}

impl MatchResolver {
    pub fn new(
        matches: Arc<dyn MatchStore>,
        ratings: Arc<dyn RatingStorage>,
        engine: EloEngine,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            matches,
            ratings,
            engine,
            metrics,
        }
    }

    /// Compute every participant's rating update for a result.
    ///
    /// Each player is rated with their own rating against the opposing team's
    /// average.
    pub fn compute_updates(&self, game: &Match, winner: Winner) -> Result<Vec<RatingUpdate>> {
        let player_ids = game.player_ids();
        let stored = self.ratings.get_ratings(&player_ids, &game.game_id)?;
        let initial = self.ratings.initial_rating();
        let rating_of = |user_id: &str| stored.get(user_id).map_or(initial, |r| r.rating);

        let team_average = |team: Team| {
            let ratings: Vec<i32> = game
                .team(team)
                .iter()
                .map(|user_id| rating_of(user_id.as_str()))
                .collect();
            average_rating(&ratings)
        };
        let averages = [
            (Team::One, team_average(Team::One)),
            (Team::Two, team_average(Team::Two)),
        ];

        let updates = game
            .players
            .iter()
            .map(|player| {
                let opponent_avg = averages
                    .iter()
                    .find(|(team, _)| *team == player.team.opponent())
                    .map_or(0.0, |(_, avg)| *avg);
                let outcome = Outcome::for_team(winner, player.team);
                RatingUpdate {
                    user_id: player.user_id.clone(),
                    outcome,
                    change: self
                        .engine
                        .delta(rating_of(player.user_id.as_str()), opponent_avg, outcome),
                }
            })
            .collect();

        Ok(updates)
    }

    /// Approve a result: apply rating changes, then finish the match.
    ///
    /// Returns each participant's rating change. If the match is voided while
    /// the ratings are being written, the changes are reverted and the
    /// approval fails with `AlreadyVoided`.
    pub fn approve(&self, match_id: MatchId, winner: Winner) -> Result<HashMap<UserId, i32>> {
        let timer = self.metrics.start_timer();

        let game = self
            .matches
            .get(match_id)?
            .ok_or_else(|| MatchmakingError::match_not_found(match_id))?;

        if !game.status.is_open() {
            return Err(MatchmakingError::AlreadyFinished { match_id });
        }

        let updates = self.compute_updates(&game, winner)?;
        let applied = self
            .ratings
            .apply_match(match_id, &game.game_id, &updates)?;

        // History already decided the result; the match must agree with it
        let winner = if applied.newly_applied {
            winner
        } else {
            let recorded = recorded_winner(&game, &applied.entries).unwrap_or(winner);
            warn!(
                "Ratings for match {} were already applied ({:?}), reusing history",
                match_id, recorded
            );
            recorded
        };

        if let Err(e) = self.matches.finish(match_id, winner) {
            if self.revert_if_voided(match_id)? {
                return Err(MatchmakingError::AlreadyVoided { match_id });
            }
            return Err(e);
        }

        let changes: HashMap<UserId, i32> = applied
            .entries
            .iter()
            .map(|entry| (entry.user_id.clone(), entry.change))
            .collect();

        let result = match winner {
            Winner::Team(Team::One) => "team1",
            Winner::Team(Team::Two) => "team2",
            Winner::Draw => "draw",
        };
        self.metrics.record_match_finished(result);
        self.metrics.record_rating_application(timer.stop());

        info!(
            "Match {} approved ({}), rating changes: {:?}",
            match_id, result, changes
        );
        Ok(changes)
    }

    /// Undo ratings written by an approval that lost the race to a void
    fn revert_if_voided(&self, match_id: MatchId) -> Result<bool> {
        let voided = self
            .matches
            .get(match_id)?
            .is_some_and(|game| game.status == MatchStatus::Voided);
        if !voided {
            return Ok(false);
        }

        match self.ratings.revert_match(match_id) {
            Ok(reverted) => {
                warn!(
                    "Match {} was voided during approval, reverted {} rating changes",
                    match_id,
                    reverted.len()
                );
                Ok(true)
            }
            Err(MatchmakingError::RatingReversalUnavailable { .. }) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Void a match and undo its rating impact if any was applied
    pub fn void(&self, match_id: MatchId, reason: &str) -> Result<VoidOutcome> {
        let mut previous = MatchStatus::Ongoing;
        self.matches.update(match_id, &mut |game| {
            previous = game.void(reason)?;
            Ok(())
        })?;

        let has_history = !self.ratings.history_for_match(match_id)?.is_empty();
        let outcome = if previous == MatchStatus::Finished || has_history {
            match self.ratings.revert_match(match_id) {
                Ok(reverted) => VoidOutcome::Reverted {
                    players: reverted.len(),
                },
                Err(MatchmakingError::RatingReversalUnavailable { .. }) => {
                    warn!(
                        "Match {} voided but has no rating history; ratings left unchanged",
                        match_id
                    );
                    VoidOutcome::ReversalUnavailable
                }
                Err(e) => return Err(e),
            }
        } else {
            VoidOutcome::NothingToRevert
        };

        self.metrics.record_match_voided(outcome.reverted());
        info!("Match {} voided ({}): {:?}", match_id, reason, outcome);
        Ok(outcome)
    }
}

/// Winner implied by a match's history rows, read from a team one player
fn recorded_winner(game: &Match, entries: &[RatingHistoryEntry]) -> Option<Winner> {
    let outcome = entries
        .iter()
        .find(|entry| game.team_of(&entry.user_id) == Some(Team::One))?
        .outcome;

    Some(match outcome {
        Outcome::Win => Winner::Team(Team::One),
        Outcome::Loss => Winner::Team(Team::Two),
        Outcome::Draw => Winner::Draw,
    })
}
