//! Matches: creation from converted lobbies, result reports, approval and voiding

pub mod instance;
pub mod lifecycle;
pub mod resolution;
pub mod store;

pub use instance::{Match, MatchPlayer, MatchReport, MatchStatus};
pub use lifecycle::{assign_teams, MatchLifecycle};
pub use resolution::{MatchResolver, VoidOutcome};
pub use store::{InMemoryMatchStore, MatchCounts, MatchStore};
