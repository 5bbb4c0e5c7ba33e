//! Elo rating engine and rating storage
//!
//! The engine is pure: it turns ratings and an outcome into a delta. The
//! storage owns current ratings plus the history rows used for auditing and
//! reverting voided matches.

pub mod elo;
pub mod storage;

// Re-export commonly used types
pub use elo::{compute_delta, EloEngine, Outcome, DEFAULT_K_FACTOR};
pub use storage::{
    AppliedRatings, InMemoryRatingStorage, PlayerRating, RatingHistoryEntry, RatingStorage,
    RatingUpdate,
};
