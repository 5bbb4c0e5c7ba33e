//! Matchmaking queues and capacity checks

pub mod coordinator;
pub mod store;

pub use coordinator::MatchmakingCoordinator;
pub use store::{InMemoryQueueStore, QueueEntry, QueueStore};
