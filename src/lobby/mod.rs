//! Game modes and ready-check lobbies
//!
//! A lobby is opened when a queue fills, collects every member's accept or
//! decline under a deadline, and settles once into a match or a cancellation.

pub mod instance;
pub mod provider;
pub mod ready_check;
pub mod store;
pub mod sweeper;

pub use instance::{LobbyMember, LobbyStatus, MemberResponse, ReadyCheckLobby, Transition};
pub use provider::{GameMode, GameModeProvider, StaticGameModeProvider, MAX_TEAM_SIZE};
pub use ready_check::{ReadyCheckCoordinator, ReadyCheckOutcome, ReadyCheckSettings};
pub use store::{InMemoryLobbyStore, LobbyStore};
pub use sweeper::{DeadlineSweeper, SweepReport, SweepTarget};
