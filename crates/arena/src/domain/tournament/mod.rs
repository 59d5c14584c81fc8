//! Tournament Engine (spec.md §4.1, §4.5-§4.7): daily lifecycle, attempt
//! state machine, anti-cheat gate, and read-only views.

pub mod anticheat;
pub mod attempts;
pub mod engine;
pub mod service;
pub mod store;

pub use attempts::{AttemptService, StartAttemptView, SubmitScoreRequest, SubmitScoreView};
pub use engine::TournamentEngine;
pub use service::{AttemptPricingView, EntryView, GameStatsView, TournamentQueryService, TournamentView};
pub use store::{Entry, LeaderboardRow, Payout, Tournament, TournamentStore, WinnerRow};
