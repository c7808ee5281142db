//! The game-session engine for Liveplay.
//!
//! Owns everything that happens inside one game: the round state machine
//! (start → collect → score → advance/complete), submission
//! reconciliation under concurrency, and the bonus-award logic.
//!
//! # Key types
//!
//! - [`GameSessionEngine`] — the operations: joins, role selection,
//!   round start, play submission, completion evaluation, scoring.
//! - [`ScoringPolicy`] / [`StandardScoring`] — pluggable point values.
//! - [`BingoGrid`] — row/column/diagonal pattern detection.
//! - [`PromptProvider`] / [`StaticPromptSet`] / [`Degrading`] — the
//!   generative-content contract with static-set degradation.
//!
//! The engine trusts the store for every contended decision and the
//! synchronizer for every notification; it holds no session state itself.

mod bingo;
mod engine;
mod error;
mod prompts;
mod scoring;

pub use bingo::BingoGrid;
pub use engine::{decide_winner, EngineConfig, GameSessionEngine};
pub use error::EngineError;
pub use prompts::{
    Degrading, Difficulty, PromptError, PromptProvider, PromptRequest, RoundPrompt,
    StaticPromptSet,
};
pub use scoring::{ScoringPolicy, StandardScoring, SynergyContext};
