//! # Crash Round Engine
//!
//! Real-time crash rounds: a multiplier climbs from 1.00x until it reaches a
//! crash point sealed when the round went live. Participants stake before
//! the climb and cash out during it; whatever is still riding at the crash
//! is lost.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CRASH ROUND ENGINE                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Fixed-point multipliers and amounts       │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - Token hashing                             │
//! │                                                              │
//! │  game/           - Round logic (deterministic)               │
//! │  ├── state.rs    - Round, wallet, engine state               │
//! │  ├── tick.rs     - Round clock                               │
//! │  ├── generator.rs- Crash point generation                    │
//! │  ├── ledger.rs   - Bets and settlement                       │
//! │  ├── live_table.rs - Simulated participants                  │
//! │  └── ...                                                     │
//! │                                                              │
//! │  host/           - Side effects (non-deterministic)          │
//! │  ├── store.rs    - JSON state file                           │
//! │  ├── presenter.rs- Notifications and frames                  │
//! │  └── driver.rs   - tokio round loop and handle               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! `core/` and `game/` never read the clock or the OS RNG. Time enters each
//! tick as an explicit instant and randomness as a round token, so a round
//! replays identically from the same token and tick instants.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod host;

// Re-export commonly used types
pub use config::{ConfigError, RoundConfig};
pub use crate::core::fixed::{Amount, Multiplier};
pub use crate::core::rng::DeterministicRng;
pub use game::state::{Panel, ParticipantId, RoundPhase, RoundState};
pub use game::tick::{tick, TickInput, TickResult};
pub use host::{JsonStore, RoundDriver, RoundHandle, TracingPresenter};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default round clock rate (Hz)
pub const TICK_RATE: u32 = 60;
