//! Round Logic Module
//!
//! Everything that decides what happens in a round. No I/O, no clocks:
//! time enters as an explicit `now`, randomness as a token or seed.
//!
//! ## Module Structure
//!
//! - `state`: Round, wallet and engine state
//! - `tick`: Round clock
//! - `multiplier`: Growth curve
//! - `generator`: Crash point generation
//! - `ledger`: Bets, cashouts, settlement
//! - `live_table`: Simulated participants
//! - `history`: Bounded crash and settlement logs
//! - `continuity`: Resuming a live round after restart
//! - `signals`: Operator override and force-crash
//! - `events`: Round events, notifications, audit records

pub mod state;
pub mod tick;
pub mod multiplier;
pub mod generator;
pub mod ledger;
pub mod live_table;
pub mod history;
pub mod continuity;
pub mod signals;
pub mod events;

// Re-export key types
pub use state::{Panel, ParticipantId, Round, RoundPhase, RoundState, Wallet};
pub use tick::{tick, TickInput, TickResult};
pub use multiplier::{elapsed_for, multiplier_at};
pub use generator::{EntropySource, GeneratorConfig, SeededEntropy, UuidEntropy};
pub use ledger::{AutoBet, Bet, BetError, BetKey, BetLedger, BetStatus};
pub use live_table::{LiveTable, LiveTableConfig};
pub use history::{BoundedLog, CrashTier, HistoryError, HistoryRecord, SettlementRecord};
pub use continuity::{ContinuityEffect, ContinuityRecord, ContinuityStore};
pub use signals::{signal_channel, AdminSignal, SignalSender};
pub use events::{AuditRecord, Notification, RoundEvent, Severity};
