//! Round State Definitions
//!
//! All state for the round engine lives in one owned `RoundState`, passed
//! explicitly to every operation. Uses BTreeMap for deterministic iteration.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RoundConfig;
use crate::core::fixed::{Amount, Multiplier};
use crate::core::hash::derive_round_seed;
use crate::core::rng::DeterministicRng;
use crate::game::continuity::{ContinuityEffect, ContinuityRecord, Resumption};
use crate::game::events::RoundEvent;
use crate::game::generator::EntropySource;
use crate::game::history::{BoundedLog, HistoryRecord, SettlementRecord};
use crate::game::ledger::{AutoBet, BetKey, BetLedger};
use crate::game::live_table::LiveTable;

/// Milliseconds from `since` to `now`, zero if `now` is earlier.
#[inline]
pub fn elapsed_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - since).num_milliseconds().max(0) as u64
}

// =============================================================================
// PARTICIPANT ID
// =============================================================================

/// Unique participant identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering. Serializes as a
/// UUID string so it can key JSON maps.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ParticipantId(pub [u8; 16]);

impl ParticipantId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random identifier.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// First four bytes as hex, for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", self.short())
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.to_uuid_string()
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_uuid_str(&s).ok_or_else(|| format!("invalid participant id: {}", s))
    }
}

/// Bet panel of a participant. Numbered from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Panel(pub u8);

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ROUND PHASE
// =============================================================================

/// Current phase of the round clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Default)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Between rounds
    #[default]
    Idle,
    /// Betting window open
    AcceptingBets,
    /// Multiplier climbing
    Active,
    /// Round crashed, showing result
    Terminated,
}

impl RoundPhase {
    /// Whether stakes may be placed in this phase.
    pub fn accepts_bets(self) -> bool {
        matches!(self, RoundPhase::Idle | RoundPhase::AcceptingBets)
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundPhase::Idle => "idle",
            RoundPhase::AcceptingBets => "accepting_bets",
            RoundPhase::Active => "active",
            RoundPhase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

// =============================================================================
// ROUND
// =============================================================================

/// One round: phase, phase entry time and the sealed crash point.
///
/// A new `Round` replaces the previous one when betting opens; within a
/// round only the phase moves.
#[derive(Clone, PartialEq, Eq)]
pub struct Round {
    /// Monotonic round counter.
    pub number: u64,
    /// Current phase.
    pub phase: RoundPhase,
    /// When the current phase was entered.
    pub phase_start: DateTime<Utc>,
    crash_point: Option<Multiplier>,
}

impl Round {
    /// A round with betting open at `now`.
    pub fn open(number: u64, now: DateTime<Utc>) -> Self {
        Self {
            number,
            phase: RoundPhase::AcceptingBets,
            phase_start: now,
            crash_point: None,
        }
    }

    /// Waiting before round `number + 1` opens for bets.
    pub fn idle(number: u64, now: DateTime<Utc>) -> Self {
        Self {
            number,
            phase: RoundPhase::Idle,
            phase_start: now,
            crash_point: None,
        }
    }

    /// A round already live since `record.round_start`.
    pub fn resumed(number: u64, record: &ContinuityRecord) -> Self {
        Self {
            number,
            phase: RoundPhase::Active,
            phase_start: record.round_start,
            crash_point: Some(record.crash_point),
        }
    }

    /// Milliseconds spent in the current phase.
    pub fn phase_elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        elapsed_ms(self.phase_start, now)
    }

    /// Move to `phase`, entered at `now`.
    pub(crate) fn enter(&mut self, phase: RoundPhase, now: DateTime<Utc>) {
        self.phase = phase;
        self.phase_start = now;
    }

    /// The crash point, visible only once the round has crashed.
    pub fn revealed_crash_point(&self) -> Option<Multiplier> {
        match self.phase {
            RoundPhase::Terminated | RoundPhase::Idle => self.crash_point,
            RoundPhase::AcceptingBets | RoundPhase::Active => None,
        }
    }

    /// The crash point regardless of phase. Engine-internal.
    pub(crate) fn crash_point(&self) -> Option<Multiplier> {
        self.crash_point
    }

    /// Set the crash point once. Returns false if already set.
    pub(crate) fn seal_crash_point(&mut self, value: Multiplier) -> bool {
        if self.crash_point.is_some() {
            return false;
        }
        self.crash_point = Some(value.at_least_one());
        true
    }

    /// Force-crash: the crash point becomes the current multiplier.
    pub(crate) fn redefine_crash_point(&mut self, value: Multiplier) {
        self.crash_point = Some(value.at_least_one());
    }
}

impl fmt::Debug for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Round")
            .field("number", &self.number)
            .field("phase", &self.phase)
            .field("phase_start", &self.phase_start)
            .field("crash_point", &self.revealed_crash_point())
            .finish()
    }
}

// =============================================================================
// WALLET
// =============================================================================

/// Balances of all participants known to this engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    balances: BTreeMap<ParticipantId, Amount>,
    starting_balance: Amount,
}

impl Wallet {
    /// Create an empty wallet; unknown participants start with `starting_balance`.
    pub fn new(starting_balance: Amount) -> Self {
        Self {
            balances: BTreeMap::new(),
            starting_balance,
        }
    }

    /// Create with known balances.
    pub fn with_balances(starting_balance: Amount, balances: BTreeMap<ParticipantId, Amount>) -> Self {
        Self { balances, starting_balance }
    }

    /// Available balance.
    pub fn balance(&self, owner: &ParticipantId) -> Amount {
        self.balances.get(owner).copied().unwrap_or(self.starting_balance)
    }

    /// Overwrite a balance.
    pub fn set_balance(&mut self, owner: ParticipantId, amount: Amount) {
        self.balances.insert(owner, amount);
    }

    /// Remove `amount`. Caller has already checked affordability.
    pub(crate) fn debit(&mut self, owner: ParticipantId, amount: Amount) {
        let balance = self.balance(&owner);
        self.balances.insert(owner, balance - amount);
    }

    /// Add `amount`.
    pub(crate) fn credit(&mut self, owner: ParticipantId, amount: Amount) {
        let balance = self.balance(&owner);
        self.balances.insert(owner, balance + amount);
    }

    /// All recorded balances.
    pub fn balances(&self) -> &BTreeMap<ParticipantId, Amount> {
        &self.balances
    }
}

// =============================================================================
// ROUND STATE
// =============================================================================

/// Complete state of the round engine.
pub struct RoundState {
    /// The current round.
    pub round: Round,

    /// Bets of the current round.
    pub ledger: BetLedger,

    /// Standing auto-bets, placed on every Idle entry.
    pub auto_bets: BTreeMap<BetKey, AutoBet>,

    /// Participant balances.
    pub wallet: Wallet,

    /// Simulated third-party participants of the current round.
    pub live_table: LiveTable,

    /// Past crash points, newest first.
    pub crash_history: BoundedLog<HistoryRecord>,

    /// Settled bets, newest first.
    pub settlements: BoundedLog<SettlementRecord>,

    /// Last sampled live multiplier.
    pub multiplier: Multiplier,

    /// Crash point waiting to be used by the next round.
    pub(crate) pending_override: Option<Multiplier>,

    /// RNG of the current round's live table.
    pub(crate) rng: DeterministicRng,

    /// Source of round tokens.
    entropy: Box<dyn EntropySource>,

    /// Events generated since last taken.
    pending_events: Vec<RoundEvent>,
}

impl RoundState {
    /// Build the engine state at process start.
    ///
    /// A continuity record for a round still running at `now` is rejoined
    /// at its original start time. A stale record opens a fresh betting
    /// window at once. With no record the engine starts in Idle and opens
    /// betting after the idle delay. The returned effect, if any, must be
    /// applied to the store.
    pub fn start(
        config: &RoundConfig,
        mut entropy: Box<dyn EntropySource>,
        continuity: Option<ContinuityRecord>,
        now: DateTime<Utc>,
    ) -> (Self, Option<ContinuityEffect>) {
        let resumption = ContinuityRecord::evaluate(continuity, now);
        let seed = derive_round_seed(&entropy.draw_token());

        let (round, effect) = match resumption {
            Resumption::Resume(record) => (Round::resumed(1, &record), None),
            Resumption::Discard => (Round::open(1, now), Some(ContinuityEffect::Clear)),
            Resumption::Fresh => (Round::idle(0, now), None),
        };

        let mut state = Self {
            round,
            ledger: BetLedger::new(config.panels_per_participant),
            auto_bets: BTreeMap::new(),
            wallet: Wallet::new(config.starting_balance),
            live_table: LiveTable::default(),
            crash_history: BoundedLog::new(config.history_capacity),
            settlements: BoundedLog::new(config.history_capacity),
            multiplier: Multiplier::ONE,
            pending_override: None,
            rng: DeterministicRng::new(seed),
            entropy,
            pending_events: Vec::new(),
        };

        if state.round.phase == RoundPhase::Active {
            state.live_table = LiveTable::spawn(&mut state.rng, &config.live_table, state.ledger.bets());
        }

        (state, effect)
    }

    /// Draw a fresh round token.
    pub(crate) fn draw_token(&mut self) -> String {
        self.entropy.draw_token()
    }

    /// Whether an override is waiting for the next round.
    pub fn has_pending_override(&self) -> bool {
        self.pending_override.is_some()
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<RoundEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Push a round event.
    pub(crate) fn push_event(&mut self, event: RoundEvent) {
        self.pending_events.push(event);
    }
}

// =============================================================================
// TESTS
// =============================================================================
