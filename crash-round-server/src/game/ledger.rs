//! Bet Ledger
//!
//! Stakes of the current round, keyed by (participant, panel).
//!
//! ## Lifecycle
//!
//! ```text
//! place (Idle / AcceptingBets) ──► Pending ──► CashedOut   (manual or auto)
//!                                     │
//!                                     └──────► Lost        (at crash)
//! ```
//!
//! A bet settles exactly once. The stake leaves the wallet at placement;
//! a cashout credits `floor(stake × multiplier)`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::fixed::{Amount, Multiplier};
use crate::game::events::RoundEvent;
use crate::game::history::SettlementRecord;
use crate::game::multiplier::multiplier_at;
use crate::game::state::{Panel, ParticipantId, RoundPhase, RoundState};

/// Why a stake was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeProblem {
    /// Zero or negative.
    NotPositive,
    /// More than the available balance.
    ExceedsBalance,
}

/// Bet placement errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BetError {
    /// Stake is non-positive or unaffordable.
    #[error("invalid stake {stake}: {problem:?}")]
    InvalidStake {
        /// Requested stake.
        stake: Amount,
        /// What was wrong with it.
        problem: StakeProblem,
    },
    /// Round is live or crashed.
    #[error("betting is closed during {0}")]
    BettingClosed(RoundPhase),
    /// Panel already holds a bet this round.
    #[error("panel {0} already has a bet this round")]
    DuplicateBet(Panel),
    /// Auto-cashout threshold below 1.00x.
    #[error("auto-cashout {0} is below 1.00x")]
    InvalidAutoCashout(Multiplier),
    /// Panel number out of range.
    #[error("unknown panel {0}")]
    UnknownPanel(Panel),
}

/// Key of a bet: one per participant per panel per round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BetKey {
    /// Bettor.
    pub owner: ParticipantId,
    /// Bettor's panel.
    pub panel: Panel,
}

impl BetKey {
    /// Build a key.
    pub const fn new(owner: ParticipantId, panel: Panel) -> Self {
        Self { owner, panel }
    }
}

/// Settlement status of a bet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetStatus {
    /// Riding the multiplier.
    Pending,
    /// Paid out.
    CashedOut,
    /// Lost at crash.
    Lost,
}

/// One stake in the current round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    /// Bettor.
    pub owner: ParticipantId,
    /// Bettor's panel.
    pub panel: Panel,
    /// Amount staked.
    pub stake: Amount,
    /// Settlement status.
    pub status: BetStatus,
    /// Multiplier at cashout. Set only when `status == CashedOut`.
    pub cashout_multiplier: Option<Multiplier>,
    /// Cash out automatically once the multiplier reaches this.
    pub auto_cashout: Option<Multiplier>,
}

impl Bet {
    /// Key of this bet.
    pub fn key(&self) -> BetKey {
        BetKey::new(self.owner, self.panel)
    }

    /// Whether the bet is still riding.
    pub fn is_pending(&self) -> bool {
        self.status == BetStatus::Pending
    }

    /// Amount credited at cashout, if cashed out.
    pub fn payout(&self) -> Option<Amount> {
        self.cashout_multiplier.map(|m| self.stake.times(m))
    }
}

/// A standing instruction to bet on every round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoBet {
    /// Stake placed each round.
    pub stake: Amount,
    /// Auto-cashout threshold for those bets.
    pub auto_cashout: Option<Multiplier>,
}

/// Aggregates shown alongside the bet list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Number of bets.
    pub bets: usize,
    /// Sum of stakes.
    pub staked: Amount,
    /// Sum of payouts so far.
    pub paid_out: Amount,
}

/// Bets of the current round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BetLedger {
    bets: BTreeMap<BetKey, Bet>,
    panels: u8,
}

impl BetLedger {
    /// Empty ledger allowing panels `1..=panels`.
    pub fn new(panels: u8) -> Self {
        Self {
            bets: BTreeMap::new(),
            panels,
        }
    }

    /// Check a panel number.
    pub fn check_panel(&self, panel: Panel) -> Result<(), BetError> {
        if panel.0 == 0 || panel.0 > self.panels {
            return Err(BetError::UnknownPanel(panel));
        }
        Ok(())
    }

    /// Look up a bet.
    pub fn get(&self, key: &BetKey) -> Option<&Bet> {
        self.bets.get(key)
    }

    /// All bets, in key order.
    pub fn bets(&self) -> impl Iterator<Item = &Bet> {
        self.bets.values()
    }

    /// Bets of one participant.
    pub fn bets_of(&self, owner: ParticipantId) -> impl Iterator<Item = &Bet> {
        self.bets.values().filter(move |b| b.owner == owner)
    }

    /// Number of bets.
    pub fn len(&self) -> usize {
        self.bets.len()
    }

    /// Whether no bets are placed.
    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    /// Current aggregates.
    pub fn totals(&self) -> LedgerTotals {
        LedgerTotals {
            bets: self.bets.len(),
            staked: self.bets.values().map(|b| b.stake).sum(),
            paid_out: self.bets.values().filter_map(Bet::payout).sum(),
        }
    }

    /// Validate a placement without changing anything.
    pub fn validate(
        &self,
        phase: RoundPhase,
        key: BetKey,
        stake: Amount,
        auto_cashout: Option<Multiplier>,
        balance: Amount,
    ) -> Result<(), BetError> {
        self.check_panel(key.panel)?;
        if !phase.accepts_bets() {
            return Err(BetError::BettingClosed(phase));
        }
        if !stake.is_positive() {
            return Err(BetError::InvalidStake { stake, problem: StakeProblem::NotPositive });
        }
        if stake > balance {
            return Err(BetError::InvalidStake { stake, problem: StakeProblem::ExceedsBalance });
        }
        if let Some(threshold) = auto_cashout {
            if !threshold.is_valid() {
                return Err(BetError::InvalidAutoCashout(threshold));
            }
        }
        if self.bets.contains_key(&key) {
            return Err(BetError::DuplicateBet(key.panel));
        }
        Ok(())
    }

    fn insert(&mut self, key: BetKey, stake: Amount, auto_cashout: Option<Multiplier>) {
        self.bets.insert(
            key,
            Bet {
                owner: key.owner,
                panel: key.panel,
                stake,
                status: BetStatus::Pending,
                cashout_multiplier: None,
                auto_cashout,
            },
        );
    }

    /// Keys of pending bets whose threshold is at or below `current`.
    fn due_auto_cashouts(&self, current: Multiplier) -> Vec<(BetKey, Multiplier)> {
        self.bets
            .values()
            .filter(|b| b.is_pending())
            .filter_map(|b| b.auto_cashout.filter(|t| *t <= current).map(|t| (b.key(), t)))
            .collect()
    }

    /// Mark a pending bet cashed out. Returns the bet if it was pending.
    fn mark_cashed_out(&mut self, key: &BetKey, multiplier: Multiplier) -> Option<Bet> {
        let bet = self.bets.get_mut(key).filter(|b| b.is_pending())?;
        bet.status = BetStatus::CashedOut;
        bet.cashout_multiplier = Some(multiplier);
        Some(bet.clone())
    }

    /// Mark every pending bet lost and return them.
    fn mark_all_lost(&mut self) -> Vec<Bet> {
        self.bets
            .values_mut()
            .filter(|b| b.is_pending())
            .map(|b| {
                b.status = BetStatus::Lost;
                b.clone()
            })
            .collect()
    }

    /// Drop every bet.
    pub(crate) fn clear(&mut self) {
        self.bets.clear();
    }
}

// =============================================================================
// ROUND STATE OPERATIONS
// =============================================================================

impl RoundState {
    /// Place a bet.
    ///
    /// Allowed in Idle and AcceptingBets. On success the stake is debited
    /// and a Pending bet recorded. On failure nothing changes except a
    /// `BetRejected` event.
    pub fn place_bet(
        &mut self,
        owner: ParticipantId,
        panel: Panel,
        stake: Amount,
        auto_cashout: Option<Multiplier>,
    ) -> Result<(), BetError> {
        match self.try_place(BetKey::new(owner, panel), stake, auto_cashout) {
            Ok(()) => {
                self.push_event(RoundEvent::BetPlaced {
                    owner,
                    panel,
                    stake,
                    auto_cashout,
                    automatic: false,
                });
                Ok(())
            }
            Err(error) => {
                self.push_event(RoundEvent::BetRejected { owner, panel, error });
                Err(error)
            }
        }
    }

    fn try_place(
        &mut self,
        key: BetKey,
        stake: Amount,
        auto_cashout: Option<Multiplier>,
    ) -> Result<(), BetError> {
        let balance = self.wallet.balance(&key.owner);
        self.ledger.validate(self.round.phase, key, stake, auto_cashout, balance)?;
        self.wallet.debit(key.owner, stake);
        self.ledger.insert(key, stake, auto_cashout);
        Ok(())
    }

    /// Cash out a pending bet at the live multiplier.
    ///
    /// A no-op returning `None` unless the round is Active, the bet exists
    /// and is Pending, and the multiplier at `now` is still below the crash
    /// point.
    pub fn cash_out(
        &mut self,
        owner: ParticipantId,
        panel: Panel,
        now: DateTime<Utc>,
    ) -> Option<SettlementRecord> {
        if self.round.phase != RoundPhase::Active {
            return None;
        }
        let crash_point = self.round.crash_point()?;
        let current = multiplier_at(self.round.phase_elapsed_ms(now));
        if current >= crash_point {
            return None;
        }
        self.settle_cashout(BetKey::new(owner, panel), current, false, now)
    }

    /// Enable, replace or (with `None`) disable an auto-bet.
    ///
    /// The stake is checked when the bet is placed at the next Idle entry.
    pub fn set_auto_bet(
        &mut self,
        owner: ParticipantId,
        panel: Panel,
        auto_bet: Option<AutoBet>,
    ) -> Result<(), BetError> {
        self.ledger.check_panel(panel)?;
        let key = BetKey::new(owner, panel);
        match auto_bet {
            Some(auto_bet) => {
                if let Some(threshold) = auto_bet.auto_cashout.filter(|t| !t.is_valid()) {
                    return Err(BetError::InvalidAutoCashout(threshold));
                }
                self.auto_bets.insert(key, auto_bet);
            }
            None => {
                self.auto_bets.remove(&key);
            }
        }
        Ok(())
    }

    /// Settle pending bets whose threshold has been reached, each at its
    /// own threshold. Returns how many settled.
    ///
    /// Thresholds above the crash point never settle, even when `current`
    /// has already passed it.
    pub(crate) fn check_auto_cashouts(&mut self, current: Multiplier, now: DateTime<Utc>) -> usize {
        let reached = self.round.crash_point().map_or(current, |crash| current.min(crash));
        let due = self.ledger.due_auto_cashouts(reached);
        due.into_iter()
            .filter_map(|(key, threshold)| self.settle_cashout(key, threshold, true, now))
            .count()
    }

    /// Mark every still-pending bet lost at the crash point.
    pub(crate) fn settle_losses(&mut self, crash_point: Multiplier, now: DateTime<Utc>) {
        for bet in self.ledger.mark_all_lost() {
            self.settlements.push(SettlementRecord {
                owner: bet.owner,
                panel: bet.panel,
                stake: bet.stake,
                payout: Amount::ZERO,
                multiplier: crash_point,
                at: now,
            });
            self.push_event(RoundEvent::BetLost {
                owner: bet.owner,
                panel: bet.panel,
                stake: bet.stake,
                crash_point,
            });
        }
    }

    /// Place every standing auto-bet whose panel is free.
    ///
    /// An auto-bet that cannot be placed is switched off.
    pub(crate) fn place_auto_bets(&mut self) {
        let standing: Vec<(BetKey, AutoBet)> =
            self.auto_bets.iter().map(|(k, a)| (*k, *a)).collect();

        for (key, auto_bet) in standing {
            if self.ledger.get(&key).is_some() {
                continue;
            }
            match self.try_place(key, auto_bet.stake, auto_bet.auto_cashout) {
                Ok(()) => self.push_event(RoundEvent::BetPlaced {
                    owner: key.owner,
                    panel: key.panel,
                    stake: auto_bet.stake,
                    auto_cashout: auto_bet.auto_cashout,
                    automatic: true,
                }),
                Err(reason) => {
                    self.auto_bets.remove(&key);
                    self.push_event(RoundEvent::AutoBetDisabled {
                        owner: key.owner,
                        panel: key.panel,
                        reason,
                    });
                }
            }
        }
    }

    fn settle_cashout(
        &mut self,
        key: BetKey,
        multiplier: Multiplier,
        automatic: bool,
        now: DateTime<Utc>,
    ) -> Option<SettlementRecord> {
        let bet = self.ledger.mark_cashed_out(&key, multiplier)?;
        let payout = bet.stake.times(multiplier);
        self.wallet.credit(bet.owner, payout);
        self.live_table.mirror_cashout(key, multiplier);

        let record = SettlementRecord {
            owner: bet.owner,
            panel: bet.panel,
            stake: bet.stake,
            payout,
            multiplier,
            at: now,
        };
        self.settlements.push(record.clone());
        self.push_event(RoundEvent::CashedOut {
            owner: bet.owner,
            panel: bet.panel,
            stake: bet.stake,
            multiplier,
            payout,
            automatic,
        });
        Some(record)
    }
}

// =============================================================================
// TESTS
// =============================================================================
