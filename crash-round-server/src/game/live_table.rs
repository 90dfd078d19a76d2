//! Live-Table Simulator
//!
//! Populates each live round with simulated participants so the table is
//! never empty. Every simulated row has a stake and a cashout threshold
//! drawn from the round RNG; as the multiplier passes a threshold the row
//! flips to cashed out. Rows still playing at the crash become lost.
//!
//! Real bets are mirrored as own rows and follow the ledger.

use serde::{Deserialize, Serialize};

use crate::core::fixed::{Amount, Multiplier};
use crate::core::rng::DeterministicRng;
use crate::game::ledger::{Bet, BetKey};

/// Ranges for simulated participants. Lower bounds inclusive, upper exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveTableConfig {
    /// Minimum number of simulated participants.
    pub min_participants: u64,
    /// Upper bound on simulated participants.
    pub max_participants: u64,
    /// Smallest stake.
    pub min_stake: Amount,
    /// Upper bound on stakes.
    pub max_stake: Amount,
    /// Lowest cashout threshold.
    pub min_threshold: Multiplier,
    /// Upper bound on cashout thresholds.
    pub max_threshold: Multiplier,
}

impl Default for LiveTableConfig {
    fn default() -> Self {
        Self {
            min_participants: 15,
            max_participants: 35,
            min_stake: Amount::from_units(10),
            max_stake: Amount::from_units(210),
            min_threshold: Multiplier::from_hundredths(110),
            max_threshold: Multiplier::from_hundredths(610),
        }
    }
}

/// Row status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    /// Still riding
    Playing,
    /// Left before the crash
    CashedOut,
    /// Caught by the crash
    Lost,
}

/// A simulated participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedParticipant {
    /// Index in this round's table.
    pub id: u32,
    /// Shown name, `User####`.
    pub display_name: String,
    /// Simulated stake.
    pub stake: Amount,
    /// Cashes out once the multiplier reaches this.
    pub cashout_threshold: Multiplier,
    /// Row status.
    pub status: LiveStatus,
}

impl SimulatedParticipant {
    /// Payout if cashed out.
    pub fn payout(&self) -> Option<Amount> {
        (self.status == LiveStatus::CashedOut).then(|| self.stake.times(self.cashout_threshold))
    }
}

/// A real bet shown on the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnRow {
    /// Bet this row mirrors.
    pub key: BetKey,
    /// Stake of the bet.
    pub stake: Amount,
    /// Row status.
    pub status: LiveStatus,
    /// Multiplier captured at cashout.
    pub cashed_out_at: Option<Multiplier>,
}

/// Table of the current live round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiveTable {
    simulated: Vec<SimulatedParticipant>,
    own: Vec<OwnRow>,
}

impl LiveTable {
    /// Populate a table for a round that just went live.
    pub fn spawn<'a>(
        rng: &mut DeterministicRng,
        config: &LiveTableConfig,
        bets: impl IntoIterator<Item = &'a Bet>,
    ) -> Self {
        let count = rng.next_range(config.min_participants, config.max_participants);
        let simulated = (0..count as u32)
            .map(|id| SimulatedParticipant {
                id,
                display_name: format!("User{}", rng.next_range(1_000, 10_000)),
                stake: rng.next_amount(config.min_stake, config.max_stake),
                cashout_threshold: rng
                    .next_multiplier(config.min_threshold, config.max_threshold)
                    .floor_to_hundredths(),
                status: LiveStatus::Playing,
            })
            .collect();

        let own = bets
            .into_iter()
            .filter(|b| b.is_pending())
            .map(|b| OwnRow {
                key: b.key(),
                stake: b.stake,
                status: LiveStatus::Playing,
                cashed_out_at: None,
            })
            .collect();

        Self { simulated, own }
    }

    /// Flip simulated rows whose threshold is at or below `current`.
    ///
    /// Idempotent. Returns how many rows flipped.
    pub fn settle(&mut self, current: Multiplier) -> usize {
        let mut flipped = 0;
        for row in self
            .simulated
            .iter_mut()
            .filter(|r| r.status == LiveStatus::Playing && r.cashout_threshold <= current)
        {
            row.status = LiveStatus::CashedOut;
            flipped += 1;
        }
        flipped
    }

    /// Reflect a real cashout.
    pub fn mirror_cashout(&mut self, key: BetKey, multiplier: Multiplier) {
        if let Some(row) = self.own.iter_mut().find(|r| r.key == key) {
            row.status = LiveStatus::CashedOut;
            row.cashed_out_at = Some(multiplier);
        }
    }

    /// Everything still playing loses.
    pub fn crash(&mut self) {
        for row in self.simulated.iter_mut().filter(|r| r.status == LiveStatus::Playing) {
            row.status = LiveStatus::Lost;
        }
        for row in self.own.iter_mut().filter(|r| r.status == LiveStatus::Playing) {
            row.status = LiveStatus::Lost;
        }
    }

    /// Empty the table.
    pub fn clear(&mut self) {
        self.simulated.clear();
        self.own.clear();
    }

    /// Simulated rows.
    pub fn simulated(&self) -> &[SimulatedParticipant] {
        &self.simulated
    }

    /// Rows for real bets.
    pub fn own(&self) -> &[OwnRow] {
        &self.own
    }

    /// Rows on the table.
    pub fn player_count(&self) -> usize {
        self.simulated.len() + self.own.len()
    }

    /// Sum of all stakes on the table.
    pub fn total_staked(&self) -> Amount {
        self.simulated.iter().map(|r| r.stake).chain(self.own.iter().map(|r| r.stake)).sum()
    }
}
