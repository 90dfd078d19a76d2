//! History Log
//!
//! Bounded, newest-first records of past crash points and of settled bets.
//! Both lists survive across rounds and restarts; persisted copies are
//! validated entry by entry on load.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::fixed::{Amount, Multiplier};
use crate::game::state::{Panel, ParticipantId};

/// Default capacity of each history list.
pub const HISTORY_CAPACITY: usize = 50;

/// A persisted history entry failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// Entry is not the expected shape or holds out-of-range values.
    #[error("malformed history record at index {index}: {reason}")]
    MalformedHistoryRecord {
        /// Position in the persisted list.
        index: usize,
        /// What was wrong.
        reason: String,
    },
}

/// Records that can check themselves after deserialization.
pub trait Validate {
    /// Describe the first problem found, if any.
    fn problem(&self) -> Option<String>;
}

// =============================================================================
// BOUNDED LOG
// =============================================================================

/// Append-only list keeping the newest `capacity` entries, newest first.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundedLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedLog<T> {
    /// Create an empty log.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a new entry, evicting the oldest on overflow.
    pub fn push(&mut self, entry: T) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.front()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> BoundedLog<T> {
    /// Snapshot newest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    /// Rebuild from a newest-first list, dropping anything past capacity.
    pub fn from_newest_first(entries: Vec<T>, capacity: usize) -> Self {
        let mut log = Self::new(capacity);
        log.entries.extend(entries.into_iter().take(capacity));
        log
    }
}

impl<T> BoundedLog<T>
where
    T: for<'de> Deserialize<'de> + Validate + Clone,
{
    /// Load from persisted JSON values, skipping entries that fail.
    ///
    /// Returns the log and one error per skipped entry.
    pub fn load(values: Vec<serde_json::Value>, capacity: usize) -> (Self, Vec<HistoryError>) {
        let mut errors = Vec::new();
        let mut kept = Vec::with_capacity(values.len().min(capacity));

        for (index, value) in values.into_iter().enumerate() {
            let parsed = serde_json::from_value::<T>(value)
                .map_err(|e| e.to_string())
                .and_then(|record| match record.problem() {
                    Some(reason) => Err(reason),
                    None => Ok(record),
                });
            match parsed {
                Ok(record) => kept.push(record),
                Err(reason) => errors.push(HistoryError::MalformedHistoryRecord { index, reason }),
            }
        }

        (Self::from_newest_first(kept, capacity), errors)
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// Display band for a crash point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashTier {
    /// Below 2x.
    Low,
    /// 2x up to 10x.
    Medium,
    /// 10x and above.
    High,
}

/// Outcome of one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Where the round crashed.
    pub crash_point: Multiplier,
    /// When the round crashed.
    pub at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Display band.
    pub fn tier(&self) -> CrashTier {
        if self.crash_point < Multiplier::from_hundredths(200) {
            CrashTier::Low
        } else if self.crash_point < Multiplier::from_hundredths(1_000) {
            CrashTier::Medium
        } else {
            CrashTier::High
        }
    }
}

impl Validate for HistoryRecord {
    fn problem(&self) -> Option<String> {
        (!self.crash_point.is_valid())
            .then(|| format!("crash point {} below 1.00x", self.crash_point))
    }
}

/// A settled bet of a participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// Who placed the bet.
    pub owner: ParticipantId,
    /// Panel the bet was placed on.
    pub panel: Panel,
    /// Amount staked.
    pub stake: Amount,
    /// Amount credited back (zero for a loss).
    pub payout: Amount,
    /// Cashout multiplier, or the crash point for a loss.
    pub multiplier: Multiplier,
    /// When the bet settled.
    pub at: DateTime<Utc>,
}

impl SettlementRecord {
    /// Whether the bet paid out.
    pub fn is_win(&self) -> bool {
        self.payout.is_positive()
    }

    /// Payout minus stake.
    pub fn profit(&self) -> Amount {
        self.payout - self.stake
    }
}

impl Validate for SettlementRecord {
    fn problem(&self) -> Option<String> {
        if !self.stake.is_positive() {
            return Some(format!("stake {} not positive", self.stake));
        }
        if self.payout.is_negative() {
            return Some(format!("payout {} negative", self.payout));
        }
        None
    }
}

// =============================================================================
// TESTS
// =============================================================================
