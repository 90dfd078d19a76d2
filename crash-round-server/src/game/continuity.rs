//! Round Continuity
//!
//! A live round is persisted as `{ round_start, crash_point }` so a freshly
//! started process can work out how far the round has progressed and rejoin
//! it, without drawing or revealing a new crash point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::fixed::Multiplier;
use crate::game::multiplier::multiplier_at;
use crate::game::state::elapsed_ms;

/// The persisted form of a live round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityRecord {
    /// When the round went live.
    pub round_start: DateTime<Utc>,
    /// The round's crash point.
    pub crash_point: Multiplier,
}

/// What to do with a continuity record found at start-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resumption {
    /// The round is still live: rejoin it at its original start time.
    Resume(ContinuityRecord),
    /// The record is stale or corrupt: discard it and start fresh.
    Discard,
    /// Nothing was persisted.
    Fresh,
}

impl ContinuityRecord {
    /// Decide whether the persisted round is still running at `now`.
    pub fn evaluate(record: Option<Self>, now: DateTime<Utc>) -> Resumption {
        let Some(record) = record else {
            return Resumption::Fresh;
        };
        if !record.crash_point.is_valid() {
            return Resumption::Discard;
        }
        let current = multiplier_at(elapsed_ms(record.round_start, now));
        if current < record.crash_point {
            Resumption::Resume(record)
        } else {
            Resumption::Discard
        }
    }
}

/// Change to the persisted record requested by a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContinuityEffect {
    /// A round went live.
    Save(ContinuityRecord),
    /// The live round ended.
    Clear,
}

/// Durable slot for the continuity record.
///
/// Last writer wins; there is no locking across processes.
pub trait ContinuityStore {
    /// Error type of the backing medium.
    type Error: std::error::Error;

    /// Read the record, if any. Corrupt data reads as `None`.
    fn load(&self) -> Option<ContinuityRecord>;

    /// Replace the record.
    fn save(&mut self, record: &ContinuityRecord) -> Result<(), Self::Error>;

    /// Remove the record.
    fn clear(&mut self) -> Result<(), Self::Error>;

    /// Apply a tick's requested change.
    fn apply(&mut self, effect: ContinuityEffect) -> Result<(), Self::Error> {
        match effect {
            ContinuityEffect::Save(record) => self.save(&record),
            ContinuityEffect::Clear => self.clear(),
        }
    }
}
