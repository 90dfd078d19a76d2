//! Persistent Store
//!
//! Balances, both history lists and the continuity record live in one JSON
//! document. `JsonStore::open` backs it with a file, rewritten whole on each
//! save; `JsonStore::in_memory` keeps it in memory only.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::fixed::Amount;
use crate::game::continuity::{ContinuityRecord, ContinuityStore};
use crate::game::history::{BoundedLog, HistoryError, HistoryRecord, SettlementRecord};
use crate::game::state::{ParticipantId, Wallet};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the state file failed.
    #[error("store I/O: {0}")]
    Io(#[from] io::Error),
    /// A value could not be encoded.
    #[error("store encoding: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk layout. Balances and history entries stay raw until validated
/// on load, so one bad entry never hides the rest.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    balances: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    crash_history: Vec<serde_json::Value>,
    #[serde(default)]
    settlements: Vec<serde_json::Value>,
    #[serde(default)]
    continuity: Option<serde_json::Value>,
}

/// Everything the engine restores at start-up.
#[derive(Debug)]
pub struct Restored {
    /// Balances that parsed; unreadable entries are logged and dropped.
    pub balances: BTreeMap<ParticipantId, Amount>,
    /// Crash outcomes, newest first.
    pub crash_history: BoundedLog<HistoryRecord>,
    /// Own settlements, newest first.
    pub settlements: BoundedLog<SettlementRecord>,
    /// Entries dropped during validation.
    pub rejected: Vec<HistoryError>,
}

/// Durable home of balances, history and the continuity record.
pub trait RoundStore: ContinuityStore<Error = StoreError> {
    /// Load balances and history lists.
    fn restore(&self, history_capacity: usize) -> Restored;

    /// Persist balances and history lists.
    fn save_ledger(
        &mut self,
        wallet: &Wallet,
        crash_history: &BoundedLog<HistoryRecord>,
        settlements: &BoundedLog<SettlementRecord>,
    ) -> Result<(), StoreError>;
}

/// JSON document store.
#[derive(Debug)]
pub struct JsonStore {
    path: Option<PathBuf>,
    doc: StoreDocument,
}

impl JsonStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self { path: None, doc: StoreDocument::default() }
    }

    /// Open the document at `path`.
    ///
    /// A missing file starts empty. An unreadable document is logged and
    /// replaced on the next save.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "state file unreadable, starting empty");
                    StoreDocument::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file yet");
                StoreDocument::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path: Some(path), doc })
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&self.doc)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl ContinuityStore for JsonStore {
    type Error = StoreError;

    fn load(&self) -> Option<ContinuityRecord> {
        let value = self.doc.continuity.clone()?;
        match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "continuity record unreadable, ignoring");
                None
            }
        }
    }

    fn save(&mut self, record: &ContinuityRecord) -> Result<(), StoreError> {
        self.doc.continuity = Some(serde_json::to_value(record)?);
        self.flush()
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.doc.continuity = None;
        self.flush()
    }
}

impl RoundStore for JsonStore {
    fn restore(&self, history_capacity: usize) -> Restored {
        let (crash_history, mut rejected) =
            BoundedLog::load(self.doc.crash_history.clone(), history_capacity);
        let (settlements, settlement_errors) =
            BoundedLog::load(self.doc.settlements.clone(), history_capacity);
        rejected.extend(settlement_errors);

        Restored {
            balances: restore_balances(&self.doc.balances),
            crash_history,
            settlements,
            rejected,
        }
    }

    fn save_ledger(
        &mut self,
        wallet: &Wallet,
        crash_history: &BoundedLog<HistoryRecord>,
        settlements: &BoundedLog<SettlementRecord>,
    ) -> Result<(), StoreError> {
        self.doc.balances = wallet
            .balances()
            .iter()
            .map(|(id, amount)| Ok((id.to_uuid_string(), serde_json::to_value(amount)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        self.doc.crash_history = crash_history
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?;
        self.doc.settlements = settlements
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?;
        self.flush()
    }
}

/// Parse persisted balances entry by entry, skipping any that fail.
fn restore_balances(raw: &BTreeMap<String, serde_json::Value>) -> BTreeMap<ParticipantId, Amount> {
    let mut balances = BTreeMap::new();
    for (key, value) in raw {
        let Some(owner) = ParticipantId::from_uuid_str(key) else {
            warn!(key = %key, "dropped balance with malformed participant id");
            continue;
        };
        match serde_json::from_value::<Amount>(value.clone()) {
            Ok(amount) => {
                balances.insert(owner, amount);
            }
            Err(e) => warn!(owner = %owner.short(), error = %e, "dropped unreadable balance"),
        }
    }
    balances
}
