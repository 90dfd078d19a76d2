//! Presentation
//!
//! The engine pushes notifications and a per-tick `Frame` to a `Presenter`.
//! A frame never carries the crash point of a round that has not crashed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RoundConfig;
use crate::core::fixed::{Amount, Multiplier};
use crate::game::events::{Notification, Severity};
use crate::game::history::CrashTier;
use crate::game::ledger::Bet;
use crate::game::live_table::{OwnRow, SimulatedParticipant};
use crate::game::state::{RoundPhase, RoundState};

/// A crash shown in the history strip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentCrash {
    /// Where the round crashed.
    pub crash_point: Multiplier,
    /// Colour band of the crash point.
    pub tier: CrashTier,
}

/// Everything a display needs for one tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Round number.
    pub round: u64,
    /// Clock phase.
    pub phase: RoundPhase,
    /// Live multiplier (1.00x outside Active).
    pub multiplier: Multiplier,
    /// Milliseconds left in the betting window.
    pub betting_remaining_ms: Option<u64>,
    /// Set only once the round has crashed.
    pub crash_point: Option<Multiplier>,
    /// Real bets this round.
    pub bets: Vec<Bet>,
    /// Stakes on the live table, simulated and real.
    pub total_staked: Amount,
    /// Rows on the live table.
    pub player_count: usize,
    /// Simulated participants.
    pub simulated: Vec<SimulatedParticipant>,
    /// Real bets as shown on the table.
    pub own_rows: Vec<OwnRow>,
    /// Newest first.
    pub recent_crashes: Vec<RecentCrash>,
}

impl Frame {
    /// Snapshot `state` at `now`.
    pub fn capture(state: &RoundState, config: &RoundConfig, now: DateTime<Utc>) -> Self {
        let phase = state.round.phase;
        let betting_remaining_ms = (phase == RoundPhase::AcceptingBets)
            .then(|| config.betting_ms.saturating_sub(state.round.phase_elapsed_ms(now)));
        let multiplier = if phase == RoundPhase::Idle || phase == RoundPhase::AcceptingBets {
            Multiplier::ONE
        } else {
            state.multiplier
        };

        Self {
            round: state.round.number,
            phase,
            multiplier,
            betting_remaining_ms,
            crash_point: state.round.revealed_crash_point(),
            bets: state.ledger.bets().cloned().collect(),
            total_staked: state.live_table.total_staked(),
            player_count: state.live_table.player_count(),
            simulated: state.live_table.simulated().to_vec(),
            own_rows: state.live_table.own().to_vec(),
            recent_crashes: state
                .crash_history
                .iter()
                .map(|r| RecentCrash { crash_point: r.crash_point, tier: r.tier() })
                .collect(),
        }
    }
}

/// Display surface for the engine.
pub trait Presenter: Send {
    /// Show a notification.
    fn notify(&mut self, notification: &Notification);

    /// Draw a frame.
    fn render(&mut self, frame: &Frame);
}

/// Presenter that writes to the tracing log.
///
/// Frames are logged on phase changes and about once a second while live.
#[derive(Debug, Default)]
pub struct TracingPresenter {
    last_phase: Option<RoundPhase>,
    frames: u64,
    every: u64,
}

impl TracingPresenter {
    /// Log a live frame every `every` frames.
    pub fn new(every: u64) -> Self {
        Self { last_phase: None, frames: 0, every: every.max(1) }
    }
}

impl Presenter for TracingPresenter {
    fn notify(&mut self, notification: &Notification) {
        let to = notification.recipient.map(|id| id.short()).unwrap_or_else(|| "all".to_string());
        match notification.severity {
            Severity::Warning | Severity::Danger => warn!(%to, "{}", notification.message),
            Severity::Success | Severity::Info => info!(%to, "{}", notification.message),
        }
    }

    fn render(&mut self, frame: &Frame) {
        self.frames += 1;
        if self.last_phase != Some(frame.phase) {
            self.last_phase = Some(frame.phase);
            match frame.phase {
                RoundPhase::AcceptingBets => info!(round = frame.round, "betting open"),
                RoundPhase::Active => info!(
                    round = frame.round,
                    players = frame.player_count,
                    staked = %frame.total_staked,
                    "round live"
                ),
                RoundPhase::Terminated => {
                    if let Some(crash_point) = frame.crash_point {
                        info!(round = frame.round, %crash_point, "round crashed");
                    }
                }
                RoundPhase::Idle => debug!(round = frame.round, "idle"),
            }
            return;
        }
        if frame.phase == RoundPhase::Active && self.frames % self.every.max(1) == 0 {
            let cashed = frame.simulated.iter().filter(|r| r.payout().is_some()).count();
            debug!(round = frame.round, multiplier = %frame.multiplier, cashed, "live");
        }
    }
}

/// Presenter that keeps everything it is given. For tests.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    /// Notifications in arrival order.
    pub notifications: Vec<Notification>,
    /// Every rendered frame.
    pub frames: Vec<Frame>,
}

impl Presenter for RecordingPresenter {
    fn notify(&mut self, notification: &Notification) {
        self.notifications.push(notification.clone());
    }

    fn render(&mut self, frame: &Frame) {
        self.frames.push(frame.clone());
    }
}
