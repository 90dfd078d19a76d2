//! Round Events
//!
//! Events generated during a tick. Participant-facing events map to
//! `Notification`s; operator-facing facts go to `AuditRecord`s and are
//! never shown to participants.

use serde::{Deserialize, Serialize};

use crate::core::fixed::{Amount, Multiplier};
use crate::game::generator::CrashSource;
use crate::game::ledger::{BetError, StakeProblem};
use crate::game::state::{Panel, ParticipantId, RoundPhase};

/// Round event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundEvent {
    /// Round clock moved
    PhaseChanged {
        round: u64,
        from: RoundPhase,
        to: RoundPhase,
    },

    /// Stake accepted
    BetPlaced {
        owner: ParticipantId,
        panel: Panel,
        stake: Amount,
        auto_cashout: Option<Multiplier>,
        /// Placed from a standing auto-bet
        automatic: bool,
    },

    /// Stake refused
    BetRejected {
        owner: ParticipantId,
        panel: Panel,
        error: BetError,
    },

    /// Bet paid out
    CashedOut {
        owner: ParticipantId,
        panel: Panel,
        stake: Amount,
        multiplier: Multiplier,
        payout: Amount,
        /// Triggered by the auto-cashout threshold
        automatic: bool,
    },

    /// Bet lost at crash
    BetLost {
        owner: ParticipantId,
        panel: Panel,
        stake: Amount,
        crash_point: Multiplier,
    },

    /// Standing auto-bet switched off after a failed placement
    AutoBetDisabled {
        owner: ParticipantId,
        panel: Panel,
        reason: BetError,
    },

    /// Round crashed
    RoundCrashed {
        round: u64,
        crash_point: Multiplier,
    },
}

impl RoundEvent {
    /// Whether this event changed balances or history.
    pub fn touches_ledger(&self) -> bool {
        matches!(
            self,
            RoundEvent::BetPlaced { .. }
                | RoundEvent::CashedOut { .. }
                | RoundEvent::BetLost { .. }
                | RoundEvent::RoundCrashed { .. }
        )
    }

    /// Participant-facing message for this event, if any.
    pub fn notification(&self) -> Option<Notification> {
        let (recipient, severity, message) = match self {
            RoundEvent::PhaseChanged { .. } => return None,
            RoundEvent::BetPlaced { owner, panel, stake, automatic, .. } => {
                if *automatic {
                    (*owner, Severity::Info, format!("Auto-bet of {} placed on panel {}.", stake, panel))
                } else {
                    (*owner, Severity::Success, format!("Bet of {} placed!", stake))
                }
            }
            RoundEvent::BetRejected { owner, error, .. } => {
                let (severity, message) = match error {
                    BetError::InvalidStake { problem: StakeProblem::NotPositive, .. } => {
                        (Severity::Danger, "Invalid bet amount.".to_string())
                    }
                    BetError::InvalidStake { problem: StakeProblem::ExceedsBalance, .. } => {
                        (Severity::Danger, "Insufficient balance.".to_string())
                    }
                    BetError::BettingClosed(_) => {
                        (Severity::Danger, "Betting is closed for this round.".to_string())
                    }
                    BetError::DuplicateBet(_) => {
                        (Severity::Info, "You have already placed a bet.".to_string())
                    }
                    BetError::InvalidAutoCashout(m) => {
                        (Severity::Danger, format!("Auto-cashout {} is not allowed.", m))
                    }
                    BetError::UnknownPanel(p) => {
                        (Severity::Danger, format!("There is no panel {}.", p))
                    }
                };
                (*owner, severity, message)
            }
            RoundEvent::CashedOut { owner, multiplier, payout, automatic, .. } => {
                let prefix = if *automatic { "Auto-cashed out" } else { "Cashed out" };
                (*owner, Severity::Success, format!("{} at {}! Won {}", prefix, multiplier, payout))
            }
            RoundEvent::BetLost { owner, crash_point, .. } => {
                (*owner, Severity::Danger, format!("Bet lost at {}.", crash_point))
            }
            RoundEvent::AutoBetDisabled { owner, panel, .. } => (
                *owner,
                Severity::Warning,
                format!("Auto-bet for panel {} disabled (insufficient funds or invalid amount).", panel),
            ),
            RoundEvent::RoundCrashed { crash_point, .. } => {
                return Some(Notification {
                    recipient: None,
                    severity: Severity::Info,
                    message: format!("Crashed at {}", crash_point),
                });
            }
        };
        Some(Notification { recipient: Some(recipient), severity, message })
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// How a notification is styled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Bet placed or paid
    Success,
    /// Neutral information
    Info,
    /// Needs attention
    Warning,
    /// Refused request or lost bet
    Danger,
}

/// A participant-facing message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// `None` for everyone.
    pub recipient: Option<ParticipantId>,
    /// Styling.
    pub severity: Severity,
    /// Text shown to the participant.
    pub message: String,
}

// =============================================================================
// AUDIT
// =============================================================================

/// Operator-facing record. Never rendered to participants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditRecord {
    /// An override was queued for the next live round.
    OverrideQueued { value: Multiplier, replaced: Option<Multiplier> },
    /// A round went live with this crash point.
    CrashPointSealed {
        round: u64,
        crash_point: Multiplier,
        source: CrashSource,
        /// Short digest of the round token
        token_fingerprint: String,
    },
    /// The live round was crashed by an operator.
    ForceCrashed { round: u64, at: Multiplier, scheduled: Multiplier },
    /// A force-crash arrived while no round was live.
    ForceCrashIgnored { phase: RoundPhase },
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: ParticipantId = ParticipantId::new([4; 16]);

    #[test]
    fn test_cashout_notification() {
        let event = RoundEvent::CashedOut {
            owner: OWNER,
            panel: Panel(1),
            stake: Amount::from_units(100),
            multiplier: Multiplier::from_hundredths(200),
            payout: Amount::from_units(200),
            automatic: true,
        };
        let note = event.notification().unwrap();
        assert_eq!(note.recipient, Some(OWNER));
        assert_eq!(note.severity, Severity::Success);
        assert_eq!(note.message, "Auto-cashed out at 2.00x! Won 200.00");
    }

    #[test]
    fn test_rejection_messages() {
        let rejected = |error| RoundEvent::BetRejected { owner: OWNER, panel: Panel(1), error };

        let closed = rejected(BetError::BettingClosed(RoundPhase::Active)).notification().unwrap();
        assert_eq!(closed.message, "Betting is closed for this round.");
        assert_eq!(closed.severity, Severity::Danger);

        let duplicate = rejected(BetError::DuplicateBet(Panel(1))).notification().unwrap();
        assert_eq!(duplicate.severity, Severity::Info);
    }

    #[test]
    fn test_phase_changes_are_silent() {
        let event = RoundEvent::PhaseChanged {
            round: 1,
            from: RoundPhase::Idle,
            to: RoundPhase::AcceptingBets,
        };
        assert!(event.notification().is_none());
        assert!(!event.touches_ledger());
    }
}
