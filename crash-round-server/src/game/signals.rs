//! Operator Signals
//!
//! One-shot commands that arrive from outside the round loop: a crash point
//! override for the next round, and a force-crash of the live round.
//!
//! They travel over a single-consumer queue. The round loop drains the queue
//! once per tick, so each signal is observed exactly once.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::fixed::Multiplier;

/// An operator command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminSignal {
    /// Use this crash point for the next round that goes live.
    /// Replaces any override still waiting.
    OverrideCrashPoint(Multiplier),
    /// Crash the live round at its current multiplier.
    /// Ignored unless a round is live when it is drained.
    ForceCrash,
}

/// Errors sending a signal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The override is below 1.00x.
    #[error("override {0} is below 1.00x")]
    InvalidOverride(Multiplier),
    /// The round loop is gone.
    #[error("round loop has shut down")]
    Closed,
}

/// Create a connected sender/inbox pair.
pub fn signal_channel() -> (SignalSender, SignalInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SignalSender { tx }, SignalInbox { rx })
}

/// Producer side. Cheap to clone; any number of operators may hold one.
#[derive(Clone, Debug)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<AdminSignal>,
}

impl SignalSender {
    /// Queue a crash point override for the next round.
    pub fn override_crash_point(&self, value: Multiplier) -> Result<(), SignalError> {
        if !value.is_valid() {
            return Err(SignalError::InvalidOverride(value));
        }
        self.send(AdminSignal::OverrideCrashPoint(value))
    }

    /// Queue a force-crash of the live round.
    pub fn force_crash(&self) -> Result<(), SignalError> {
        self.send(AdminSignal::ForceCrash)
    }

    fn send(&self, signal: AdminSignal) -> Result<(), SignalError> {
        self.tx.send(signal).map_err(|_| SignalError::Closed)
    }
}

/// Consumer side, owned by the round loop.
#[derive(Debug)]
pub struct SignalInbox {
    rx: mpsc::UnboundedReceiver<AdminSignal>,
}

impl SignalInbox {
    /// Take every signal queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<AdminSignal> {
        let mut signals = Vec::new();
        while let Ok(signal) = self.rx.try_recv() {
            signals.push(signal);
        }
        signals
    }
}
