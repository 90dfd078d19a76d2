//! Round Driver
//!
//! Owns the `RoundState` and runs the round clock on a tokio interval.
//! Participants reach it through a cloneable `RoundHandle`; each request
//! travels over an mpsc queue and is answered on a oneshot, applied to
//! completion between two ticks.
//!
//! After every tick the driver applies the continuity effect, persists
//! balances and history when they changed, writes audit records to the
//! `crash_round::audit` target and hands notifications and a frame to the
//! presenter.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::RoundConfig;
use crate::core::fixed::{Amount, Multiplier};
use crate::game::continuity::ContinuityStore;
use crate::game::events::AuditRecord;
use crate::game::generator::EntropySource;
use crate::game::history::SettlementRecord;
use crate::game::ledger::{AutoBet, BetError};
use crate::game::signals::{signal_channel, SignalInbox, SignalSender};
use crate::game::state::{Panel, ParticipantId, RoundPhase, RoundState, Wallet};
use crate::game::tick::{tick, TickInput, TickResult};
use crate::host::presenter::{Frame, Presenter};
use crate::host::store::{RoundStore, StoreError};

/// Queue depth for participant requests.
const COMMAND_QUEUE: usize = 256;

/// Driver errors.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The request was refused by the ledger.
    #[error(transparent)]
    Bet(#[from] BetError),
    /// Persisting state failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The round loop is gone.
    #[error("round loop has shut down")]
    Closed,
}

/// A participant request.
#[derive(Debug)]
enum Command {
    PlaceBet {
        owner: ParticipantId,
        panel: Panel,
        stake: Amount,
        auto_cashout: Option<Multiplier>,
        reply: oneshot::Sender<Result<(), BetError>>,
    },
    CashOut {
        owner: ParticipantId,
        panel: Panel,
        reply: oneshot::Sender<Option<SettlementRecord>>,
    },
    SetAutoBet {
        owner: ParticipantId,
        panel: Panel,
        auto_bet: Option<AutoBet>,
        reply: oneshot::Sender<Result<(), BetError>>,
    },
    Balance {
        owner: ParticipantId,
        reply: oneshot::Sender<Amount>,
    },
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable access to a running driver.
#[derive(Clone, Debug)]
pub struct RoundHandle {
    commands: mpsc::Sender<Command>,
    signals: SignalSender,
    phase: watch::Receiver<RoundPhase>,
    shutdown: broadcast::Sender<()>,
}

impl RoundHandle {
    /// Place a bet.
    pub async fn place_bet(
        &self,
        owner: ParticipantId,
        panel: Panel,
        stake: Amount,
        auto_cashout: Option<Multiplier>,
    ) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PlaceBet { owner, panel, stake, auto_cashout, reply }).await?;
        Ok(rx.await.map_err(|_| DriverError::Closed)??)
    }

    /// Cash out at the live multiplier. `None` if nothing was settled.
    pub async fn cash_out(
        &self,
        owner: ParticipantId,
        panel: Panel,
    ) -> Result<Option<SettlementRecord>, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::CashOut { owner, panel, reply }).await?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    /// Enable, replace or disable an auto-bet.
    pub async fn set_auto_bet(
        &self,
        owner: ParticipantId,
        panel: Panel,
        auto_bet: Option<AutoBet>,
    ) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetAutoBet { owner, panel, auto_bet, reply }).await?;
        Ok(rx.await.map_err(|_| DriverError::Closed)??)
    }

    /// Current balance.
    pub async fn balance(&self, owner: ParticipantId) -> Result<Amount, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Balance { owner, reply }).await?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    /// Operator signal sender.
    pub fn admin(&self) -> &SignalSender {
        &self.signals
    }

    /// Watch phase changes.
    pub fn phase(&self) -> watch::Receiver<RoundPhase> {
        self.phase.clone()
    }

    /// Ask the driver loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    async fn send(&self, command: Command) -> Result<(), DriverError> {
        self.commands.send(command).await.map_err(|_| DriverError::Closed)
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// Runs the round clock against a store and a presenter.
pub struct RoundDriver<S, P> {
    config: RoundConfig,
    state: RoundState,
    store: S,
    presenter: P,
    commands: mpsc::Receiver<Command>,
    inbox: SignalInbox,
    phase_tx: watch::Sender<RoundPhase>,
    shutdown_tx: broadcast::Sender<()>,
    handle: RoundHandle,
}

impl<S: RoundStore, P: Presenter> RoundDriver<S, P> {
    /// Restore persisted state and build the driver.
    pub fn new(
        config: RoundConfig,
        mut store: S,
        presenter: P,
        entropy: Box<dyn EntropySource>,
        now: DateTime<Utc>,
    ) -> Self {
        let restored = store.restore(config.history_capacity);
        for rejected in &restored.rejected {
            warn!(error = %rejected, "dropped history entry");
        }

        let (mut state, effect) = RoundState::start(&config, entropy, store.load(), now);
        state.wallet = Wallet::with_balances(config.starting_balance, restored.balances);
        state.crash_history = restored.crash_history;
        state.settlements = restored.settlements;

        if let Some(effect) = effect {
            if let Err(e) = store.apply(effect) {
                warn!(error = %e, "failed to update continuity record");
            }
        }
        if state.round.phase == RoundPhase::Active {
            info!(round_start = %state.round.phase_start, "resumed live round");
        }

        let (command_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (signals, inbox) = signal_channel();
        let (phase_tx, phase_rx) = watch::channel(state.round.phase);
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = RoundHandle {
            commands: command_tx,
            signals,
            phase: phase_rx,
            shutdown: shutdown_tx.clone(),
        };

        Self {
            config,
            state,
            store,
            presenter,
            commands,
            inbox,
            phase_tx,
            shutdown_tx,
            handle,
        }
    }

    /// Handle for participants and operators.
    pub fn handle(&self) -> RoundHandle {
        self.handle.clone()
    }

    /// Current engine state.
    pub fn state(&self) -> &RoundState {
        &self.state
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Display surface.
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Apply queued requests, then run one tick at `now`.
    pub fn step(&mut self, now: DateTime<Utc>) -> TickResult {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command, now);
        }

        let input = TickInput { now, signals: self.inbox.drain() };
        let result = tick(&mut self.state, input, &self.config);

        for record in &result.audit {
            audit(record);
        }

        if let Some(effect) = result.continuity {
            if let Err(e) = self.store.apply(effect) {
                warn!(error = %e, "failed to update continuity record");
            }
        }

        if result.events.iter().any(|e| e.touches_ledger()) {
            if let Err(e) = self.persist() {
                warn!(error = %e, "failed to persist ledger");
            }
        }

        for notification in result.events.iter().filter_map(|e| e.notification()) {
            self.presenter.notify(&notification);
        }
        self.presenter.render(&Frame::capture(&self.state, &self.config, now));

        let phase = self.state.round.phase;
        if *self.phase_tx.borrow() != phase {
            self.phase_tx.send_replace(phase);
        }

        result
    }

    /// Run until `RoundHandle::shutdown`.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<(), DriverError> {
        let mut ticker = interval(Duration::from_millis(self.config.tick_interval_ms()));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(tick_rate = self.config.tick_rate, "round loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.step(Utc::now());
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.persist()?;
        Ok(())
    }

    fn apply(&mut self, command: Command, now: DateTime<Utc>) {
        match command {
            Command::PlaceBet { owner, panel, stake, auto_cashout, reply } => {
                let result = self.state.place_bet(owner, panel, stake, auto_cashout);
                debug!(owner = %owner.short(), %panel, %stake, ok = result.is_ok(), "place bet");
                let _ = reply.send(result);
            }
            Command::CashOut { owner, panel, reply } => {
                let _ = reply.send(self.state.cash_out(owner, panel, now));
            }
            Command::SetAutoBet { owner, panel, auto_bet, reply } => {
                let _ = reply.send(self.state.set_auto_bet(owner, panel, auto_bet));
            }
            Command::Balance { owner, reply } => {
                let _ = reply.send(self.state.wallet.balance(&owner));
            }
        }
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        self.store
            .save_ledger(&self.state.wallet, &self.state.crash_history, &self.state.settlements)
    }
}

fn audit(record: &AuditRecord) {
    match record {
        AuditRecord::OverrideQueued { value, replaced } => {
            info!(target: "crash_round::audit", %value, replaced = ?replaced, "crash point override queued");
        }
        AuditRecord::CrashPointSealed { round, crash_point, source, token_fingerprint } => {
            info!(
                target: "crash_round::audit",
                round,
                %crash_point,
                source = ?source,
                token = %token_fingerprint,
                "crash point sealed"
            );
        }
        AuditRecord::ForceCrashed { round, at, scheduled } => {
            info!(target: "crash_round::audit", round, %at, %scheduled, "round force-crashed");
        }
        AuditRecord::ForceCrashIgnored { phase } => {
            info!(target: "crash_round::audit", %phase, "force-crash ignored, no live round");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::game::continuity::ContinuityRecord;
    use crate::game::generator::SeededEntropy;
    use crate::game::history::HistoryRecord;
    use crate::host::presenter::RecordingPresenter;
    use crate::host::store::JsonStore;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()
    }

    fn driver_at(store: JsonStore, now: DateTime<Utc>) -> RoundDriver<JsonStore, RecordingPresenter> {
        RoundDriver::new(
            RoundConfig::default(),
            store,
            RecordingPresenter::default(),
            Box::new(SeededEntropy::new(17)),
            now,
        )
    }

    fn after(ms: u64) -> DateTime<Utc> {
        t0() + chrono::Duration::milliseconds(ms as i64)
    }

    #[test]
    fn test_continuity_written_while_live_and_cleared_at_crash() {
        let mut driver = driver_at(JsonStore::in_memory(), t0());
        let admin = driver.handle().admin().clone();
        admin.override_crash_point(Multiplier::from_hundredths(150)).unwrap();

        driver.step(t0());
        driver.step(after(6_000));
        assert_eq!(driver.state().round.phase, RoundPhase::AcceptingBets);
        assert!(driver.store().load().is_none());

        driver.step(after(12_000));
        assert_eq!(driver.state().round.phase, RoundPhase::Active);
        let saved = driver.store().load().unwrap();
        assert_eq!(saved.crash_point, Multiplier::from_hundredths(150));
        assert_eq!(saved.round_start, after(12_000));

        let result = driver.step(after(12_000 + 60_000));
        assert!(result.round_ended);
        assert!(driver.store().load().is_none());
        let restored = driver.store().restore(50);
        assert_eq!(
            restored.crash_history.latest().map(|r: &HistoryRecord| r.crash_point),
            Some(Multiplier::from_hundredths(150))
        );
    }

    #[test]
    fn test_new_driver_rejoins_live_round() {
        let mut store = JsonStore::in_memory();
        store
            .save(&ContinuityRecord { round_start: t0(), crash_point: Multiplier::from_hundredths(800) })
            .unwrap();

        let driver = driver_at(store, after(3_000));

        assert_eq!(driver.state().round.phase, RoundPhase::Active);
        assert_eq!(driver.state().round.phase_start, t0());
    }

    #[test]
    fn test_new_driver_clears_stale_record() {
        let mut store = JsonStore::in_memory();
        store
            .save(&ContinuityRecord { round_start: t0(), crash_point: Multiplier::from_hundredths(110) })
            .unwrap();

        let driver = driver_at(store, after(600_000));

        assert_eq!(driver.state().round.phase, RoundPhase::AcceptingBets);
        assert!(driver.store().load().is_none());
    }

    #[test]
    fn test_balances_survive_restart() {
        let owner = ParticipantId::new([9; 16]);
        let mut driver = driver_at(JsonStore::in_memory(), t0());
        driver.state.place_bet(owner, Panel(1), Amount::from_units(40), None).unwrap();
        driver.step(t0());

        let RoundDriver { store, .. } = driver;
        let driver = driver_at(store, after(1_000));
        assert_eq!(driver.state().wallet.balance(&owner), Amount::from_units(4960));
    }

    #[test]
    fn test_notifications_reach_presenter() {
        let owner = ParticipantId::new([9; 16]);
        let mut driver = driver_at(JsonStore::in_memory(), t0());
        let _ = driver.state.place_bet(owner, Panel(1), Amount::ZERO, None);
        driver.step(t0());

        let notes = &driver.presenter().notifications;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].recipient, Some(owner));
        assert_eq!(notes[0].message, "Invalid bet amount.");
        assert_eq!(driver.presenter().frames.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_requests_applied_between_ticks() {
        let config = RoundConfig { betting_ms: 2_000, tick_rate: 100, ..RoundConfig::default() };
        let driver = RoundDriver::new(
            config,
            JsonStore::in_memory(),
            RecordingPresenter::default(),
            Box::new(SeededEntropy::new(3)),
            Utc::now(),
        );
        let handle = driver.handle();
        let task = tokio::spawn(driver.run());

        let owner = ParticipantId::random();
        handle.place_bet(owner, Panel(1), Amount::from_units(10), None).await.unwrap();
        assert_eq!(handle.balance(owner).await.unwrap(), Amount::from_units(4990));

        let err = handle.place_bet(owner, Panel(1), Amount::from_units(10), None).await.unwrap_err();
        assert!(matches!(err, DriverError::Bet(BetError::DuplicateBet(Panel(1)))));

        assert!(handle.cash_out(owner, Panel(1)).await.unwrap().is_none());

        handle.shutdown();
        task.await.unwrap().unwrap();

        assert!(matches!(handle.balance(owner).await, Err(DriverError::Closed)));
    }

    #[tokio::test]
    async fn test_phase_watch_follows_clock() {
        let config = RoundConfig { idle_ms: 50, betting_ms: 50, tick_rate: 200, ..RoundConfig::default() };
        let driver = RoundDriver::new(
            config,
            JsonStore::in_memory(),
            RecordingPresenter::default(),
            Box::new(SeededEntropy::new(4)),
            Utc::now(),
        );
        let handle = driver.handle();
        let mut phase = handle.phase();
        let task = tokio::spawn(driver.run());

        let went_live = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if phase.changed().await.is_err() {
                    return false;
                }
                if *phase.borrow() == RoundPhase::Active {
                    return true;
                }
            }
        })
        .await
        .unwrap_or(false);

        handle.shutdown();
        task.await.unwrap().unwrap();
        assert!(went_live);
    }
}
