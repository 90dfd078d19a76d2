//! Authoritative Round Tick
//!
//! One pass of the round clock. Pure over `RoundState`: the caller supplies
//! the wall-clock instant and any drained operator signals, and applies the
//! returned continuity effect to its store.
//!
//! ## Order within a tick
//!
//! 1. Drain operator signals
//! 2. Phase timeouts (Idle → AcceptingBets → Active, Terminated → Idle)
//! 3. Sample the live multiplier
//! 4. Auto-cashouts
//! 5. Live-table settlement
//! 6. Force-crash
//! 7. Crash check (multiplier >= crash point)

use chrono::{DateTime, Utc};

use crate::config::RoundConfig;
use crate::core::fixed::Multiplier;
use crate::core::hash::{derive_round_seed, token_fingerprint};
use crate::core::rng::DeterministicRng;
use crate::game::continuity::{ContinuityEffect, ContinuityRecord};
use crate::game::events::{AuditRecord, RoundEvent};
use crate::game::generator::generate_crash_point;
use crate::game::history::HistoryRecord;
use crate::game::live_table::LiveTable;
use crate::game::multiplier::multiplier_at;
use crate::game::signals::AdminSignal;
use crate::game::state::{Round, RoundPhase, RoundState};

/// Inputs of one tick.
#[derive(Debug, Clone)]
pub struct TickInput {
    /// Wall-clock instant of this tick.
    pub now: DateTime<Utc>,
    /// Operator signals drained since the last tick, oldest first.
    pub signals: Vec<AdminSignal>,
}

impl TickInput {
    /// A tick with no signals.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now, signals: Vec::new() }
    }
}

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick (including by calls since the last tick)
    pub events: Vec<RoundEvent>,
    /// Operator-facing records
    pub audit: Vec<AuditRecord>,
    /// Change to apply to the continuity store
    pub continuity: Option<ContinuityEffect>,
    /// Whether the round crashed this tick
    pub round_ended: bool,
}

/// Run one tick of the round clock.
pub fn tick(state: &mut RoundState, input: TickInput, config: &RoundConfig) -> TickResult {
    let now = input.now;
    let mut result = TickResult::default();

    // 1. Signals
    let mut force_crash = false;
    for signal in input.signals {
        match signal {
            AdminSignal::OverrideCrashPoint(value) => {
                let replaced = state.pending_override.replace(value);
                result.audit.push(AuditRecord::OverrideQueued { value, replaced });
            }
            AdminSignal::ForceCrash => force_crash = true,
        }
    }

    // 2. Phase timeouts
    advance_phase(state, now, config, &mut result);

    if state.round.phase != RoundPhase::Active {
        if force_crash {
            result.audit.push(AuditRecord::ForceCrashIgnored { phase: state.round.phase });
        }
        result.events = state.take_events();
        return result;
    }

    // 3. Sample
    let current = multiplier_at(state.round.phase_elapsed_ms(now));
    state.multiplier = current;
    // Nothing settles beyond the crash point, however far this tick jumped
    let reached = state.round.crash_point().map_or(current, |crash| current.min(crash));

    // 4. Auto-cashouts
    state.check_auto_cashouts(current, now);

    // 5. Live table
    state.live_table.settle(reached);

    // 6. Force-crash
    if force_crash {
        let scheduled = state.round.crash_point().unwrap_or(current);
        state.round.redefine_crash_point(reached);
        result.audit.push(AuditRecord::ForceCrashed {
            round: state.round.number,
            at: reached,
            scheduled,
        });
    }

    // 7. Crash check
    match state.round.crash_point() {
        Some(crash_point) if current >= crash_point => {
            terminate(state, crash_point, now, &mut result);
        }
        Some(_) => {}
        None => {
            // Active without a crash point cannot be produced by the clock;
            // crash at once rather than run unbounded.
            terminate(state, current, now, &mut result);
        }
    }

    result.events = state.take_events();
    result
}

fn advance_phase(
    state: &mut RoundState,
    now: DateTime<Utc>,
    config: &RoundConfig,
    result: &mut TickResult,
) {
    let elapsed = state.round.phase_elapsed_ms(now);
    match state.round.phase {
        RoundPhase::Idle if elapsed >= config.idle_ms => open_betting(state, now),
        RoundPhase::AcceptingBets if elapsed >= config.betting_ms => go_live(state, now, config, result),
        RoundPhase::Terminated if elapsed >= config.cooldown_ms => enter_idle(state, now),
        _ => {}
    }
}

/// Idle → AcceptingBets: a new round begins.
fn open_betting(state: &mut RoundState, now: DateTime<Utc>) {
    let from = state.round.phase;
    state.round = Round::open(state.round.number + 1, now);
    state.multiplier = Multiplier::ONE;
    state.live_table.clear();
    state.push_event(RoundEvent::PhaseChanged {
        round: state.round.number,
        from,
        to: RoundPhase::AcceptingBets,
    });
}

/// AcceptingBets → Active: seal the crash point and populate the table.
fn go_live(state: &mut RoundState, now: DateTime<Utc>, config: &RoundConfig, result: &mut TickResult) {
    let token = state.draw_token();
    let generated = generate_crash_point(&token, &mut state.pending_override, &config.generator);
    state.round.seal_crash_point(generated.crash_point);
    state.round.enter(RoundPhase::Active, now);
    state.multiplier = Multiplier::ONE;

    state.rng = DeterministicRng::new(derive_round_seed(&token));
    state.live_table = LiveTable::spawn(&mut state.rng, &config.live_table, state.ledger.bets());

    let crash_point = state.round.crash_point().unwrap_or(generated.crash_point);
    result.continuity = Some(ContinuityEffect::Save(ContinuityRecord {
        round_start: now,
        crash_point,
    }));
    result.audit.push(AuditRecord::CrashPointSealed {
        round: state.round.number,
        crash_point,
        source: generated.source,
        token_fingerprint: token_fingerprint(&token),
    });
    state.push_event(RoundEvent::PhaseChanged {
        round: state.round.number,
        from: RoundPhase::AcceptingBets,
        to: RoundPhase::Active,
    });
}

/// Active → Terminated: settle, record and clear.
fn terminate(state: &mut RoundState, crash_point: Multiplier, now: DateTime<Utc>, result: &mut TickResult) {
    state.round.enter(RoundPhase::Terminated, now);
    result.continuity = Some(ContinuityEffect::Clear);
    result.round_ended = true;

    state.settle_losses(crash_point, now);
    state.live_table.crash();
    state.crash_history.push(HistoryRecord { crash_point, at: now });
    state.ledger.clear();

    state.push_event(RoundEvent::RoundCrashed {
        round: state.round.number,
        crash_point,
    });
    state.push_event(RoundEvent::PhaseChanged {
        round: state.round.number,
        from: RoundPhase::Active,
        to: RoundPhase::Terminated,
    });

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(round = state.round.number, %crash_point, "round terminated");
}

/// Terminated → Idle: place standing auto-bets.
fn enter_idle(state: &mut RoundState, now: DateTime<Utc>) {
    state.round.enter(RoundPhase::Idle, now);
    state.push_event(RoundEvent::PhaseChanged {
        round: state.round.number,
        from: RoundPhase::Terminated,
        to: RoundPhase::Idle,
    });
    state.place_auto_bets();
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crate::core::fixed::Amount;
    use crate::game::generator::SeededEntropy;
    use crate::game::ledger::{AutoBet, BetKey, BetStatus};
    use crate::game::multiplier::elapsed_for;
    use crate::game::state::{Panel, ParticipantId};

    const ALICE: ParticipantId = ParticipantId::new([1; 16]);

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::milliseconds(n as i64)
    }

    /// Engine started one idle delay before `t0`, betting open at `t0`.
    fn fresh(config: &RoundConfig) -> RoundState {
        let started = t0() - ms(config.idle_ms);
        let mut state = RoundState::start(config, Box::new(SeededEntropy::new(42)), None, started).0;
        tick(&mut state, TickInput::at(t0()), config);
        state
    }

    /// Tick with an override so the round goes live at a known crash point.
    fn go_live_with(state: &mut RoundState, config: &RoundConfig, crash: Multiplier) -> (DateTime<Utc>, TickResult) {
        let live_at = state.round.phase_start + ms(config.betting_ms);
        let result = tick(
            state,
            TickInput { now: live_at, signals: vec![AdminSignal::OverrideCrashPoint(crash)] },
            config,
        );
        (live_at, result)
    }

    #[test]
    fn test_process_start_waits_idle_delay() {
        let config = RoundConfig::default();
        let (mut state, _) = RoundState::start(&config, Box::new(SeededEntropy::new(42)), None, t0());
        state.place_bet(ALICE, Panel(2), Amount::from_units(20), None).unwrap();

        tick(&mut state, TickInput::at(t0() + ms(config.idle_ms - 1)), &config);
        assert_eq!(state.round.phase, RoundPhase::Idle);

        let result = tick(&mut state, TickInput::at(t0() + ms(config.idle_ms)), &config);
        assert_eq!(state.round.phase, RoundPhase::AcceptingBets);
        assert_eq!(state.round.number, 1);
        assert!(result.events.iter().any(|e| matches!(
            e,
            RoundEvent::PhaseChanged { from: RoundPhase::Idle, to: RoundPhase::AcceptingBets, .. }
        )));
        // Bet placed before the first round rides into it
        assert!(state.ledger.get(&BetKey::new(ALICE, Panel(2))).is_some());
    }

    #[test]
    fn test_betting_window_opens_then_goes_live() {
        let config = RoundConfig::default();
        let mut state = fresh(&config);

        let early = tick(&mut state, TickInput::at(t0() + ms(config.betting_ms - 1)), &config);
        assert_eq!(state.round.phase, RoundPhase::AcceptingBets);
        assert!(early.continuity.is_none());

        let live = tick(&mut state, TickInput::at(t0() + ms(config.betting_ms)), &config);
        assert_eq!(state.round.phase, RoundPhase::Active);
        assert!(matches!(live.continuity, Some(ContinuityEffect::Save(_))));
        assert!(state.round.revealed_crash_point().is_none());
        assert!(!state.live_table.simulated().is_empty());
    }

    #[test]
    fn test_auto_cashout_round() {
        let config = RoundConfig::default();
        let mut state = fresh(&config);
        state
            .place_bet(ALICE, Panel(1), Amount::from_units(100), Some(Multiplier::from_hundredths(200)))
            .unwrap();

        let (live_at, _) = go_live_with(&mut state, &config, Multiplier::from_hundredths(350));

        // Step through the round at the configured tick period
        let step = ms(config.tick_interval_ms());
        let mut now = live_at;
        let mut ended = false;
        for _ in 0..10_000 {
            now += step;
            if tick(&mut state, TickInput::at(now), &config).round_ended {
                ended = true;
                break;
            }
        }

        assert!(ended);
        assert_eq!(state.round.revealed_crash_point(), Some(Multiplier::from_hundredths(350)));
        assert_eq!(state.wallet.balance(&ALICE), Amount::from_units(5100));
        let settled = state.settlements.latest().unwrap();
        assert_eq!(settled.payout, Amount::from_units(200));
        assert_eq!(settled.multiplier, Multiplier::from_hundredths(200));
        assert_eq!(state.crash_history.latest().unwrap().crash_point, Multiplier::from_hundredths(350));
    }

    #[test]
    fn test_instant_crash_loses_on_first_live_tick() {
        let config = RoundConfig::default();
        let mut state = fresh(&config);
        state.place_bet(ALICE, Panel(1), Amount::from_units(50), None).unwrap();

        let (_, result) = go_live_with(&mut state, &config, Multiplier::ONE);

        assert!(result.round_ended);
        assert_eq!(state.round.phase, RoundPhase::Terminated);
        assert_eq!(result.continuity, Some(ContinuityEffect::Clear));
        assert_eq!(state.wallet.balance(&ALICE), Amount::from_units(4950));
        assert!(result.events.iter().any(|e| matches!(
            e,
            RoundEvent::BetLost { owner, crash_point, .. }
                if *owner == ALICE && *crash_point == Multiplier::ONE
        )));
        assert!(state.ledger.is_empty());
    }

    #[test]
    fn test_override_used_once_and_not_announced() {
        let config = RoundConfig::default();
        let mut state = fresh(&config);

        let (live_at, result) = go_live_with(&mut state, &config, Multiplier::from_hundredths(500));

        assert!(!state.has_pending_override());
        assert!(result.audit.iter().any(|a| matches!(
            a,
            AuditRecord::CrashPointSealed { crash_point, .. }
                if *crash_point == Multiplier::from_hundredths(500)
        )));
        for event in &result.events {
            if let Some(note) = event.notification() {
                assert!(!note.message.contains("5.00"));
            }
        }

        let crash_at = live_at + ms(elapsed_for(Multiplier::from_hundredths(500)));
        let result = tick(&mut state, TickInput::at(crash_at), &config);
        assert!(result.round_ended);
        assert_eq!(state.round.revealed_crash_point(), Some(Multiplier::from_hundredths(500)));
    }

    #[test]
    fn test_latest_override_wins() {
        let config = RoundConfig::default();
        let mut state = fresh(&config);

        let signals = vec![
            AdminSignal::OverrideCrashPoint(Multiplier::from_hundredths(300)),
            AdminSignal::OverrideCrashPoint(Multiplier::from_hundredths(700)),
        ];
        tick(&mut state, TickInput { now: t0(), signals }, &config);
        let (_, result) = go_live_with(&mut state, &config, Multiplier::from_hundredths(900));

        assert_eq!(state.round.crash_point(), Some(Multiplier::from_hundredths(900)));
        assert!(result.audit.iter().any(|a| matches!(
            a,
            AuditRecord::OverrideQueued { replaced: Some(r), .. } if *r == Multiplier::from_hundredths(700)
        )));
    }

    #[test]
    fn test_force_crash_settles_due_auto_cashouts_first() {
        let config = RoundConfig::default();
        let mut state = fresh(&config);
        let bob = ParticipantId::new([2; 16]);
        state
            .place_bet(ALICE, Panel(1), Amount::from_units(10), Some(Multiplier::from_hundredths(300)))
            .unwrap();
        state
            .place_bet(bob, Panel(1), Amount::from_units(10), Some(Multiplier::from_hundredths(400)))
            .unwrap();

        let (live_at, _) = go_live_with(&mut state, &config, Multiplier::from_hundredths(1_000));
        let at = live_at + ms(elapsed_for(Multiplier::from_hundredths(327)));

        let result = tick(&mut state, TickInput { now: at, signals: vec![AdminSignal::ForceCrash] }, &config);

        assert!(result.round_ended);
        let crash = state.round.revealed_crash_point().unwrap();
        assert!(crash >= Multiplier::from_hundredths(327) && crash < Multiplier::from_hundredths(328));

        let alice = result.events.iter().position(|e| matches!(e, RoundEvent::CashedOut { owner, .. } if *owner == ALICE));
        let bob_lost = result.events.iter().position(|e| matches!(e, RoundEvent::BetLost { owner, .. } if *owner == bob));
        assert!(alice.unwrap() < bob_lost.unwrap());
        assert!(result.audit.iter().any(|a| matches!(a, AuditRecord::ForceCrashed { .. })));
    }

    #[test]
    fn test_tick_past_crash_point_pays_nothing_above_it() {
        let config = RoundConfig::default();
        let mut state = fresh(&config);
        let crash = Multiplier::from_hundredths(10_000);
        state
            .place_bet(ALICE, Panel(1), Amount::from_units(100), Some(Multiplier::from_hundredths(10_001)))
            .unwrap();

        let (live_at, _) = go_live_with(&mut state, &config, crash);
        let before = tick(&mut state, TickInput::at(live_at + ms(elapsed_for(crash) - 1)), &config);
        assert!(!before.round_ended);

        // One short tick carries the multiplier past both the crash point and the threshold
        let jump = live_at + ms(elapsed_for(Multiplier::from_hundredths(10_001)));
        let result = tick(&mut state, TickInput::at(jump), &config);

        assert!(result.round_ended);
        assert_eq!(state.round.revealed_crash_point(), Some(crash));
        assert!(!result.events.iter().any(|e| matches!(e, RoundEvent::CashedOut { .. })));
        assert_eq!(state.wallet.balance(&ALICE), Amount::from_units(4900));
        assert_eq!(state.settlements.latest().unwrap().payout, Amount::ZERO);
        assert!(state
            .live_table
            .simulated()
            .iter()
            .filter_map(|r| r.payout().map(|_| r.cashout_threshold))
            .all(|t| t <= crash));
    }

    #[test]
    fn test_force_crash_outside_active_is_dropped() {
        let config = RoundConfig::default();
        let mut state = fresh(&config);

        let result = tick(&mut state, TickInput { now: t0(), signals: vec![AdminSignal::ForceCrash] }, &config);
        assert_eq!(state.round.phase, RoundPhase::AcceptingBets);
        assert_eq!(
            result.audit,
            vec![AuditRecord::ForceCrashIgnored { phase: RoundPhase::AcceptingBets }]
        );

        // Not carried into the live round
        let (live_at, _) = go_live_with(&mut state, &config, Multiplier::from_hundredths(200));
        let result = tick(&mut state, TickInput::at(live_at + ms(100)), &config);
        assert!(!result.round_ended);
    }

    #[test]
    fn test_full_cycle_back_to_betting() {
        let config = RoundConfig::default();
        let mut state = fresh(&config);
        state
            .set_auto_bet(ALICE, Panel(2), Some(AutoBet { stake: Amount::from_units(5), auto_cashout: None }))
            .unwrap();

        let (live_at, _) = go_live_with(&mut state, &config, Multiplier::ONE);
        assert_eq!(state.round.phase, RoundPhase::Terminated);

        let idle_at = live_at + ms(config.cooldown_ms);
        tick(&mut state, TickInput::at(idle_at), &config);
        assert_eq!(state.round.phase, RoundPhase::Idle);
        assert_eq!(state.round.revealed_crash_point(), Some(Multiplier::ONE));
        let auto = state.ledger.get(&BetKey::new(ALICE, Panel(2))).unwrap();
        assert_eq!(auto.status, BetStatus::Pending);

        let open_at = idle_at + ms(config.idle_ms);
        tick(&mut state, TickInput::at(open_at), &config);
        assert_eq!(state.round.phase, RoundPhase::AcceptingBets);
        assert_eq!(state.round.number, 2);
        assert!(state.round.revealed_crash_point().is_none());
        // Bet placed during Idle rides into the new round
        assert!(state.ledger.get(&BetKey::new(ALICE, Panel(2))).is_some());
    }

    #[test]
    fn test_resumed_round_crashes_at_persisted_point() {
        let config = RoundConfig::default();
        let record = ContinuityRecord { round_start: t0(), crash_point: Multiplier::from_hundredths(250) };
        let crash_ms = elapsed_for(record.crash_point);

        let (mut state, effect) = RoundState::start(
            &config,
            Box::new(SeededEntropy::new(1)),
            Some(record),
            t0() + ms(crash_ms / 2),
        );
        assert!(effect.is_none());

        let before = tick(&mut state, TickInput::at(t0() + ms(crash_ms - 1)), &config);
        assert!(!before.round_ended);
        let at = tick(&mut state, TickInput::at(t0() + ms(crash_ms)), &config);
        assert!(at.round_ended);
        assert_eq!(at.continuity, Some(ContinuityEffect::Clear));
        assert_eq!(state.crash_history.latest().unwrap().crash_point, Multiplier::from_hundredths(250));
    }

    #[test]
    fn test_crash_history_bounded() {
        let config = RoundConfig::default();
        let mut state = fresh(&config);

        for _ in 0..60 {
            let (live_at, result) = go_live_with(&mut state, &config, Multiplier::ONE);
            assert!(result.round_ended);
            let idle_at = live_at + ms(config.cooldown_ms);
            tick(&mut state, TickInput::at(idle_at), &config);
            tick(&mut state, TickInput::at(idle_at + ms(config.idle_ms)), &config);
        }

        assert_eq!(state.crash_history.len(), 50);
    }
}
