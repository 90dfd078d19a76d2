//! Crash Round Server
//!
//! Runs the round engine against the JSON state file, with a demo
//! participant betting on every round. Stops on Ctrl-C.

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crash_round::{
    game::{ledger::AutoBet, UuidEntropy},
    Amount, JsonStore, Multiplier, Panel, ParticipantId, RoundConfig, RoundDriver, RoundHandle,
    RoundPhase, TracingPresenter, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    let config = RoundConfig::from_env().context("invalid configuration")?;

    info!("Crash Round Server v{}", VERSION);
    info!("Tick Rate: {} Hz", config.tick_rate);
    info!("State file: {}", config.state_path.display());

    let store = JsonStore::open(&config.state_path)
        .with_context(|| format!("opening {}", config.state_path.display()))?;
    let presenter = TracingPresenter::new(config.tick_rate as u64);
    let driver = RoundDriver::new(config, store, presenter, Box::new(UuidEntropy), Utc::now());
    let handle = driver.handle();

    let loop_task = tokio::spawn(driver.run());
    let demo_task = tokio::spawn(demo_participant(handle.clone()));

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Ctrl-C received, stopping");
    handle.shutdown();
    demo_task.abort();

    loop_task.await.context("round loop panicked")??;
    Ok(())
}

/// Bets on every round: a standing auto-bet on panel 1, and a manual bet on
/// panel 2 cashed out two seconds into the climb.
async fn demo_participant(handle: RoundHandle) {
    let me = ParticipantId::random();
    info!("Demo participant {}", me.short());

    let auto_bet = AutoBet {
        stake: Amount::from_units(10),
        auto_cashout: Some(Multiplier::from_hundredths(150)),
    };
    if let Err(e) = handle.set_auto_bet(me, Panel(1), Some(auto_bet)).await {
        warn!(error = %e, "demo auto-bet refused");
    }

    let mut phase = handle.phase();
    loop {
        if phase.changed().await.is_err() {
            return;
        }
        let current = *phase.borrow();
        match current {
            RoundPhase::AcceptingBets => {
                if let Err(e) = handle.place_bet(me, Panel(2), Amount::from_units(25), None).await {
                    warn!(error = %e, "demo bet refused");
                }
            }
            RoundPhase::Active => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                match handle.cash_out(me, Panel(2)).await {
                    Ok(Some(settled)) => info!("Demo cashed out {} at {}", settled.payout, settled.multiplier),
                    Ok(None) => {}
                    Err(_) => return,
                }
                if let Ok(balance) = handle.balance(me).await {
                    info!("Demo balance {}", balance);
                }
            }
            RoundPhase::Idle | RoundPhase::Terminated => {}
        }
    }
}
