//! Background expiry sweeper.
//!
//! Runs [`ReservationEngine::sweep_expired`] once on startup and then every
//! `period`, or earlier when triggered. Shutdown is only observed between
//! sweeps, so an in-flight sweep transaction always completes.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::ReservationEngine;

/// Config for the expiry sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirySweeper {
    pub period: Duration,
}

impl Default for ExpirySweeper {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
        }
    }
}

/// Handle for the running sweeper (shutdown + trigger hook).
#[derive(Debug)]
pub struct ExpirySweeperHandle {
    shutdown: watch::Sender<bool>,
    trigger: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl ExpirySweeperHandle {
    /// Request a sweep ahead of the next tick.
    ///
    /// Triggers are coalesced: while one is pending further calls are no-ops.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Stop the sweeper and wait for its current sweep, if any, to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.join.await {
            warn!(error = %err, "expiry sweeper task ended abnormally");
        }
    }
}

impl ExpirySweeper {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Spawn the sweep loop on the current tokio runtime.
    pub fn spawn(&self, name: &'static str, engine: ReservationEngine) -> ExpirySweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        let join = tokio::spawn(sweep_loop(
            name,
            self.period,
            engine,
            shutdown_rx,
            trigger_rx,
        ));

        ExpirySweeperHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join,
        }
    }
}

async fn sweep_loop(
    name: &'static str,
    period: Duration,
    engine: ReservationEngine,
    mut shutdown_rx: watch::Receiver<bool>,
    mut trigger_rx: mpsc::Receiver<()>,
) {
    info!(sweeper = name, period_ms = period.as_millis() as u64, "expiry sweeper started");

    // First tick completes immediately: sweep once on startup.
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Shutdown has priority.
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
            Some(()) = trigger_rx.recv() => {
                debug!(sweeper = name, "sweep triggered");
            }
        }

        match engine.sweep_expired().await {
            Ok(released) => {
                if !released.is_empty() {
                    debug!(sweeper = name, released = released.len(), "sweep completed");
                }
            }
            Err(err) => {
                // Next tick retries; nothing to propagate to.
                warn!(sweeper = name, error = %err, "expiry sweep failed");
            }
        }
    }

    info!(sweeper = name, "expiry sweeper stopped");
}
