//! Periodic scheduler driving the cycle controller.
//!
//! Runs one cycle immediately at startup, then on a fixed interval. A trigger
//! that fires while a cycle is still running is skipped, never queued: at
//! most one cycle is active at any time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::metrics;

use super::cycle::CycleController;
use super::types::{CycleError, CycleReport};

pub struct Scheduler {
    controller: Arc<CycleController>,
    period: Duration,
    /// Cleared on shutdown; the controller checks it between claims.
    keep_going: Arc<AtomicBool>,
    /// Guard enforcing at most one concurrent cycle.
    cycle_active: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(controller: Arc<CycleController>, period: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            controller,
            period,
            keep_going: Arc::new(AtomicBool::new(true)),
            cycle_active: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Run until [`stop`](Self::stop) is called: one immediate cycle, then
    /// one per period.
    pub async fn run(&self) {
        info!(
            period_secs = self.period.as_secs(),
            "scheduler started, running first cycle immediately"
        );
        self.trigger_cycle().await;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = tokio::time::interval(self.period);
        // Ticks elapsed while a cycle ran are dropped, not replayed.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a fresh interval completes immediately; the
        // immediate run above already covered it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if !self.keep_going.load(Ordering::Relaxed) {
                        break;
                    }
                    self.trigger_cycle().await;
                }
            }
        }

        info!("scheduler stopped");
    }

    /// Request a graceful stop: no further triggers fire, and an in-flight
    /// cycle finishes its current claim before returning.
    pub fn stop(&self) {
        self.keep_going.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Fire one trigger. Returns false if a cycle was still running and the
    /// trigger was skipped.
    pub async fn trigger_cycle(&self) -> bool {
        if self.cycle_active.swap(true, Ordering::SeqCst) {
            warn!("previous cycle still running, skipping trigger");
            return false;
        }

        let result = self.controller.run_cycle(&self.keep_going).await;
        self.cycle_active.store(false, Ordering::SeqCst);

        if let Err(e) = result {
            metrics::CYCLES_TOTAL.with_label_values(&["error"]).inc();
            error!(error = %e, "cycle failed");
        }

        true
    }

    /// Run exactly one cycle and return its report, bypassing recurring
    /// scheduling.
    pub async fn run_once(&self) -> Result<CycleReport, CycleError> {
        self.controller.run_cycle(&self.keep_going).await
    }
}
