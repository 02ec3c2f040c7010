//! Reconciliation scheduler
//!
//! Drives [`Reconciler::tick`] on a fixed interval, with the first tick at
//! startup, and on demand through [`Scheduler::trigger_reconcile`].

mod dispatch;
mod provisioner;
mod reconciler;
mod resolver;

pub use dispatch::Dispatcher;
pub use provisioner::{ProvisionedRoles, RoleProvisioner};
pub use reconciler::{plan_assignment, Reconciler, RoleChange, TeamTickSummary, TickSummary};
pub use resolver::{EntryResolver, Resolution};

use crate::config::SchedulerConfig;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Scheduler bookkeeping exposed through the status API
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    /// Ticks that completed, including no-op ticks
    pub ticks: u64,
    /// Ticks aborted by a roster or role lookup failure
    pub failed_ticks: u64,
    pub last_tick: Option<TickSummary>,
    pub last_error: Option<String>,
}

/// Scheduler state
pub struct Scheduler {
    config: SchedulerConfig,
    reconciler: Arc<Reconciler>,
    reconcile_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
    status: RwLock<SchedulerStatus>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(
        config: SchedulerConfig,
        reconciler: Arc<Reconciler>,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (reconcile_tx, reconcile_rx) = mpsc::channel(10);
        let (shutdown_tx, _) = watch::channel(false);

        let scheduler = Arc::new(Self {
            config,
            reconciler,
            reconcile_tx,
            shutdown_tx,
            status: RwLock::new(SchedulerStatus::default()),
        });

        (scheduler, reconcile_rx)
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Queue an immediate reconciliation. Returns false once the loop is gone.
    pub fn trigger_reconcile(&self) -> bool {
        match self.reconcile_tx.try_send(()) {
            Ok(()) => true,
            // A tick is already queued
            Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.status.read().running
    }

    /// Run the reconciliation loop until [`Scheduler::stop`] is called
    pub async fn start(self: Arc<Self>, mut reconcile_rx: mpsc::Receiver<()>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return;
        }

        let period = self.config.reconcile_interval().max(Duration::from_secs(1));
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.status.write().running = true;
        tracing::info!(interval_secs = period.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = interval.tick() => self.run_tick("interval").await,
                Some(_) = reconcile_rx.recv() => self.run_tick("trigger").await,
            }
        }

        self.status.write().running = false;
        tracing::info!("Scheduler stopped");
    }

    /// Stop the scheduler
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Run one tick outside the loop
    pub async fn reconcile_once(&self) {
        self.run_tick("manual").await;
    }

    async fn run_tick(&self, trigger: &'static str) {
        match self.reconciler.tick().await {
            Ok(summary) => {
                let mut status = self.status.write();
                status.ticks += 1;
                status.last_tick = Some(summary);
                status.last_error = None;
            }
            Err(e) => {
                tracing::warn!(trigger, error = %e, "Reconciliation tick skipped");
                let mut status = self.status.write();
                status.failed_ticks += 1;
                status.last_error = Some(e.to_string());
            }
        }
    }
}
