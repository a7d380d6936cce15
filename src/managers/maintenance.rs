//! Periodic maintenance: role grants for verified sessions, then garbage
//! collection of expired ones.
//!
//! A ticker task emits tick events on a bounded channel and a single worker
//! consumes them, so a sweep always runs to completion before the next one
//! starts and the poller never races the collector. Ticks that arrive while a
//! sweep is still running are dropped. Shutdown stops the ticker; the worker
//! finishes the sweep in progress and discards any tick still queued.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::garbage_collector::GarbageCollector;
use super::poller::{PollReport, VerificationPoller};
use crate::error::Result;

/// What one maintenance tick did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub poll: PollReport,
    pub collected: usize,
}

pub struct Maintenance {
    poller: VerificationPoller,
    gc: GarbageCollector,
}

impl Maintenance {
    pub fn new(poller: VerificationPoller, gc: GarbageCollector) -> Self {
        Self { poller, gc }
    }

    /// Run one poll sweep followed by one GC sweep.
    ///
    /// Both sweeps always run; the first store-level failure is returned.
    pub async fn tick(&self) -> Result<TickReport> {
        let poll = self.poller.sweep().await;
        let collected = self.gc.sweep().await;

        Ok(TickReport {
            poll: poll?,
            collected: collected?,
        })
    }
}

pub type SharedMaintenance = Arc<Maintenance>;

/// Start the ticker and worker tasks. The returned handle completes after
/// `shutdown` flips to true and the current sweep has finished.
pub fn start(
    maintenance: SharedMaintenance,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(
        "Sleeping {} seconds between maintenance iterations",
        interval.as_secs()
    );

    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(run_ticker(interval, tx, shutdown.clone()));
    tokio::spawn(run_worker(maintenance, rx, shutdown))
}

async fn run_ticker(period: Duration, ticks: mpsc::Sender<Instant>, mut shutdown: watch::Receiver<bool>) {
    // First sweep one period after connecting, once the role cache is built
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            at = interval.tick() => {
                match ticks.try_send(at) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!("Maintenance sweep still running, dropping tick");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Maintenance ticker stopped");
}

/// Consume ticks until the ticker goes away or shutdown is requested
pub async fn run_worker(
    maintenance: SharedMaintenance,
    mut ticks: mpsc::Receiver<Instant>,
    shutdown: watch::Receiver<bool>,
) {
    while ticks.recv().await.is_some() {
        if *shutdown.borrow() {
            debug!("Shutdown requested, discarding queued tick");
            break;
        }
        match maintenance.tick().await {
            Ok(report) => {
                if report != TickReport::default() {
                    info!(
                        "Maintenance: granted {}, skipped {}, failed {}, collected {}",
                        report.poll.granted, report.poll.skipped, report.poll.failed, report.collected
                    );
                }
            }
            Err(e) if e.is_storage() => {
                error!("Session store unavailable, retrying next tick: {}", e);
            }
            Err(e) => {
                error!("Maintenance sweep aborted: {}", e);
            }
        }
    }

    info!("Maintenance loop stopped");
}
