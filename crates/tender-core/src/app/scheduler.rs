//! ClaimScheduler - 定期的に watch ディレクトリを scan して claim する
//!
//! 1 tick = scan → 古い順に claim → WorkerPool へ submit。
//! tick は一度始めたら最後まで回す。shutdown は次の tick の前に見る。

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::run_blocking;
use super::worker_pool::{PoolError, PoolHandle};
use crate::store::{InstructionStore, StoreError};

/// What one scan-and-claim pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub candidates: usize,
    pub claimed: usize,
    /// Lost to another claimer or otherwise not claimable.
    pub skipped: usize,
    /// Claimed but handed back because the pool was closed.
    pub released: Vec<PathBuf>,
}

pub struct ClaimScheduler {
    store: InstructionStore,
    pool: PoolHandle,
    interval: Duration,
}

impl ClaimScheduler {
    pub fn new(store: InstructionStore, pool: PoolHandle, interval: Duration) -> Self {
        Self {
            store,
            pool,
            interval,
        }
    }

    /// Tick until `shutdown` is cancelled. The first tick runs immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            dir = %self.store.watch_dir().display(),
            interval_ms = self.interval.as_millis() as u64,
            "scheduler started"
        );
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        info!("scheduler stopped");
    }

    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let store = self.store.clone();
        let candidates = match run_blocking(move || store.scan()).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                warn!(error = %e, "scan failed");
                return report;
            }
            Err(e) => {
                warn!(error = %e, "scan failed");
                return report;
            }
        };
        report.candidates = candidates.len();
        if candidates.is_empty() {
            return report;
        }
        debug!(count = candidates.len(), "found instruction files");

        for path in candidates {
            let store = self.store.clone();
            let claimed = match run_blocking(move || store.claim(&path)).await {
                Ok(Ok(claimed)) => claimed,
                Ok(Err(e)) => {
                    report.skipped += 1;
                    log_claim_error(&e);
                    continue;
                }
                Err(e) => {
                    report.skipped += 1;
                    warn!(error = %e, "claim failed");
                    continue;
                }
            };

            debug!(file = claimed.instruction_name(), "claimed");
            match self.pool.submit(claimed) {
                Ok(()) => report.claimed += 1,
                Err(PoolError::Closed(claimed)) => {
                    let store = self.store.clone();
                    match run_blocking(move || store.release(claimed)).await {
                        Ok(Ok(path)) => {
                            info!(path = %path.display(), "released claim, pool closed");
                            report.released.push(path);
                        }
                        Ok(Err(e)) => warn!(error = %e, "could not release claim"),
                        Err(e) => warn!(error = %e, "could not release claim"),
                    }
                }
            }
        }

        if report.claimed > 0 {
            info!(
                candidates = report.candidates,
                claimed = report.claimed,
                skipped = report.skipped,
                "tick"
            );
        }
        report
    }
}

fn log_claim_error(e: &StoreError) {
    if e.is_claim_conflict() {
        debug!(error = %e, "claimed elsewhere");
    } else {
        warn!(error = %e, "claim failed");
    }
}
