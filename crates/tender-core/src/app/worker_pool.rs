//! WorkerPool - 固定数のワーカーで claim を実行する
//!
//! - `submit()` は内部キューに積むだけで待たない（Scheduler を止めない）
//! - 同時実行数はワーカー数 N で決まる
//! - shutdown は二段階:
//!   1. drain: 受付を止め、キューに残っている分も含めて全部終わらせる
//!   2. cancel queued: 実行中のものだけ待ち、未着手の claim は呼び出し側に返す

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::report::{DispatchReport, PoolCounts};
use crate::store::ClaimedInstruction;

/// Runs one claim to completion. Implemented by the Dispatcher.
#[async_trait]
pub trait ClaimExecutor: Send + Sync + 'static {
    async fn execute(&self, claimed: ClaimedInstruction) -> DispatchReport;
}

#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool no longer accepts work. The claim is handed back untouched.
    #[error("worker pool is shutting down")]
    Closed(ClaimedInstruction),
}

type Queue = Arc<Mutex<mpsc::UnboundedReceiver<ClaimedInstruction>>>;

#[derive(Default)]
struct Counters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    crashed: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> PoolCounts {
        PoolCounts {
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            crashed: self.crashed.load(Ordering::SeqCst),
        }
    }
}

/// Submission side of the pool, cheap to clone.
#[derive(Clone)]
pub struct PoolHandle {
    tx: mpsc::UnboundedSender<ClaimedInstruction>,
    closing: CancellationToken,
}

impl PoolHandle {
    pub fn submit(&self, claimed: ClaimedInstruction) -> Result<(), PoolError> {
        if self.closing.is_cancelled() {
            return Err(PoolError::Closed(claimed));
        }
        self.tx.send(claimed).map_err(|e| PoolError::Closed(e.0))
    }
}

/// What the pool did before it stopped.
#[derive(Debug)]
pub struct PoolReport {
    pub counts: PoolCounts,
    pub escalated: bool,
    /// Claims that were queued but never started.
    pub unstarted: Vec<ClaimedInstruction>,
}

pub struct WorkerPool {
    handle: PoolHandle,
    queue: Queue,
    cancel: CancellationToken,
    workers: JoinSet<()>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Spawn `n` workers (at least one) on the current runtime.
    pub fn spawn(n: usize, executor: Arc<dyn ClaimExecutor>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue: Queue = Arc::new(Mutex::new(rx));
        let closing = CancellationToken::new();
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        let mut workers = JoinSet::new();
        for worker_id in 0..n.max(1) {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&executor),
                closing.clone(),
                cancel.clone(),
                Arc::clone(&counters),
            ));
        }
        info!(workers = n.max(1), "worker pool started");

        Self {
            handle: PoolHandle { tx, closing },
            queue,
            cancel,
            workers,
            counters,
        }
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    pub fn counts(&self) -> PoolCounts {
        self.counters.snapshot()
    }

    /// Stop accepting work and drain. If `escalate` completes before the
    /// drain does, queued claims are cancelled and only in-flight work is
    /// awaited. Returns once every worker has exited.
    pub async fn shutdown(mut self, escalate: impl Future<Output = ()>) -> PoolReport {
        self.handle.closing.cancel();
        info!("worker pool draining");

        let escalated = tokio::select! {
            _ = join_all(&mut self.workers) => false,
            _ = escalate => true,
        };
        if escalated {
            info!("worker pool cancelling queued work");
            self.cancel.cancel();
            join_all(&mut self.workers).await;
        }

        let mut unstarted = Vec::new();
        let mut rx = self.queue.lock().await;
        rx.close();
        while let Ok(claimed) = rx.try_recv() {
            unstarted.push(claimed);
        }

        let counts = self.counters.snapshot();
        info!(
            succeeded = counts.succeeded,
            failed = counts.failed,
            crashed = counts.crashed,
            unstarted = unstarted.len(),
            "worker pool stopped"
        );
        PoolReport {
            counts,
            escalated,
            unstarted,
        }
    }
}

async fn join_all(workers: &mut JoinSet<()>) {
    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "worker exited abnormally");
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Queue,
    executor: Arc<dyn ClaimExecutor>,
    closing: CancellationToken,
    cancel: CancellationToken,
    counters: Arc<Counters>,
) {
    loop {
        let claimed = {
            let mut rx = queue.lock().await;
            // biased: cancel > 受信 > closing の順に見る。
            // closing 後も recv はキューに残っている分を返し、空になると None。
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(claimed) => claimed,
                    None => break,
                },
                _ = closing.cancelled() => {
                    rx.close();
                    continue;
                }
            }
        };

        debug!(worker_id, file = claimed.instruction_name(), "worker picked up claim");

        // 1 件ごとに task を分けて、executor の panic がワーカーを殺さないようにする
        let executor = Arc::clone(&executor);
        match tokio::spawn(async move { executor.execute(claimed).await }).await {
            Ok(report) if report.is_success() => {
                counters.succeeded.fetch_add(1, Ordering::SeqCst);
            }
            Ok(_) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                counters.crashed.fetch_add(1, Ordering::SeqCst);
                error!(worker_id, error = %e, "dispatch crashed");
            }
        }
    }
    debug!(worker_id, "worker stopped");
}
