//! Daemon - 全体のワイヤリングと停止手順
//!
//! ```text
//! ClaimScheduler ──submit──▶ WorkerPool ──execute──▶ Dispatcher
//!      │                                                  │
//!      └── scan / claim (watch dir)      status / relocate (done dir)
//! ```
//!
//! # 停止
//! 1. `shutdown` がキャンセルされたら scheduler を止める（新しい claim をしない）
//! 2. pool を drain する
//! 3. `escalate` か `shutdown_grace` が先に来たら、未着手の claim を watch
//!    ディレクトリに戻して、実行中のものだけ待つ

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::builder::{AppBuilder, BuildError};
use super::dispatcher::Dispatcher;
use super::handlers::{FetchHandler, ProcessHandler};
use super::report::ShutdownReport;
use super::run_blocking;
use super::scheduler::ClaimScheduler;
use super::worker_pool::WorkerPool;
use crate::config::DaemonConfig;
use crate::domain::{AnalyzeTask, DownloadTask};
use crate::impls::{HttpFetcher, PlaceholderAnalyzer};
use crate::ports::{Analyzer, Fetcher, IdGenerator, SystemClock, UlidGenerator};
use crate::store::{InstructionStore, StoreError};
use crate::typed::Task;

pub struct Daemon {
    store: InstructionStore,
    dispatcher: Arc<Dispatcher>,
    scan_interval: Duration,
    workers: usize,
    shutdown_grace: Option<Duration>,
}

impl Daemon {
    /// Production wiring: HTTP fetcher and the placeholder analyzer.
    pub fn from_config(config: &DaemonConfig) -> Result<Self, BuildError> {
        Self::with_ports(
            config,
            Arc::new(HttpFetcher::new()),
            Arc::new(PlaceholderAnalyzer::new(config.analyze_delay)),
        )
    }

    pub fn with_ports(
        config: &DaemonConfig,
        fetcher: Arc<dyn Fetcher>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Result<Self, BuildError> {
        let store = InstructionStore::new(
            &config.watch_directory,
            &config.done_directory,
            &config.download_directory,
        );
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(SystemClock));

        let app = AppBuilder::new()
            .register::<DownloadTask, _>(FetchHandler::new(
                fetcher,
                store.clone(),
                Arc::clone(&ids),
                config.fetch_timeout,
            ))?
            .register::<AnalyzeTask, _>(ProcessHandler::new(analyzer))?
            .expect_tasks(&[DownloadTask::TYPE, AnalyzeTask::TYPE])
            .build()?;

        let dispatcher = Dispatcher::new(Arc::new(app.registry), store.clone(), ids);
        Ok(Self {
            store,
            dispatcher: Arc::new(dispatcher),
            scan_interval: config.scan_interval,
            workers: config.parallel_proc_max,
            shutdown_grace: config.shutdown_grace,
        })
    }

    pub fn store(&self) -> &InstructionStore {
        &self.store
    }

    /// Run until `shutdown` is cancelled, then drain. Cancelling `escalate`
    /// (or exceeding the configured grace period) during the drain hands
    /// queued claims back to the watch directory.
    ///
    /// Fails only if the directories cannot be created at startup.
    pub async fn run(
        &self,
        shutdown: CancellationToken,
        escalate: CancellationToken,
    ) -> Result<ShutdownReport, StoreError> {
        let store = self.store.clone();
        run_blocking(move || store.ensure_dirs())
            .await
            .map_err(|e| {
                StoreError::io(
                    "create dir",
                    self.store.watch_dir(),
                    std::io::Error::other(e.to_string()),
                )
            })??;
        info!(
            watch = %self.store.watch_dir().display(),
            done = %self.store.done_dir().display(),
            downloads = %self.store.download_dir().display(),
            workers = self.workers,
            "daemon started"
        );

        let pool = WorkerPool::spawn(self.workers, self.dispatcher.clone());
        let scheduler = ClaimScheduler::new(self.store.clone(), pool.handle(), self.scan_interval);
        scheduler.run(shutdown).await;

        info!("shutdown requested, draining");
        let grace = self.shutdown_grace;
        let report = pool
            .shutdown(async move {
                match grace {
                    Some(grace) => tokio::select! {
                        _ = escalate.cancelled() => {}
                        _ = tokio::time::sleep(grace) => info!("grace period elapsed"),
                    },
                    None => escalate.cancelled().await,
                }
            })
            .await;

        let mut released = Vec::with_capacity(report.unstarted.len());
        for claimed in report.unstarted {
            let store = self.store.clone();
            let name = claimed.instruction_name().to_string();
            match run_blocking(move || store.release(claimed)).await {
                Ok(Ok(path)) => released.push(path),
                Ok(Err(e)) => warn!(file = %name, error = %e, "could not release claim"),
                Err(e) => warn!(file = %name, error = %e, "could not release claim"),
            }
        }

        info!(
            succeeded = report.counts.succeeded,
            failed = report.counts.failed,
            released = released.len(),
            "daemon stopped"
        );
        Ok(ShutdownReport {
            counts: report.counts,
            escalated: report.escalated,
            released,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::handlers::test_ports::{RecordingAnalyzer, StaticFetcher};
    use crate::domain::{Outcome, TenderError};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    fn config(tmp: &TempDir, workers: usize) -> DaemonConfig {
        let root = tmp.path();
        DaemonConfig {
            watch_directory: root.join("watch"),
            done_directory: root.join("done"),
            download_directory: root.join("dl"),
            scan_interval: Duration::from_millis(20),
            parallel_proc_max: workers,
            fetch_timeout: Duration::from_secs(5),
            analyze_delay: Duration::ZERO,
            shutdown_grace: None,
            log_file: None,
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn download_then_analyze_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, 2);
        let analyzer = Arc::new(RecordingAnalyzer::default());
        let daemon = Daemon::with_ports(
            &config,
            Arc::new(StaticFetcher::ok(b"remote bytes")),
            analyzer.clone(),
        )
        .unwrap();
        daemon.store().ensure_dirs().unwrap();

        fs::write(
            config.watch_directory.join("a.json"),
            r#"{"id":"a","task":"download","url":"http://x/f.bin"}"#,
        )
        .unwrap();
        fs::write(
            config.watch_directory.join("b.json"),
            r#"{"id":"b","task":"analyze","downloadedFile":"/tmp/d/f.bin"}"#,
        )
        .unwrap();

        let shutdown = CancellationToken::new();
        let escalate = CancellationToken::new();
        let run = {
            let shutdown = shutdown.clone();
            let escalate = escalate.clone();
            async move { daemon.run(shutdown, escalate).await }
        };
        let done_dir = config.done_directory.clone();
        let (report, ()) = tokio::join!(run, async {
            wait_for(|| fs::read_dir(&done_dir).map(|d| d.count() == 3).unwrap_or(false)).await;
            shutdown.cancel();
        });
        let report = report.unwrap();

        assert_eq!(report.counts.succeeded, 3);
        assert!(!report.escalated);
        assert!(names(&config.watch_directory).is_empty());

        let done = names(&config.done_directory);
        assert!(done.contains(&"a.json".to_string()));
        assert!(done.contains(&"b.json".to_string()));
        let chain = done.iter().find(|n| n.starts_with("chain-")).expect("chained file");

        assert_eq!(read_json(&config.done_directory.join("a.json"))["status"], "success");
        assert_eq!(read_json(&config.done_directory.join("b.json"))["status"], "success");
        let chained = read_json(&config.done_directory.join(chain));
        assert_eq!(chained["task"], "analyze");
        assert_eq!(chained["id"], "a");
        assert_eq!(chained["status"], "success");

        let artifacts = names(&config.download_directory);
        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].starts_with("artifact-") && artifacts[0].ends_with(".bin"));

        let seen = analyzer.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&"/tmp/d/f.bin".to_string()));
    }

    /// Blocks until released, so the test controls what is in flight.
    struct GatedAnalyzer {
        gate: Notify,
        started: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Analyzer for GatedAnalyzer {
        async fn analyze(&self, _file: &Path) -> Result<Outcome, TenderError> {
            self.started.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Outcome::success())
        }
    }

    #[tokio::test]
    async fn escalation_releases_queued_claims() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, 1);
        let analyzer = Arc::new(GatedAnalyzer {
            gate: Notify::new(),
            started: Default::default(),
        });
        let daemon = Daemon::with_ports(
            &config,
            Arc::new(StaticFetcher::ok(b"x")),
            analyzer.clone(),
        )
        .unwrap();
        daemon.store().ensure_dirs().unwrap();
        for name in ["a.json", "b.json", "c.json"] {
            fs::write(
                config.watch_directory.join(name),
                r#"{"task":"analyze","downloadedFile":"/tmp/d/f.bin"}"#,
            )
            .unwrap();
        }

        let shutdown = CancellationToken::new();
        let escalate = CancellationToken::new();
        let run = {
            let shutdown = shutdown.clone();
            let escalate = escalate.clone();
            async move { daemon.run(shutdown, escalate).await }
        };
        let watch_dir = config.watch_directory.clone();
        let (report, ()) = tokio::join!(run, async {
            // 3 件とも claim され、1 件が実行中になるまで待つ
            wait_for(|| {
                analyzer.started.load(std::sync::atomic::Ordering::SeqCst) == 1
                    && names(&watch_dir).iter().all(|n| n.ends_with(".lock"))
            })
            .await;
            shutdown.cancel();
            escalate.cancel();
            tokio::time::sleep(Duration::from_millis(50)).await;
            analyzer.gate.notify_waiters();
        });
        let report = report.unwrap();

        assert!(report.escalated);
        assert_eq!(report.counts.succeeded, 1);
        assert_eq!(report.released.len(), 2);
        assert_eq!(names(&config.done_directory).len(), 1);
        let left = names(&config.watch_directory);
        assert_eq!(left.len(), 2);
        assert!(left.iter().all(|n| n.ends_with(".json")));
    }

    #[tokio::test]
    async fn grace_period_escalates_on_its_own() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp, 1);
        config.shutdown_grace = Some(Duration::ZERO);
        let analyzer = Arc::new(GatedAnalyzer {
            gate: Notify::new(),
            started: Default::default(),
        });
        let daemon = Daemon::with_ports(
            &config,
            Arc::new(StaticFetcher::ok(b"x")),
            analyzer.clone(),
        )
        .unwrap();
        daemon.store().ensure_dirs().unwrap();
        for name in ["a.json", "b.json"] {
            fs::write(config.watch_directory.join(name), r#"{"task":"analyze"}"#).unwrap();
        }

        let shutdown = CancellationToken::new();
        let run = {
            let shutdown = shutdown.clone();
            async move { daemon.run(shutdown, CancellationToken::new()).await }
        };
        let watch_dir = config.watch_directory.clone();
        let (report, ()) = tokio::join!(run, async {
            wait_for(|| {
                analyzer.started.load(std::sync::atomic::Ordering::SeqCst) == 1
                    && names(&watch_dir).iter().all(|n| n.ends_with(".lock"))
            })
            .await;
            shutdown.cancel();
            tokio::time::sleep(Duration::from_millis(50)).await;
            analyzer.gate.notify_waiters();
        });
        let report = report.unwrap();

        assert!(report.escalated);
        assert_eq!(report.released.len(), 1);
    }

    #[tokio::test]
    async fn unusable_watch_dir_fails_at_startup() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, "not a dir").unwrap();
        let mut config = config(&tmp, 1);
        config.watch_directory = blocker.join("watch");

        let daemon = Daemon::with_ports(
            &config,
            Arc::new(StaticFetcher::ok(b"x")),
            Arc::new(RecordingAnalyzer::default()),
        )
        .unwrap();
        let result = daemon
            .run(CancellationToken::new(), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }
}
