//! Dispatcher - claimed instruction 1 件を最後まで処理する
//!
//! # フロー
//! 1. claim ファイルを読んで decode
//! 2. `task` で handler を選んで実行（別 tokio task、panic も捕捉）
//! 3. successor があれば watch ディレクトリに書き出す（download → analyze のみ）
//! 4. status を claim ファイルに書き戻す
//! 5. done ディレクトリへ移動（どんな結果でも必ず実行）

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::report::DispatchReport;
use super::run_blocking;
use super::worker_pool::ClaimExecutor;
use crate::domain::{Instruction, InstructionId, InstructionStatus, Outcome, TaskKind, TenderError};
use crate::ports::IdGenerator;
use crate::store::{ClaimedInstruction, INSTRUCTION_SUFFIX, InstructionStore};
use crate::typed::TypedRegistry;

pub struct Dispatcher {
    registry: Arc<TypedRegistry>,
    store: InstructionStore,
    ids: Arc<dyn IdGenerator>,
}

/// Result of decode + route + execute, before cleanup.
struct Routed {
    record: Option<Instruction>,
    kind: Option<TaskKind>,
    outcome: Outcome,
}

impl Routed {
    fn failed(record: Option<Instruction>, kind: Option<TaskKind>, err: TenderError) -> Self {
        Self {
            record,
            kind,
            outcome: Outcome::from(err),
        }
    }
}

impl Dispatcher {
    pub fn new(
        registry: Arc<TypedRegistry>,
        store: InstructionStore,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            registry,
            store,
            ids,
        }
    }

    /// Process one claim end to end. Never fails: every problem is recorded
    /// in the returned report and the file always leaves the watch directory.
    pub async fn dispatch(&self, claimed: ClaimedInstruction) -> DispatchReport {
        let instruction = claimed.instruction_name().to_string();
        info!(file = %instruction, "handling instruction");

        let Routed {
            record,
            kind,
            mut outcome,
        } = self.route(&claimed).await;

        // ここから下は後片付け。route の結果に関係なく必ず通る。
        let mut successor = None;
        if let Some(next) = outcome.successor.take() {
            match self.publish_successor(kind.as_ref(), next).await {
                Ok(path) => successor = Some(path),
                Err(e) => {
                    error!(file = %instruction, error = %e, "successor not written");
                    outcome = Outcome::from(e);
                }
            }
        }

        let status = outcome.status();
        let id: Option<InstructionId> = record.as_ref().and_then(Instruction::id);
        let status_bytes = record.and_then(|mut record| {
            record.set_status(status, outcome.reason.as_deref());
            record
                .encode()
                .inspect_err(|e| warn!(file = %instruction, error = %e, "status not encoded"))
                .ok()
        });
        let done_path = self.finish(claimed, status_bytes).await;

        let report = DispatchReport {
            instruction,
            id,
            kind,
            status,
            reason: outcome.reason,
            artifacts: outcome.artifacts,
            successor,
            done_path,
        };
        let kind_str = report.kind.as_ref().map(TaskKind::as_str).unwrap_or("-");
        match report.status {
            InstructionStatus::Success => info!(
                file = %report.instruction,
                kind = kind_str,
                artifacts = ?report.artifacts,
                "instruction succeeded"
            ),
            InstructionStatus::Error => warn!(
                file = %report.instruction,
                kind = kind_str,
                reason = report.reason.as_deref().unwrap_or_default(),
                "instruction failed"
            ),
        }
        report
    }

    async fn route(&self, claimed: &ClaimedInstruction) -> Routed {
        let bytes = match tokio::fs::read(claimed.claim_path()).await {
            Ok(bytes) => bytes,
            Err(e) => return Routed::failed(None, None, TenderError::Io(e)),
        };

        let record = match Instruction::decode(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(file = claimed.instruction_name(), error = %e, "malformed instruction");
                return Routed::failed(None, None, e);
            }
        };
        debug!(file = claimed.instruction_name(), record = %record.payload(), "decoded instruction");

        let Some(kind) = record.task() else {
            return Routed::failed(Some(record), None, TenderError::MissingTask);
        };
        let Some(handler) = self.registry.get(kind.as_str()) else {
            let err = TenderError::UnknownTask(kind.to_string());
            return Routed::failed(Some(record), Some(kind), err);
        };

        // handler は独立した task で動かす。panic しても後片付けは続行できる。
        let payload = record.payload();
        let outcome = match tokio::spawn(async move { handler.handle_dyn(payload).await }).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Outcome::from(e),
            Err(join) => {
                error!(file = claimed.instruction_name(), error = %join, "executor panicked");
                Outcome::from(TenderError::Panicked(join.to_string()))
            }
        };

        Routed {
            record: Some(record),
            kind: Some(kind),
            outcome,
        }
    }

    /// Write a successor into the watch directory if the chain allows it.
    async fn publish_successor(
        &self,
        from: Option<&TaskKind>,
        successor: Instruction,
    ) -> Result<PathBuf, TenderError> {
        let allowed = from.and_then(TaskKind::successor_kind);
        let to = successor.task();
        if allowed.is_none() || allowed != to {
            return Err(TenderError::Other(format!(
                "chain {} -> {} is not allowed",
                from.map(TaskKind::as_str).unwrap_or("-"),
                to.as_ref().map(TaskKind::as_str).unwrap_or("-"),
            )));
        }

        let bytes = successor.encode()?;
        let name = self.ids.generate_chain_id().file_name(INSTRUCTION_SUFFIX);
        let store = self.store.clone();
        let path = run_blocking(move || store.write_instruction(&name, &bytes)).await??;
        info!(id = ?successor.id(), path = %path.display(), "new task queued");
        Ok(path)
    }

    /// Persist the status (when there is a record to persist it on) and move
    /// the claim into the done store.
    async fn finish(
        &self,
        claimed: ClaimedInstruction,
        status_bytes: Option<Vec<u8>>,
    ) -> Option<PathBuf> {
        let store = self.store.clone();
        let name = claimed.instruction_name().to_string();
        let finished = run_blocking(move || {
            let written = match &status_bytes {
                Some(bytes) => store.write_back(&claimed, bytes),
                None => Ok(()),
            };
            (written, store.relocate(claimed))
        })
        .await;

        match finished {
            Ok((written, relocated)) => {
                if let Err(e) = written {
                    warn!(file = %name, error = %e, "status not persisted");
                }
                match relocated {
                    Ok(dest) => {
                        info!(file = %name, dest = %dest.display(), "moved processed file");
                        Some(dest)
                    }
                    Err(e) => {
                        error!(file = %name, error = %e, "could not move to done store");
                        None
                    }
                }
            }
            Err(e) => {
                error!(file = %name, error = %e, "could not move to done store");
                None
            }
        }
    }
}

#[async_trait]
impl ClaimExecutor for Dispatcher {
    async fn execute(&self, claimed: ClaimedInstruction) -> DispatchReport {
        self.dispatch(claimed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::handlers::test_ports::{RecordingAnalyzer, StaticFetcher};
    use crate::app::handlers::{FetchHandler, ProcessHandler};
    use crate::domain::{AnalyzeTask, Artifact, DownloadTask};
    use crate::ports::{SystemClock, UlidGenerator};
    use crate::typed::handler::test_handlers::PanicHandler;
    use crate::typed::task::test_tasks::PanicTask;
    use crate::typed::Handler;
    use serde_json::{Value, json};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        store: InstructionStore,
        dispatcher: Dispatcher,
        analyzer: Arc<RecordingAnalyzer>,
    }

    fn fixture(extra: impl FnOnce(&mut TypedRegistry)) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let store = InstructionStore::new(root.join("watch"), root.join("done"), root.join("dl"));
        store.ensure_dirs().unwrap();

        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(SystemClock));
        let analyzer = Arc::new(RecordingAnalyzer::default());
        let mut registry = TypedRegistry::new();
        registry
            .register::<DownloadTask, _>(FetchHandler::new(
                Arc::new(StaticFetcher::ok(b"remote bytes")),
                store.clone(),
                ids.clone(),
                Duration::from_secs(10),
            ))
            .unwrap();
        extra(&mut registry);
        if registry.get("analyze").is_none() {
            registry
                .register::<AnalyzeTask, _>(ProcessHandler::new(analyzer.clone()))
                .unwrap();
        }

        let dispatcher = Dispatcher::new(Arc::new(registry), store.clone(), ids);
        Fixture {
            _tmp: tmp,
            store,
            dispatcher,
            analyzer,
        }
    }

    fn claim(store: &InstructionStore, name: &str, body: &str) -> ClaimedInstruction {
        let path = store.watch_dir().join(name);
        fs::write(&path, body).unwrap();
        store.claim(&path).unwrap()
    }

    fn done_json(store: &InstructionStore, name: &str) -> Value {
        serde_json::from_slice(&fs::read(store.done_dir().join(name)).unwrap()).unwrap()
    }

    fn watch_entries(store: &InstructionStore) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(store.watch_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn download_writes_successor_and_marks_success() {
        let fx = fixture(|_| {});
        let claimed = claim(
            &fx.store,
            "a.json",
            r#"{"id":"a","task":"download","url":"http://x/f.bin"}"#,
        );

        let report = fx.dispatcher.dispatch(claimed).await;

        assert!(report.is_success());
        assert_eq!(report.id, Some(InstructionId::new("a")));
        assert_eq!(report.kind, Some(TaskKind::Download));
        assert_eq!(report.done_path, Some(fx.store.done_dir().join("a.json")));
        assert_eq!(done_json(&fx.store, "a.json")["status"], "success");
        assert!(report.artifacts.contains(&Artifact::Url("http://x/f.bin".into())));
        assert_eq!(report.artifacts.len(), 2);

        let successor = report.successor.expect("successor path");
        assert_eq!(watch_entries(&fx.store).len(), 1);
        let next: Value = serde_json::from_slice(&fs::read(&successor).unwrap()).unwrap();
        assert_eq!(next["task"], "analyze");
        assert_eq!(next["id"], "a");
        assert_eq!(next["url"], "http://x/f.bin");
        let artifact = next["downloadedFile"].as_str().unwrap();
        assert_eq!(fs::read(artifact).unwrap(), b"remote bytes");
    }

    #[tokio::test]
    async fn download_without_url_still_reaches_done() {
        let fx = fixture(|_| {});
        let claimed = claim(&fx.store, "a.json", r#"{"id":"a","task":"download"}"#);

        let report = fx.dispatcher.dispatch(claimed).await;

        assert_eq!(report.status, InstructionStatus::Error);
        assert!(report.successor.is_none());
        assert!(watch_entries(&fx.store).is_empty());
        let done = done_json(&fx.store, "a.json");
        assert_eq!(done["status"], "error");
        assert_eq!(done["error"], "missing 'url' in instruction");
    }

    #[tokio::test]
    async fn analyze_runs_the_analyzer() {
        let fx = fixture(|_| {});
        let claimed = claim(
            &fx.store,
            "b.json",
            r#"{"id":"b","task":"analyze","downloadedFile":"/tmp/d/f.bin"}"#,
        );

        let report = fx.dispatcher.dispatch(claimed).await;

        assert!(report.is_success());
        assert!(report.successor.is_none());
        assert_eq!(*fx.analyzer.seen.lock().unwrap(), vec!["/tmp/d/f.bin".to_string()]);
        assert_eq!(done_json(&fx.store, "b.json")["status"], "success");
    }

    #[tokio::test]
    async fn missing_or_unknown_task_skips_every_executor() {
        let fx = fixture(|_| {});
        let no_task = claim(&fx.store, "a.json", r#"{"id":"a","url":"http://x/f.bin"}"#);
        let unknown = claim(&fx.store, "b.json", r#"{"id":"b","task":"resize"}"#);

        let r1 = fx.dispatcher.dispatch(no_task).await;
        let r2 = fx.dispatcher.dispatch(unknown).await;

        assert_eq!(r1.status, InstructionStatus::Error);
        assert_eq!(r1.kind, None);
        assert_eq!(r2.status, InstructionStatus::Error);
        assert_eq!(r2.kind, Some(TaskKind::Unknown("resize".into())));
        assert!(r2.reason.unwrap().contains("resize"));

        assert!(fx.analyzer.seen.lock().unwrap().is_empty());
        assert!(watch_entries(&fx.store).is_empty());
        assert_eq!(done_json(&fx.store, "a.json")["status"], "error");
        assert_eq!(done_json(&fx.store, "b.json")["status"], "error");
    }

    #[tokio::test]
    async fn malformed_content_is_moved_untouched() {
        let fx = fixture(|_| {});
        let claimed = claim(&fx.store, "bad.json", "{ this is not json");

        let report = fx.dispatcher.dispatch(claimed).await;

        assert_eq!(report.status, InstructionStatus::Error);
        assert_eq!(report.id, None);
        assert_eq!(
            fs::read_to_string(fx.store.done_dir().join("bad.json")).unwrap(),
            "{ this is not json"
        );
        assert!(watch_entries(&fx.store).is_empty());
    }

    #[tokio::test]
    async fn done_dir_removed_at_runtime_is_recreated() {
        let fx = fixture(|_| {});
        let claimed = claim(&fx.store, "b.json", r#"{"id":"b","task":"analyze"}"#);
        fs::remove_dir_all(fx.store.done_dir()).unwrap();

        let report = fx.dispatcher.dispatch(claimed).await;

        assert_eq!(report.done_path, Some(fx.store.done_dir().join("b.json")));
        assert!(watch_entries(&fx.store).is_empty());
        assert_eq!(done_json(&fx.store, "b.json")["status"], "success");
    }

    #[tokio::test]
    async fn panicking_executor_is_contained() {
        let fx = fixture(|reg| reg.register::<PanicTask, _>(PanicHandler).unwrap());
        let claimed = claim(&fx.store, "p.json", r#"{"id":"p","task":"panic"}"#);

        let report = fx.dispatcher.dispatch(claimed).await;

        assert_eq!(report.status, InstructionStatus::Error);
        assert!(report.reason.unwrap().contains("panicked"));
        assert_eq!(done_json(&fx.store, "p.json")["status"], "error");
    }

    struct ChainingAnalyzeHandler;

    #[async_trait]
    impl Handler<AnalyzeTask> for ChainingAnalyzeHandler {
        async fn handle(&self, task: AnalyzeTask) -> Result<Outcome, TenderError> {
            Ok(Outcome::success().with_successor(Instruction::from_task(&task)?))
        }
    }

    #[tokio::test]
    async fn analyze_may_not_chain() {
        let fx = fixture(|reg| {
            reg.register::<AnalyzeTask, _>(ChainingAnalyzeHandler).unwrap()
        });
        let claimed = claim(&fx.store, "b.json", r#"{"id":"b","task":"analyze"}"#);

        let report = fx.dispatcher.dispatch(claimed).await;

        assert_eq!(report.status, InstructionStatus::Error);
        assert!(report.reason.unwrap().contains("not allowed"));
        assert!(report.successor.is_none());
        assert!(watch_entries(&fx.store).is_empty());
    }

    #[tokio::test]
    async fn unknown_fields_survive_the_status_write_back() {
        let fx = fixture(|_| {});
        let claimed = claim(
            &fx.store,
            "b.json",
            &json!({"id": "b", "task": "analyze", "owner": {"team": "ops"}}).to_string(),
        );

        fx.dispatcher.dispatch(claimed).await;

        let done = done_json(&fx.store, "b.json");
        assert_eq!(done["owner"]["team"], "ops");
        assert_eq!(done["status"], "success");
        assert!(done.get("error").is_none());
    }
}
