//! Task executors: FetchHandler (download) と ProcessHandler (analyze)
//!
//! どちらも自分の失敗を Outcome::failure に変換してログに残します。
//! `Err` を Dispatcher まで上げることはありません。

use async_trait::async_trait;
use reqwest::Url;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::run_blocking;
use crate::domain::{
    AnalyzeTask, Artifact, DownloadTask, Instruction, Outcome, TenderError,
};
use crate::ports::{Analyzer, Fetcher, IdGenerator};
use crate::store::InstructionStore;
use crate::typed::Handler;

/// Extension used when the URL path has none.
pub const DEFAULT_EXTENSION: &str = ".bin";

/// download: fetch `url` into the download directory, then chain an analyze
/// instruction for the artifact.
pub struct FetchHandler {
    fetcher: Arc<dyn Fetcher>,
    store: InstructionStore,
    ids: Arc<dyn IdGenerator>,
    timeout: Duration,
}

impl FetchHandler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: InstructionStore,
        ids: Arc<dyn IdGenerator>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            ids,
            timeout,
        }
    }

    async fn download(&self, task: DownloadTask) -> Result<Outcome, TenderError> {
        let url = task.url.ok_or(TenderError::MissingField("url"))?;
        let id = task.id.ok_or(TenderError::MissingField("id"))?;

        let name = self
            .ids
            .generate_artifact_id()
            .file_name(&extension_from_url(&url));
        info!(%id, %url, file = %name, "downloading");

        let body = self.fetcher.fetch(&url, self.timeout).await?;
        if body.is_empty() {
            return Err(TenderError::Other(format!("empty response from {url}")));
        }

        let store = self.store.clone();
        let path = run_blocking(move || store.write_artifact(&name, &body)).await??;

        let successor = Instruction::from_task(&AnalyzeTask {
            id: Some(id.clone()),
            url: Some(url.clone()),
            downloaded_file: Some(path.to_string_lossy().into_owned()),
        })?;
        info!(%id, path = %path.display(), "download complete");

        Ok(Outcome::success()
            .with_artifact(Artifact::Url(url))
            .with_artifact(Artifact::FilePath(path))
            .with_successor(successor))
    }
}

#[async_trait]
impl Handler<DownloadTask> for FetchHandler {
    async fn handle(&self, task: DownloadTask) -> Result<Outcome, TenderError> {
        let id = task.id.clone();
        match self.download(task).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(id = ?id, error = %e, kind = ?e.kind(), "download failed");
                Ok(Outcome::from(e))
            }
        }
    }
}

/// analyze: hand the downloaded file to the analyzer.
pub struct ProcessHandler {
    analyzer: Arc<dyn Analyzer>,
}

impl ProcessHandler {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl Handler<AnalyzeTask> for ProcessHandler {
    async fn handle(&self, task: AnalyzeTask) -> Result<Outcome, TenderError> {
        let file = task.downloaded_file_or_default();
        info!(id = ?task.id, file, "analysis started");

        match self.analyzer.analyze(Path::new(file)).await {
            Ok(outcome) => {
                info!(id = ?task.id, file, "analysis complete");
                Ok(outcome)
            }
            Err(e) => {
                warn!(id = ?task.id, file, error = %e, "analysis failed");
                Ok(Outcome::from(e))
            }
        }
    }
}

/// `.ext` of the last path segment of `url`, or [`DEFAULT_EXTENSION`].
///
/// Query string and fragment never contribute to the extension.
pub fn extension_from_url(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let last = path.rsplit('/').next().unwrap_or_default();

    match Path::new(last).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!(".{ext}")
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}
