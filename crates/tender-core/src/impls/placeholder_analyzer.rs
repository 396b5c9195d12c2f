//! PlaceholderAnalyzer - 解析ロジックが入るまでの仮実装
//!
//! ファイルの存在とサイズを確認して、設定された時間だけ待つだけ。

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::{Artifact, Outcome, TenderError};
use crate::ports::Analyzer;

#[derive(Debug, Clone)]
pub struct PlaceholderAnalyzer {
    delay: Duration,
}

impl PlaceholderAnalyzer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for PlaceholderAnalyzer {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Analyzer for PlaceholderAnalyzer {
    async fn analyze(&self, downloaded_file: &Path) -> Result<Outcome, TenderError> {
        match tokio::fs::metadata(downloaded_file).await {
            Ok(meta) => info!(
                file = %downloaded_file.display(),
                bytes = meta.len(),
                "analyzing file"
            ),
            // 入力が無くても失敗にはしない（analyze は寛容）
            Err(e) => warn!(
                file = %downloaded_file.display(),
                error = %e,
                "analyzing file that cannot be read"
            ),
        }

        tokio::time::sleep(self.delay).await;

        Ok(Outcome::success().with_artifact(Artifact::FilePath(downloaded_file.to_path_buf())))
    }
}
