//! Analyzer port - analyze タスクの中身
//!
//! 解析ロジックはまだ placeholder。差し替え可能にするため trait にしています。

use async_trait::async_trait;
use std::path::Path;

use crate::domain::{Outcome, TenderError};

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, downloaded_file: &Path) -> Result<Outcome, TenderError>;
}
