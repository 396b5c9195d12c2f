//! Fetcher port - リモートコンテンツの取得
//!
//! download タスクが使う外部機能。本番は `impls::HttpFetcher`（reqwest）、
//! テストでは固定レスポンスを返す実装に差し替えます。

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("http status {0}")]
    Status(u16),

    #[error("transport: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve the whole body of `url`, giving up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}
