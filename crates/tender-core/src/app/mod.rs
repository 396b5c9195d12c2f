//! App - アプリケーション層
//!
//! ports と store を組み合わせて daemon を構成します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: handler の登録と起動時検証
//! - **handlers**: FetchHandler / ProcessHandler
//! - **Dispatcher**: decode → route → execute → status → successor → relocate
//! - **WorkerPool**: 固定数ワーカーと二段階 shutdown
//! - **ClaimScheduler**: scan → claim → submit のループ
//! - **Daemon**: 全体のワイヤリングと停止手順

pub mod builder;
pub mod daemon;
pub mod dispatcher;
pub mod handlers;
pub mod report;
pub mod scheduler;
pub mod worker_pool;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::daemon::Daemon;
pub use self::dispatcher::Dispatcher;
pub use self::handlers::{FetchHandler, ProcessHandler};
pub use self::report::{DispatchReport, PoolCounts, ShutdownReport};
pub use self::scheduler::{ClaimScheduler, TickReport};
pub use self::worker_pool::{ClaimExecutor, PoolError, PoolHandle, PoolReport, WorkerPool};

use crate::domain::TenderError;

/// Run blocking filesystem work off the async workers.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, TenderError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TenderError::Panicked(e.to_string()))
}
