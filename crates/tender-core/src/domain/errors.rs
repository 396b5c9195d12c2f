//! Errors - エラー型と分類
//!
//! instruction 1 件の処理中に起きるエラーはすべてここに集約し、
//! Dispatcher の境界で Outcome に変換されます（Scheduler / WorkerPool には伝播しない）。

use thiserror::Error;

use crate::ports::FetchError;
use crate::store::StoreError;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（ネットワークなど）
/// - Permanent: 恒久的なエラー（壊れた instruction など）
/// - Infrastructure: ファイルシステムの障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum TenderError {
    #[error("instruction decode: {0}")]
    Decode(String),

    #[error("missing '{0}' in instruction")]
    MissingField(&'static str),

    #[error("instruction has no task")]
    MissingTask,

    #[error("no handler for task '{0}'")]
    UnknownTask(String),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("executor panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl TenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TenderError::Decode(_)
            | TenderError::MissingField(_)
            | TenderError::MissingTask
            | TenderError::UnknownTask(_) => ErrorKind::Permanent,
            TenderError::Fetch(_) | TenderError::Panicked(_) | TenderError::Other(_) => {
                ErrorKind::Transient
            }
            TenderError::Store(_) | TenderError::Io(_) => ErrorKind::Infrastructure,
        }
    }
}
