//! Reports - 1 件の dispatch と shutdown の結果
//!
//! ログとテストのための読み取り専用ビュー。ファイルには書き出さない。

use std::path::PathBuf;

use crate::domain::{Artifact, InstructionId, InstructionStatus, TaskKind};

/// What happened to one claimed instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub instruction: String,
    pub id: Option<InstructionId>,
    pub kind: Option<TaskKind>,
    pub status: InstructionStatus,
    pub reason: Option<String>,
    /// Files and URLs the executor produced or touched.
    pub artifacts: Vec<Artifact>,
    /// Successor instruction written into the watch directory.
    pub successor: Option<PathBuf>,
    /// Where the file ended up. `None` only if relocation itself failed.
    pub done_path: Option<PathBuf>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.status == InstructionStatus::Success
    }
}

/// Per-pool counters, read at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounts {
    pub succeeded: usize,
    pub failed: usize,
    /// Dispatches that panicked. Their claim could not be relocated.
    pub crashed: usize,
}

/// Result of a daemon run, returned once the pool has stopped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShutdownReport {
    pub counts: PoolCounts,
    /// Drain was cut short and queued claims were cancelled.
    pub escalated: bool,
    /// Unstarted claims handed back to the watch directory.
    pub released: Vec<PathBuf>,
}
