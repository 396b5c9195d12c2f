//! Instruction store: watch / done / download directories on the filesystem.

mod claim;
mod fs_store;

pub use claim::{
    CLAIM_SUFFIX, ClaimedInstruction, INSTRUCTION_SUFFIX, claim_name, is_instruction_name,
};
pub use fs_store::InstructionStore;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The file disappeared before we could rename it (someone else claimed it).
    #[error("{} vanished before it could be claimed", .0.display())]
    Vanished(PathBuf),

    #[error("{} is already claimed", .0.display())]
    AlreadyClaimed(PathBuf),

    #[error("{} is not an instruction file", .0.display())]
    NotAnInstruction(PathBuf),

    #[error("{} already exists", .0.display())]
    Exists(PathBuf),

    #[error("{op} {location}: {source}", location = .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Lost a race with another claimer. Expected, not worth a warning.
    pub fn is_claim_conflict(&self) -> bool {
        matches!(self, StoreError::Vanished(_) | StoreError::AlreadyClaimed(_))
    }
}
