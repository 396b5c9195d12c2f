//! Claim markers and the path arithmetic around them.
//!
//! Naming:
//! - instruction: `<name>.json` in the watch directory
//! - claim marker: `<name>.json.lock` (same directory)
//! - done: `<done>/<name>.json`

use std::path::{Path, PathBuf};

/// Suffix an instruction file name must carry to be picked up.
pub const INSTRUCTION_SUFFIX: &str = ".json";

/// Suffix appended by a claim.
pub const CLAIM_SUFFIX: &str = ".lock";

pub fn is_instruction_name(name: &str) -> bool {
    name.len() > INSTRUCTION_SUFFIX.len() && name.ends_with(INSTRUCTION_SUFFIX)
}

/// `a.json` → `a.json.lock`
pub fn claim_name(instruction_name: &str) -> String {
    format!("{instruction_name}{CLAIM_SUFFIX}")
}

/// An instruction this process owns. Created only by a successful rename.
///
/// Not `Clone`: a claim is handed from the scheduler to exactly one worker and
/// consumed by relocation or release.
#[derive(Debug, PartialEq, Eq)]
pub struct ClaimedInstruction {
    claim_path: PathBuf,
    instruction_name: String,
}

impl ClaimedInstruction {
    pub(crate) fn new(claim_path: PathBuf, instruction_name: String) -> Self {
        Self {
            claim_path,
            instruction_name,
        }
    }

    /// Path of the `.lock` file.
    pub fn claim_path(&self) -> &Path {
        &self.claim_path
    }

    /// Original instruction file name, also the name used in the done store.
    pub fn instruction_name(&self) -> &str {
        &self.instruction_name
    }
}
