//! Domain model (instruction records, typed tasks, ids, outcomes, errors).

pub mod errors;
pub mod ids;
pub mod instruction;
pub mod outcome;
pub mod tasks;

pub use self::errors::{ErrorKind, TenderError};
pub use self::ids::{ArtifactId, ChainId, InstructionId};
pub use self::instruction::{Instruction, InstructionStatus, TaskKind};
pub use self::outcome::{Artifact, Outcome, OutcomeKind};
pub use self::tasks::{AnalyzeTask, DownloadTask};
