//! Outcome model: the explicit result of one executor call.
//!
//! Executors never raise past their own boundary. Everything they want the
//! dispatcher to know (success or failure, what was produced, what to chain
//! next) travels in an `Outcome`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::errors::TenderError;
use super::instruction::{Instruction, InstructionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
}

impl From<OutcomeKind> for InstructionStatus {
    fn from(kind: OutcomeKind) -> Self {
        match kind {
            OutcomeKind::Success => InstructionStatus::Success,
            OutcomeKind::Failure => InstructionStatus::Error,
        }
    }
}

/// A reference to something produced or used during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Artifact {
    /// Path to a file produced/used.
    FilePath(PathBuf),

    /// Remote resource the executor talked to.
    Url(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub artifacts: Vec<Artifact>,
    pub reason: Option<String>,

    /// Follow-up instruction for the dispatcher to write into the watch
    /// directory. Only `download` outcomes carry one.
    pub successor: Option<Instruction>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            kind: OutcomeKind::Success,
            artifacts: Vec::new(),
            reason: None,
            successor: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            artifacts: Vec::new(),
            reason: Some(reason.into()),
            successor: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_successor(mut self, successor: Instruction) -> Self {
        self.successor = Some(successor);
        self
    }

    pub fn status(&self) -> InstructionStatus {
        self.kind.into()
    }
}

impl From<TenderError> for Outcome {
    fn from(err: TenderError) -> Self {
        Outcome::failure(err.to_string())
    }
}
