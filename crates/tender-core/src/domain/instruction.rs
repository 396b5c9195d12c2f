//! Instruction record: the JSON object stored in an instruction file.
//!
//! The record is kept as a raw JSON object so that fields the daemon does not
//! know about survive the status write-back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::errors::TenderError;
use super::ids::InstructionId;
use crate::typed::Task;

/// Task kind parsed from the `task` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Download,
    Analyze,
    Unknown(String),
}

impl TaskKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "download" => TaskKind::Download,
            "analyze" => TaskKind::Analyze,
            other => TaskKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskKind::Download => "download",
            TaskKind::Analyze => "analyze",
            TaskKind::Unknown(s) => s,
        }
    }

    /// The only kind an instruction of this kind may chain into.
    ///
    /// download → analyze → (none). No cycles, no fan-out.
    pub fn successor_kind(&self) -> Option<TaskKind> {
        match self {
            TaskKind::Download => Some(TaskKind::Analyze),
            TaskKind::Analyze | TaskKind::Unknown(_) => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status written back onto a dispatched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionStatus {
    Success,
    Error,
}

impl fmt::Display for InstructionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionStatus::Success => f.write_str("success"),
            InstructionStatus::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    fields: Map<String, Value>,
}

impl Instruction {
    /// Decode file content. Anything other than a JSON object is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, TenderError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| TenderError::Decode(e.to_string()))?;
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(TenderError::Decode(format!(
                "expected a JSON object, found {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Build a record from a typed task, tagging it with `T::TYPE`.
    pub fn from_task<T: Task>(task: &T) -> Result<Self, TenderError> {
        let value = serde_json::to_value(task).map_err(|e| TenderError::Decode(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(TenderError::Decode(format!(
                "task {} did not serialize to an object",
                T::TYPE
            )));
        };
        fields.insert("task".to_string(), Value::String(T::TYPE.to_string()));
        Ok(Self { fields })
    }

    pub fn id(&self) -> Option<InstructionId> {
        self.fields
            .get("id")
            .and_then(Value::as_str)
            .map(InstructionId::new)
    }

    /// `None` when the `task` field is absent or null. A non-string value is
    /// reported as an unknown kind.
    pub fn task(&self) -> Option<TaskKind> {
        match self.fields.get("task")? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(TaskKind::parse(s)),
            other => Some(TaskKind::Unknown(other.to_string())),
        }
    }

    pub fn status(&self) -> Option<InstructionStatus> {
        self.fields
            .get("status")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The record as a JSON value, for typed decoding by a handler.
    pub fn payload(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Attach the terminal status. `reason` is stored under `error` and any
    /// stale reason from a previous write is removed.
    pub fn set_status(&mut self, status: InstructionStatus, reason: Option<&str>) {
        self.fields.insert(
            "status".to_string(),
            Value::String(status.to_string()),
        );
        match reason {
            Some(reason) => {
                self.fields
                    .insert("error".to_string(), Value::String(reason.to_string()));
            }
            None => {
                self.fields.remove("error");
            }
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TenderError> {
        serde_json::to_vec_pretty(&self.fields).map_err(|e| TenderError::Decode(e.to_string()))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
