//! Typed payloads for the two task kinds.
//!
//! Fields are optional on purpose: a missing field is reported by the handler
//! as a failed Outcome rather than as a decode error.

use serde::{Deserialize, Serialize};

use super::ids::InstructionId;
use crate::typed::Task;

/// `task: "download"`: fetch `url` and chain an analyze instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<InstructionId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Task for DownloadTask {
    const TYPE: &'static str = "download";
}

/// `task: "analyze"`: process a previously downloaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<InstructionId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(
        default,
        rename = "downloadedFile",
        skip_serializing_if = "Option::is_none"
    )]
    pub downloaded_file: Option<String>,
}

impl AnalyzeTask {
    /// Placeholder used when `downloadedFile` is absent.
    pub const UNKNOWN_FILE: &'static str = "unknown";

    pub fn downloaded_file_or_default(&self) -> &str {
        self.downloaded_file.as_deref().unwrap_or(Self::UNKNOWN_FILE)
    }
}

impl Task for AnalyzeTask {
    const TYPE: &'static str = "analyze";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn analyze_task_reads_camel_case_field() {
        let task: AnalyzeTask = serde_json::from_value(json!({
            "id": "a",
            "task": "analyze",
            "downloadedFile": "/tmp/d/f.bin"
        }))
        .unwrap();
        assert_eq!(task.downloaded_file_or_default(), "/tmp/d/f.bin");
    }

    #[test]
    fn analyze_task_defaults_missing_file() {
        let task: AnalyzeTask = serde_json::from_value(json!({"task": "analyze"})).unwrap();
        assert_eq!(task.id, None);
        assert_eq!(task.downloaded_file_or_default(), AnalyzeTask::UNKNOWN_FILE);
    }

    #[test]
    fn download_task_tolerates_missing_fields() {
        let task: DownloadTask = serde_json::from_value(json!({"task": "download"})).unwrap();
        assert_eq!(task.url, None);
    }

    #[test]
    fn download_task_rejects_wrong_types() {
        let res: Result<DownloadTask, _> = serde_json::from_value(json!({"url": 5}));
        assert!(res.is_err());
    }
}
