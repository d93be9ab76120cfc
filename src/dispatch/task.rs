use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::capture::errors::ErrorDetails;

/// Which artifacts a capture should produce. At least one flag must be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOptions {
    pub png: bool,
    pub jpeg: bool,
    pub html: bool,
}

impl CaptureOptions {
    /// True when at least one output format is requested.
    pub fn any(&self) -> bool {
        self.png || self.jpeg || self.html
    }
}

/// A single queued capture request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureTask {
    /// Server-assigned task identifier (hyphenated lowercase UUID)
    pub task_id: String,

    /// URL to capture (non-empty, trimmed by the frontend)
    pub url: String,

    /// Validated filename fragments joined into the artifact name
    pub labels: Vec<String>,

    /// Optional caller-supplied correlation id, also a filename fragment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Requested output formats
    pub capture_options: CaptureOptions,

    /// Number of times this task has already been retried (0 on first attempt)
    pub retry_count: u32,
}

/// Outcome classification for one completed capture attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureStatus {
    Success,
    HttpError,
    Timeout,
    Failed,
}

/// Result of one capture attempt, as produced by the page capturer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    /// The task this result belongs to
    pub task: CaptureTask,

    /// Outcome classification
    pub status: CaptureStatus,

    /// Main-frame HTTP status code, when navigation produced a response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,

    /// Structured failure details; absent iff the capture succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,

    /// Paths of artifacts actually written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub png_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jpeg_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_path: Option<PathBuf>,

    /// Wall-clock time the attempt took, in milliseconds
    pub capture_processing_time_ms: u64,

    /// When the attempt finished (UTC)
    pub timestamp: DateTime<Utc>,

    /// Worker that executed the attempt
    pub worker_id: String,
}

impl CaptureResult {
    pub fn is_success(&self) -> bool {
        self.status == CaptureStatus::Success
    }
}

/// Worker lifecycle state as exposed over the status query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Error,
    Stopped,
}

/// Identifying subset of a task attached to an error record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    pub task_id: String,
    pub url: String,
    pub labels: Vec<String>,
}

impl From<&CaptureTask> for TaskRef {
    fn from(task: &CaptureTask) -> Self {
        Self {
            task_id: task.task_id.clone(),
            url: task.url.clone(),
            labels: task.labels.clone(),
        }
    }
}

/// One entry in a worker's bounded error history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub error_details: ErrorDetails,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskRef>,
}

/// By-value snapshot of a worker for status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInfo {
    pub id: String,
    pub browser_endpoint: String,
    pub status: WorkerStatus,
    pub processed_count: u64,
    pub error_count: u64,
    pub error_history: Vec<ErrorRecord>,
}

/// Task counts per queue partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
}
