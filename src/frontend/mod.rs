//! Submission validation and status assembly.
//!
//! Sits between the HTTP transport and the worker pool: validates
//! payloads, assigns task ids, and turns pool state into the status
//! query response. Validation failures are in-band acknowledgements;
//! only pool unavailability is a transport-level signal.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::capture::filename::validate_filename_fragment;
use crate::dispatch::pool::WorkerPool;
use crate::dispatch::task::{CaptureOptions, CaptureTask, WorkerInfo};

/// Logical submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub url: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub capture_options: CaptureOptions,
}

/// Acceptance acknowledgement returned to submitters. On rejection
/// `accepted` is false, `task_id` is empty and `error` carries the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAck {
    pub accepted: bool,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What the transport should send back for a submission.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// In-band acknowledgement, accepted or rejected
    Ack(SubmitAck),
    /// Transport-level unavailability: pool down or no healthy workers
    Unavailable,
}

/// Status query response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub healthy_workers: usize,
    pub total_workers: usize,
    pub is_running: bool,
    pub workers: Vec<WorkerInfo>,
}

pub struct SubmissionFrontend {
    pool: Arc<WorkerPool>,
}

impl SubmissionFrontend {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    /// Validate a submission and enqueue it. Validation order is part of
    /// the API: first failure wins.
    pub async fn submit(&self, request: SubmitRequest) -> SubmitOutcome {
        let url = request.url.trim().to_string();
        if url.is_empty() {
            return rejection("url is required");
        }
        // A URL the browser cannot even parse would only burn retry
        // attempts; refuse it up front
        if let Err(e) = Url::parse(&url) {
            return rejection(&format!("url is not valid: {}", e));
        }

        // Labels that trim to nothing are dropped, the rest must be legal
        // filename fragments
        let mut labels = Vec::with_capacity(request.labels.len());
        for label in &request.labels {
            let label = label.trim();
            if label.is_empty() {
                continue;
            }
            if let Err(e) = validate_filename_fragment(label) {
                return rejection(&e.to_string());
            }
            labels.push(label.to_string());
        }

        if let Some(correlation_id) = &request.correlation_id {
            if let Err(e) = validate_filename_fragment(correlation_id) {
                return rejection(&e.to_string());
            }
        }

        if !request.capture_options.any() {
            return rejection("at least one capture format (png, jpeg, html) must be requested");
        }

        if !self.pool.is_running() || self.pool.healthy_worker_count().await == 0 {
            return SubmitOutcome::Unavailable;
        }

        let task_id = Uuid::new_v4().to_string();
        let task = CaptureTask {
            task_id: task_id.clone(),
            url,
            labels,
            correlation_id: request.correlation_id.clone(),
            capture_options: request.capture_options,
            retry_count: 0,
        };

        if let Err(e) = self.pool.enqueue(task).await {
            return rejection(&e.to_string());
        }

        debug!(task_id = %task_id, "submission accepted");
        SubmitOutcome::Ack(SubmitAck {
            accepted: true,
            task_id,
            correlation_id: request.correlation_id,
            error: None,
        })
    }

    /// One consistent snapshot across the queue and every worker.
    pub async fn status(&self) -> StatusResponse {
        let status = self.pool.status().await;
        StatusResponse {
            pending: status.queue.pending,
            processing: status.queue.processing,
            completed: status.queue.completed,
            healthy_workers: status.healthy_workers,
            total_workers: status.total_workers,
            is_running: status.running,
            workers: status.workers,
        }
    }
}

fn rejection(message: &str) -> SubmitOutcome {
    SubmitOutcome::Ack(SubmitAck {
        accepted: false,
        task_id: String::new(),
        correlation_id: None,
        error: Some(message.to_string()),
    })
}
