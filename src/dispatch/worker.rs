use chrono::Utc;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::browser::{BrowserGateway, BrowserSession};
use crate::capture::errors::{indicates_session_loss, ErrorDetails};
use crate::capture::page::PageCapturer;
use crate::dispatch::status::WorkerStatusManager;
use crate::dispatch::task::{
    CaptureResult, CaptureStatus, CaptureTask, ErrorRecord, TaskRef, WorkerInfo, WorkerStatus,
};

/// Only the most recent errors are kept per worker.
const ERROR_HISTORY_LIMIT: usize = 10;

/// One single-flight capture executor bound to one remote browser
/// endpoint for the pool's lifetime.
pub struct Worker {
    id: String,
    endpoint: String,
    slow_mo: u64,
    session: Mutex<Option<Box<dyn BrowserSession>>>,
    state: Mutex<WorkerState>,
}

struct WorkerState {
    status: WorkerStatusManager,
    processed_count: u64,
    error_count: u64,
    /// Newest first, capped at [`ERROR_HISTORY_LIMIT`]
    error_history: VecDeque<ErrorRecord>,
}

impl WorkerState {
    fn record_error(&mut self, details: ErrorDetails, task: Option<TaskRef>) {
        self.error_count += 1;
        self.error_history.push_front(ErrorRecord {
            error_details: details,
            timestamp: Utc::now(),
            task,
        });
        self.error_history.truncate(ERROR_HISTORY_LIMIT);
    }
}

impl Worker {
    pub fn new(id: String, endpoint: String, slow_mo: u64) -> Self {
        Self {
            id,
            endpoint,
            slow_mo,
            session: Mutex::new(None),
            state: Mutex::new(WorkerState {
                status: WorkerStatusManager::new(),
                processed_count: 0,
                error_count: 0,
                error_history: VecDeque::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Open the worker's session. Returns whether the worker came up
    /// healthy; a failed connect leaves it in the error state.
    pub async fn connect(&self, gateway: &dyn BrowserGateway) -> bool {
        match gateway.connect(&self.endpoint, self.slow_mo).await {
            Ok(session) => {
                *self.session.lock().await = Some(session);
                self.state.lock().await.status.transition(WorkerStatus::Idle);
                info!(worker = %self.id, endpoint = %self.endpoint, "worker connected");
                true
            }
            Err(e) => {
                warn!(
                    worker = %self.id,
                    endpoint = %self.endpoint,
                    "worker failed to connect: {:#}",
                    e
                );
                let mut state = self.state.lock().await;
                state.status.transition(WorkerStatus::Error);
                state.record_error(ErrorDetails::connection(&format!("{:#}", e)), None);
                false
            }
        }
    }

    /// Close the session, best effort, and mark the worker stopped.
    pub async fn disconnect(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            if let Err(e) = session.close().await {
                warn!(worker = %self.id, "error closing browser session: {:#}", e);
            }
        }
        self.state.lock().await.status.transition(WorkerStatus::Stopped);
        info!(worker = %self.id, "worker disconnected");
    }

    /// Execute one capture. Never propagates an error: an unhealthy or
    /// sessionless worker yields a synthetic internal failure (without
    /// touching counters), everything else becomes a structured result.
    pub async fn process(&self, task: &CaptureTask, capturer: &PageCapturer) -> CaptureResult {
        // Single-flight: the session is held for the whole attempt
        let session_guard = self.session.lock().await;
        let session = match session_guard.as_ref() {
            Some(session) => session,
            None => return self.unavailable_result(task),
        };

        {
            let mut state = self.state.lock().await;
            if !state.status.is_healthy() {
                return self.unavailable_result(task);
            }
            state.status.transition(WorkerStatus::Busy);
        }

        let result = capturer.capture(session.as_ref(), task, &self.id).await;

        let mut state = self.state.lock().await;
        state.processed_count += 1;
        if result.is_success() {
            state.status.transition(WorkerStatus::Idle);
        } else {
            let details = result
                .error_details
                .clone()
                .unwrap_or_else(|| ErrorDetails::internal("capture failed without details"));
            let session_lost = indicates_session_loss(details.message());
            state.record_error(details, Some(TaskRef::from(task)));
            if session_lost {
                warn!(worker = %self.id, "session lost, taking worker out of rotation");
                state.status.transition(WorkerStatus::Error);
            } else {
                state.status.transition(WorkerStatus::Idle);
            }
        }

        result
    }

    /// Self-consistent by-value copy for status queries; the history is
    /// cloned so callers cannot reach internal state.
    pub async fn snapshot(&self) -> WorkerInfo {
        let state = self.state.lock().await;
        WorkerInfo {
            id: self.id.clone(),
            browser_endpoint: self.endpoint.clone(),
            status: state.status.current(),
            processed_count: state.processed_count,
            error_count: state.error_count,
            error_history: state.error_history.iter().cloned().collect(),
        }
    }

    pub async fn is_healthy(&self) -> bool {
        self.state.lock().await.status.is_healthy()
    }

    fn unavailable_result(&self, task: &CaptureTask) -> CaptureResult {
        CaptureResult {
            task: task.clone(),
            status: CaptureStatus::Failed,
            http_status_code: None,
            error_details: Some(ErrorDetails::internal(&format!(
                "Worker {} has no usable browser session",
                self.id
            ))),
            png_path: None,
            jpeg_path: None,
            html_path: None,
            capture_processing_time_ms: 0,
            timestamp: Utc::now(),
            worker_id: self.id.clone(),
        }
    }
}
