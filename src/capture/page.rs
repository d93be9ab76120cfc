use chrono::Utc;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::browser::{BrowserPage, BrowserSession, ImageFormat};
use crate::capture::errors::ErrorDetails;
use crate::capture::filename::generate_filename;
use crate::cli::config::ServiceConfig;
use crate::dispatch::task::{CaptureResult, CaptureStatus, CaptureTask};

/// How long every page gets to settle dynamic content after the DOM loads.
const DYNAMIC_CONTENT_WAIT_MS: u64 = 3000;

/// Injected so captured screenshots never show a scrollbar.
const HIDE_SCROLLBARS_JS: &str = r#"(() => {
    const style = document.createElement('style');
    style.textContent = '::-webkit-scrollbar { display: none !important; }';
    document.head.appendChild(style);
})()"#;

/// Executes one capture attempt against one browser session.
///
/// Every failure mode is materialized into the returned [`CaptureResult`];
/// nothing escapes to the dispatch loop as an error. The page opened for
/// the attempt is closed on every exit path.
pub struct PageCapturer {
    output_dir: PathBuf,
    page_load_timeout_ms: u64,
    capture_timeout_ms: u64,
    viewport_width: u32,
    viewport_height: u32,
    user_agent: Option<String>,
    full_page: bool,
    jpeg_quality: Option<u32>,
}

/// What a bounded attempt produced before result assembly.
enum Attempt {
    HttpError { status: u16, status_text: Option<String> },
    Captured {
        status: u16,
        png: Option<PathBuf>,
        jpeg: Option<PathBuf>,
        html: Option<PathBuf>,
    },
}

impl PageCapturer {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            page_load_timeout_ms: config.timeouts.page_load,
            capture_timeout_ms: config.timeouts.capture,
            viewport_width: config.viewport.width,
            viewport_height: config.viewport.height,
            user_agent: config.user_agent.clone(),
            full_page: config.screenshot.full_page,
            jpeg_quality: config.screenshot.quality,
        }
    }

    /// Run one capture attempt for `task` on a fresh page of `session`.
    pub async fn capture(
        &self,
        session: &dyn BrowserSession,
        task: &CaptureTask,
        worker_id: &str,
    ) -> CaptureResult {
        let started = Instant::now();

        let page = match session.open_page().await {
            Ok(page) => page,
            Err(e) => {
                return self.finish(task, worker_id, started, Err(ErrorDetails::from_failure(&e)))
            }
        };

        let outcome = self.attempt(page.as_ref(), task).await;

        // The page is scoped to this attempt; close it no matter how the
        // attempt ended.
        if let Err(e) = page.close().await {
            debug!(task_id = %task.task_id, "page close failed: {:#}", e);
        }

        self.finish(task, worker_id, started, outcome)
    }

    async fn attempt(
        &self,
        page: &dyn BrowserPage,
        task: &CaptureTask,
    ) -> Result<Attempt, ErrorDetails> {
        page.set_viewport(self.viewport_width, self.viewport_height)
            .await
            .map_err(|e| ErrorDetails::from_failure(&e))?;

        if let Some(user_agent) = &self.user_agent {
            page.set_user_agent(user_agent)
                .await
                .map_err(|e| ErrorDetails::from_failure(&e))?;
        }

        let response = match timeout(
            Duration::from_millis(self.page_load_timeout_ms),
            page.navigate(&task.url),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ErrorDetails::from_failure(&e)),
            Err(_) => {
                return Err(ErrorDetails::timeout(self.page_load_timeout_ms, "page navigation"))
            }
        };

        if !(200..300).contains(&response.status) {
            return Ok(Attempt::HttpError {
                status: response.status,
                status_text: response.status_text,
            });
        }

        // Let in-page scripts finish rendering before we freeze the page
        let wait = format!(
            "new Promise(resolve => setTimeout(resolve, {}))",
            DYNAMIC_CONTENT_WAIT_MS
        );
        page.evaluate(&wait)
            .await
            .map_err(|e| ErrorDetails::from_failure(&e))?;

        page.evaluate(HIDE_SCROLLBARS_JS)
            .await
            .map_err(|e| ErrorDetails::from_failure(&e))?;

        let mut png = None;
        let mut jpeg = None;
        let mut html = None;

        if task.capture_options.png {
            png = Some(self.write_screenshot(page, task, ImageFormat::Png).await?);
        }
        if task.capture_options.jpeg {
            jpeg = Some(self.write_screenshot(page, task, ImageFormat::Jpeg).await?);
        }
        if task.capture_options.html {
            html = Some(self.write_html(page, task).await?);
        }

        Ok(Attempt::Captured { status: response.status, png, jpeg, html })
    }

    async fn write_screenshot(
        &self,
        page: &dyn BrowserPage,
        task: &CaptureTask,
        format: ImageFormat,
    ) -> Result<PathBuf, ErrorDetails> {
        let (extension, operation, quality) = match format {
            ImageFormat::Png => ("png", "png rendering", None),
            ImageFormat::Jpeg => ("jpeg", "jpeg rendering", self.jpeg_quality),
        };

        let bytes = match timeout(
            Duration::from_millis(self.capture_timeout_ms),
            page.screenshot(format, quality, self.full_page),
        )
        .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(ErrorDetails::from_failure(&e)),
            Err(_) => return Err(ErrorDetails::timeout(self.capture_timeout_ms, operation)),
        };

        self.persist(task, extension, &bytes).await
    }

    async fn write_html(
        &self,
        page: &dyn BrowserPage,
        task: &CaptureTask,
    ) -> Result<PathBuf, ErrorDetails> {
        let html = match timeout(
            Duration::from_millis(self.capture_timeout_ms),
            page.content(),
        )
        .await
        {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => return Err(ErrorDetails::from_failure(&e)),
            Err(_) => return Err(ErrorDetails::timeout(self.capture_timeout_ms, "html extraction")),
        };

        self.persist(task, "html", html.as_bytes()).await
    }

    async fn persist(
        &self,
        task: &CaptureTask,
        extension: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ErrorDetails> {
        let filename = generate_filename(
            &task.task_id,
            task.correlation_id.as_deref(),
            &task.labels,
            extension,
        );
        let path = self.output_dir.join(filename);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            ErrorDetails::internal(&format!("Failed to write {}: {}", path.display(), e))
        })?;
        debug!(task_id = %task.task_id, path = %path.display(), "artifact written");
        Ok(path)
    }

    fn finish(
        &self,
        task: &CaptureTask,
        worker_id: &str,
        started: Instant,
        outcome: Result<Attempt, ErrorDetails>,
    ) -> CaptureResult {
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Attempt::Captured { status, png, jpeg, html }) => CaptureResult {
                task: task.clone(),
                status: CaptureStatus::Success,
                http_status_code: Some(status),
                error_details: None,
                png_path: png,
                jpeg_path: jpeg,
                html_path: html,
                capture_processing_time_ms: elapsed_ms,
                timestamp: Utc::now(),
                worker_id: worker_id.to_string(),
            },
            Ok(Attempt::HttpError { status, status_text }) => CaptureResult {
                task: task.clone(),
                status: CaptureStatus::HttpError,
                http_status_code: Some(status),
                error_details: Some(ErrorDetails::http(status, status_text)),
                png_path: None,
                jpeg_path: None,
                html_path: None,
                capture_processing_time_ms: elapsed_ms,
                timestamp: Utc::now(),
                worker_id: worker_id.to_string(),
            },
            Err(details) => CaptureResult {
                task: task.clone(),
                status: if details.is_timeout() {
                    CaptureStatus::Timeout
                } else {
                    CaptureStatus::Failed
                },
                http_status_code: None,
                error_details: Some(details),
                png_path: None,
                jpeg_path: None,
                html_path: None,
                capture_processing_time_ms: elapsed_ms,
                timestamp: Utc::now(),
                worker_id: worker_id.to_string(),
            },
        };

        match result.status {
            CaptureStatus::Success => {
                info!(
                    task_id = %task.task_id,
                    url = %task.url,
                    elapsed_ms,
                    "capture succeeded"
                );
            }
            status => {
                warn!(
                    task_id = %task.task_id,
                    url = %task.url,
                    ?status,
                    elapsed_ms,
                    error = result.error_details.as_ref().map(|d| d.message()).unwrap_or(""),
                    "capture did not succeed"
                );
            }
        }

        result
    }
}
