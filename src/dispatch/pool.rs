use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

use crate::browser::BrowserGateway;
use crate::capture::page::PageCapturer;
use crate::cli::config::ServiceConfig;
use crate::dispatch::queue::TaskQueue;
use crate::dispatch::task::{CaptureTask, QueueCounts, WorkerInfo, WorkerStatus};
use crate::dispatch::worker::Worker;

/// Aggregate snapshot served to status queries.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub queue: QueueCounts,
    pub healthy_workers: usize,
    pub total_workers: usize,
    pub running: bool,
    pub workers: Vec<WorkerInfo>,
}

/// Owns the task queue and all workers; runs one dispatch loop per
/// healthy worker and applies the retry and duplicate-URL policies.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    workers: Vec<Arc<Worker>>,
    capturer: Arc<PageCapturer>,
    max_retries: u32,
    queue_poll_interval: Duration,
    reject_duplicate_urls: bool,
    running: Arc<AtomicBool>,
    loop_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Construct one worker per configured browser endpoint and connect
    /// them in parallel. Fails only when not a single worker comes up;
    /// workers that could not connect stay in the error state and are
    /// never dispatched to.
    pub async fn new(config: &ServiceConfig, gateway: Arc<dyn BrowserGateway>) -> Result<Self> {
        let workers: Vec<Arc<Worker>> = config
            .browsers
            .iter()
            .enumerate()
            .map(|(index, browser)| {
                Arc::new(Worker::new(
                    format!("worker-{}", index + 1),
                    browser.endpoint.clone(),
                    browser.slow_mo,
                ))
            })
            .collect();

        let connects = workers.iter().map(|worker| {
            let worker = worker.clone();
            let gateway = gateway.clone();
            async move { worker.connect(gateway.as_ref()).await }
        });
        let connected = futures::future::join_all(connects).await;

        let healthy = connected.iter().filter(|ok| **ok).count();
        if healthy == 0 {
            bail!("no workers could connect to any configured browser endpoint");
        }
        info!("{}/{} workers connected", healthy, workers.len());

        Ok(Self {
            queue: Arc::new(TaskQueue::new()),
            workers,
            capturer: Arc::new(PageCapturer::new(config)),
            max_retries: config.max_retries,
            queue_poll_interval: Duration::from_millis(config.queue_poll_interval_ms),
            reject_duplicate_urls: config.reject_duplicate_urls,
            running: Arc::new(AtomicBool::new(false)),
            loop_handles: Mutex::new(Vec::new()),
        })
    }

    /// Spawn one dispatch loop per currently-healthy worker. Idempotent:
    /// a second call while running spawns nothing.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut handles = self.loop_handles.lock().await;
        for worker in &self.workers {
            if !worker.is_healthy().await {
                continue;
            }
            handles.push(tokio::spawn(dispatch_loop(
                worker.clone(),
                self.queue.clone(),
                self.capturer.clone(),
                self.running.clone(),
                self.max_retries,
                self.queue_poll_interval,
            )));
        }
        info!("worker pool started with {} dispatch loops", handles.len());
    }

    /// Accept a validated task into the queue. With duplicate rejection
    /// enabled, a URL already pending or processing is refused.
    pub async fn enqueue(&self, task: CaptureTask) -> Result<()> {
        if self.reject_duplicate_urls && self.queue.has_url(&task.url).await {
            bail!("URL already in queue: {}", task.url);
        }
        self.queue.enqueue(task).await;
        Ok(())
    }

    /// Stop dispatching, wait for in-flight captures to finish, then
    /// disconnect every worker. Call once.
    pub async fn shutdown(&self) {
        info!("shutting down worker pool");
        self.running.store(false, Ordering::SeqCst);

        let handles: Vec<JoinHandle<()>> = self.loop_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("dispatch loop ended abnormally: {}", e);
            }
        }

        futures::future::join_all(self.workers.iter().map(|worker| worker.disconnect())).await;
        info!("worker pool shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn healthy_worker_count(&self) -> usize {
        let mut count = 0;
        for worker in &self.workers {
            if worker.is_healthy().await {
                count += 1;
            }
        }
        count
    }

    pub async fn status(&self) -> PoolStatus {
        let mut workers = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            workers.push(worker.snapshot().await);
        }
        let healthy_workers = workers
            .iter()
            .filter(|info| matches!(info.status, WorkerStatus::Idle | WorkerStatus::Busy))
            .count();
        PoolStatus {
            queue: self.queue.counts().await,
            healthy_workers,
            total_workers: self.workers.len(),
            running: self.is_running(),
            workers,
        }
    }

    #[cfg(test)]
    pub(crate) async fn dispatch_loop_count(&self) -> usize {
        self.loop_handles.lock().await.len()
    }
}

/// Per-worker control loop: pull, capture, retry or complete, until the
/// pool stops or the worker leaves the healthy states. Workers that fall
/// out of rotation are not restarted.
async fn dispatch_loop(
    worker: Arc<Worker>,
    queue: Arc<TaskQueue>,
    capturer: Arc<PageCapturer>,
    running: Arc<AtomicBool>,
    max_retries: u32,
    poll_interval: Duration,
) {
    info!(worker = %worker.id(), "dispatch loop started");

    while running.load(Ordering::SeqCst) && worker.is_healthy().await {
        let task = match queue.dequeue().await {
            Some(task) => task,
            None => {
                sleep(poll_interval).await;
                continue;
            }
        };

        let result = worker.process(&task, &capturer).await;

        // Retry eligibility depends only on success and the remaining
        // retry allowance, never on the error class
        if !result.is_success() && task.retry_count < max_retries {
            queue.requeue(&task).await;
        } else {
            queue.mark_complete(&task.task_id).await;
        }

        if !worker.is_healthy().await {
            break;
        }
    }

    info!(worker = %worker.id(), "dispatch loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MockGateway, PageOutcome};
    use crate::cli::config::BrowserEndpoint;
    use crate::dispatch::task::{CaptureOptions, CaptureTask};
    use std::path::PathBuf;

    fn pool_config(output_dir: &PathBuf, endpoints: &[&str]) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.output_dir = output_dir.clone();
        config.timeouts.page_load = 200;
        config.timeouts.capture = 200;
        config.queue_poll_interval_ms = 10;
        config.browsers = endpoints
            .iter()
            .map(|endpoint| BrowserEndpoint { endpoint: endpoint.to_string(), slow_mo: 0 })
            .collect();
        config
    }

    fn output_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("webshot-pool-{}-{}", tag, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn task(id: &str, url: &str) -> CaptureTask {
        CaptureTask {
            task_id: id.to_string(),
            url: url.to_string(),
            labels: vec!["Home".to_string()],
            correlation_id: None,
            capture_options: CaptureOptions { png: true, jpeg: false, html: true },
            retry_count: 0,
        }
    }

    async fn wait_for_completed(pool: &WorkerPool, expected: usize) {
        for _ in 0..500 {
            if pool.status().await.queue.completed >= expected {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {} completed task(s)", expected);
    }

    #[tokio::test]
    async fn happy_path_produces_artifacts_and_counts() {
        let dir = output_dir("happy");
        let mut config = pool_config(&dir, &["ws://one"]);
        config.max_retries = 0;
        let pool = WorkerPool::new(&config, Arc::new(MockGateway::new())).await.unwrap();
        pool.start().await;

        pool.enqueue(task("t-happy", "https://example.com")).await.unwrap();
        wait_for_completed(&pool, 1).await;

        let status = pool.status().await;
        assert_eq!(status.queue, QueueCounts { pending: 0, processing: 0, completed: 1 });
        assert_eq!(status.workers[0].processed_count, 1);
        assert_eq!(status.workers[0].error_count, 0);
        assert!(dir.join("t-happy_Home.png").exists());
        assert!(dir.join("t-happy_Home.html").exists());

        pool.shutdown().await;
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn timeout_then_success_retries_once() {
        let dir = output_dir("retry");
        let gateway = MockGateway::new();
        gateway.push_outcome(PageOutcome::NavigationHang);
        // Second attempt falls through to the default success outcome
        let config = pool_config(&dir, &["ws://one"]);
        let pool = WorkerPool::new(&config, Arc::new(gateway)).await.unwrap();
        pool.start().await;

        pool.enqueue(task("t-retry", "https://slow.test")).await.unwrap();
        wait_for_completed(&pool, 1).await;

        let status = pool.status().await;
        assert_eq!(status.queue, QueueCounts { pending: 0, processing: 0, completed: 1 });
        assert_eq!(status.workers[0].processed_count, 2);
        assert_eq!(status.workers[0].error_count, 1);
        assert_eq!(status.workers[0].error_history.len(), 1);

        pool.shutdown().await;
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn retries_exhaust_after_max_retries_plus_one_attempts() {
        let dir = output_dir("exhaust");
        let gateway = MockGateway::new();
        for _ in 0..2 {
            gateway.push_outcome(PageOutcome::RenderError("render pipeline broke".to_string()));
        }
        let mut config = pool_config(&dir, &["ws://one"]);
        config.max_retries = 1;
        let pool = WorkerPool::new(&config, Arc::new(gateway)).await.unwrap();
        pool.start().await;

        pool.enqueue(task("t-exhaust", "https://broken.test")).await.unwrap();
        wait_for_completed(&pool, 1).await;

        // Give any erroneous extra attempt a chance to show up
        sleep(Duration::from_millis(100)).await;

        let status = pool.status().await;
        assert_eq!(status.queue, QueueCounts { pending: 0, processing: 0, completed: 1 });
        assert_eq!(status.workers[0].processed_count, 2);
        assert_eq!(status.workers[0].error_count, 2);

        pool.shutdown().await;
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn http_errors_are_retried_like_any_failure() {
        let dir = output_dir("http503");
        let gateway = MockGateway::new();
        for _ in 0..3 {
            gateway.push_outcome(PageOutcome::HttpStatus(503, None));
        }
        let config = pool_config(&dir, &["ws://one"]);
        let pool = WorkerPool::new(&config, Arc::new(gateway)).await.unwrap();
        pool.start().await;

        pool.enqueue(task("t-503", "https://unavailable.test")).await.unwrap();
        wait_for_completed(&pool, 1).await;
        sleep(Duration::from_millis(100)).await;

        let status = pool.status().await;
        assert_eq!(status.queue, QueueCounts { pending: 0, processing: 0, completed: 1 });
        assert_eq!(status.workers[0].processed_count, 3);
        assert_eq!(status.workers[0].error_count, 3);
        for record in &status.workers[0].error_history {
            assert!(record.error_details.message().starts_with("HTTP 503"));
        }

        pool.shutdown().await;
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn duplicate_urls_rejected_until_first_completes() {
        let dir = output_dir("dup");
        let mut config = pool_config(&dir, &["ws://one"]);
        config.reject_duplicate_urls = true;
        let pool = WorkerPool::new(&config, Arc::new(MockGateway::new())).await.unwrap();

        // Pool not yet started, so the first task stays pending
        pool.enqueue(task("t-dup-1", "https://dup.test")).await.unwrap();
        let rejection = pool.enqueue(task("t-dup-2", "https://dup.test")).await.unwrap_err();
        assert_eq!(rejection.to_string(), "URL already in queue: https://dup.test");

        pool.start().await;
        wait_for_completed(&pool, 1).await;

        // Completed tasks do not block resubmission
        pool.enqueue(task("t-dup-3", "https://dup.test")).await.unwrap();
        wait_for_completed(&pool, 2).await;

        pool.shutdown().await;
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn init_fails_when_no_worker_connects() {
        let dir = output_dir("noinit");
        let config = pool_config(&dir, &["ws://down"]);
        let gateway = Arc::new(MockGateway::refusing(&["ws://down"]));
        assert!(WorkerPool::new(&config, gateway).await.is_err());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn partially_connected_pool_runs_with_survivors() {
        let dir = output_dir("partial");
        let config = pool_config(&dir, &["ws://up", "ws://down"]);
        let gateway = Arc::new(MockGateway::refusing(&["ws://down"]));
        let pool = WorkerPool::new(&config, gateway).await.unwrap();
        pool.start().await;

        let status = pool.status().await;
        assert_eq!(status.total_workers, 2);
        assert_eq!(status.healthy_workers, 1);
        assert_eq!(pool.dispatch_loop_count().await, 1);

        pool.enqueue(task("t-partial", "https://example.com")).await.unwrap();
        wait_for_completed(&pool, 1).await;

        pool.shutdown().await;
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn dead_worker_drains_healthy_count_but_pool_keeps_running() {
        let dir = output_dir("dead");
        let gateway = MockGateway::new();
        gateway.push_outcome(PageOutcome::NavigationError(
            "websocket connection is closed".to_string(),
        ));
        let mut config = pool_config(&dir, &["ws://one"]);
        // Terminal on first failure, so the task completes even though the
        // only worker dies on it
        config.max_retries = 0;
        let pool = WorkerPool::new(&config, Arc::new(gateway)).await.unwrap();
        pool.start().await;

        pool.enqueue(task("t-dead", "https://example.com")).await.unwrap();
        wait_for_completed(&pool, 1).await;

        // The connection loss took the only worker out of rotation
        for _ in 0..100 {
            if pool.healthy_worker_count().await == 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(pool.healthy_worker_count().await, 0);
        assert!(pool.is_running());

        pool.shutdown().await;
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let dir = output_dir("idem");
        let config = pool_config(&dir, &["ws://one"]);
        let pool = WorkerPool::new(&config, Arc::new(MockGateway::new())).await.unwrap();
        pool.start().await;
        pool.start().await;
        assert_eq!(pool.dispatch_loop_count().await, 1);

        pool.shutdown().await;
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn shutdown_waits_for_inflight_capture() {
        let dir = output_dir("drain");
        let gateway = MockGateway::new();
        let config = pool_config(&dir, &["ws://one"]);
        let pool = WorkerPool::new(&config, Arc::new(gateway)).await.unwrap();
        pool.start().await;

        pool.enqueue(task("t-drain", "https://example.com")).await.unwrap();
        // Let the loop pick the task up, then shut down mid-flight
        sleep(Duration::from_millis(20)).await;
        pool.shutdown().await;

        let status = pool.status().await;
        assert!(!status.running);
        assert_eq!(status.queue.processing, 0, "no task left in processing after drain");
        std::fs::remove_dir_all(dir).unwrap();
    }
}
