use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;

use crate::dispatch::task::{CaptureTask, QueueCounts};

/// FIFO task queue with three disjoint partitions (pending, processing,
/// completed) and an incrementally-maintained URL multiset covering
/// pending ∪ processing for O(1) duplicate checks.
///
/// Shared between the submission frontend and every dispatch loop; each
/// operation takes the internal lock once, so all operations are
/// individually atomic and `dequeue` hands each task to exactly one caller.
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    /// Tasks waiting for a worker, oldest first
    pending: VecDeque<CaptureTask>,

    /// Tasks currently held by a worker, keyed by task id
    processing: HashMap<String, CaptureTask>,

    /// Ids of terminally finished tasks; grows monotonically
    completed: HashSet<String>,

    /// URL -> occurrence count across pending and processing
    url_counts: HashMap<String, usize>,
}

impl QueueState {
    fn url_added(&mut self, url: &str) {
        *self.url_counts.entry(url.to_string()).or_insert(0) += 1;
    }

    fn url_removed(&mut self, url: &str) {
        if let Some(count) = self.url_counts.get_mut(url) {
            *count -= 1;
            if *count == 0 {
                self.url_counts.remove(url);
            }
        }
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self { state: Mutex::new(QueueState::default()) }
    }

    /// Append a task to the pending tail. Callers validate; the queue does not.
    pub async fn enqueue(&self, task: CaptureTask) {
        let mut state = self.state.lock().await;
        state.url_added(&task.url);
        debug!(task_id = %task.task_id, url = %task.url, "task enqueued");
        state.pending.push_back(task);
    }

    /// Remove the pending head and move it into processing.
    pub async fn dequeue(&self) -> Option<CaptureTask> {
        let mut state = self.state.lock().await;
        let task = state.pending.pop_front()?;
        state.processing.insert(task.task_id.clone(), task.clone());
        debug!(task_id = %task.task_id, "task dequeued for processing");
        Some(task)
    }

    /// Put a failed task back at the pending tail with its retry count
    /// incremented. The retried task goes behind everything currently pending.
    pub async fn requeue(&self, task: &CaptureTask) {
        let mut state = self.state.lock().await;
        state.processing.remove(&task.task_id);
        let mut retried = task.clone();
        retried.retry_count += 1;
        debug!(
            task_id = %retried.task_id,
            retry_count = retried.retry_count,
            "task requeued"
        );
        state.pending.push_back(retried);
    }

    /// Move a task out of processing into the completed set. Idempotent:
    /// completing an unknown or already-completed id changes nothing else.
    pub async fn mark_complete(&self, task_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.processing.remove(task_id) {
            state.url_removed(&task.url);
        }
        state.completed.insert(task_id.to_string());
    }

    /// True iff any pending or processing task carries this URL.
    /// Completed tasks do not count.
    pub async fn has_url(&self, url: &str) -> bool {
        let state = self.state.lock().await;
        state.url_counts.contains_key(url)
    }

    /// Consistent per-partition counts for status queries.
    pub async fn counts(&self) -> QueueCounts {
        let state = self.state.lock().await;
        QueueCounts {
            pending: state.pending.len(),
            processing: state.processing.len(),
            completed: state.completed.len(),
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
