pub mod pool;
pub mod queue;
pub mod status;
pub mod task;
pub mod worker;

// Re-export common types
pub use pool::{PoolStatus, WorkerPool};
pub use queue::TaskQueue;
pub use status::WorkerStatusManager;
pub use task::{
    CaptureOptions, CaptureResult, CaptureStatus, CaptureTask, ErrorRecord, QueueCounts, TaskRef,
    WorkerInfo, WorkerStatus,
};
pub use worker::Worker;
