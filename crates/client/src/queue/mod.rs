//! Durable retry queue and its replay worker

mod replay;
mod retry_queue;

pub use replay::{ReplayWorker, ReplayWorkerConfig};
pub use retry_queue::RetryQueue;
