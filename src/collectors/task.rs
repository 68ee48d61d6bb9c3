use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use super::elapsed_ms;
use crate::monitor::Monitor;

/// Identity of one background task execution.
#[derive(Debug, Clone, Default)]
pub struct TaskInfo {
    pub name: String,
    pub queue: String,
    pub worker: String,
    pub retries: u32,
}

impl TaskInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: "default".into(),
            worker: "unknown".into(),
            retries: 0,
        }
    }
}

/// Runs `task` and records its duration and outcome. Called by the task
/// runner directly; the task's own result is passed through untouched.
pub fn run_instrumented<T, E, F>(monitor: &Monitor, info: &TaskInfo, task: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: Display,
{
    let start = Instant::now();
    let result = task();
    let error = result.as_ref().err().map(ToString::to_string);
    monitor.record_task(info, elapsed_ms(start), error);
    result
}

pub async fn run_instrumented_async<T, E, Fut>(
    monitor: &Monitor,
    info: &TaskInfo,
    task: Fut,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    let result = task.await;
    let error = result.as_ref().err().map(ToString::to_string);
    monitor.record_task(info, elapsed_ms(start), error);
    result
}
