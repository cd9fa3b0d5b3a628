use std::time::{Duration, Instant};

/// Measures a named task and reports it through `tracing` at debug level.
pub struct TaskTimer {
    start_time: Instant,
    task_name: &'static str,
}

impl TaskTimer {
    pub fn new(task_name: &'static str) -> Self {
        tracing::debug!(task = task_name, "task started");
        Self {
            start_time: Instant::now(),
            task_name,
        }
    }

    /// `items` is how many things the task processed (spans, rows...), logged next to the time.
    pub fn stop(self, items: usize) -> Duration {
        let elapsed = self.start_time.elapsed();
        tracing::debug!(
            task = self.task_name,
            items,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "task finished"
        );
        elapsed
    }
}
