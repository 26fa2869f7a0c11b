use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Duration;

/// A task scheduled for a specific point in the future.
/// It will automatically execute at that point, or can be cancelled.
pub struct ScheduledTask<T> {
    handle: JoinHandle<T>,
}

impl<T> ScheduledTask<T>
where
    T: Send + 'static,
{
    /// Schedule the given task to execute at time `run_at`.
    /// If `run_at` is in the past, the task will execute immediately.
    pub fn new<Fut>(task: Fut, run_at: DateTime<Utc>) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(datetime_to_duration(run_at)).await;
            task.await
        });
        Self { handle }
    }

    /// Cancel the task. Returns true iff it had already completed before we
    /// could cancel it.
    pub async fn cancel(self) -> bool {
        self.handle.abort();
        self.handle.await.is_ok()
    }
}

/// Implement `Future` for `ScheduledTask` so we can directly `await` it.
impl<T> Future for ScheduledTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

/// Convert a `DateTime` into a duration from the current instant.
/// A `DateTime` in the past will produce a duration of zero.
fn datetime_to_duration(datetime: DateTime<Utc>) -> Duration {
    let target_timestamp = datetime.timestamp_millis();
    let now_timestamp = Utc::now().timestamp_millis();
    let time_diff = u64::try_from(target_timestamp - now_timestamp).unwrap_or(0);
    Duration::from_millis(time_diff)
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;

    #[tokio::test]
    async fn past_deadline_runs_immediately() {
        let task = ScheduledTask::new(async { 42 }, Utc::now() - ChronoDuration::hours(1));
        assert_eq!(task.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn cancelled_task_never_runs() {
        let task = ScheduledTask::new(async { 42 }, Utc::now() + ChronoDuration::hours(1));
        let already_done = task.cancel().await;
        assert!(!already_done);
    }
}
