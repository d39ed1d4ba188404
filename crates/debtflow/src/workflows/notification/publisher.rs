use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::queue::{DispatchQueue, QueueMessage};
use super::repository::ScheduleStore;
use super::DispatchError;

/// Moves due PENDING schedules onto their channel topics. A schedule parked
/// under a retry backoff (`next_attempt_at` in the future) is not due and
/// stays off the topics; its parked queue message owns the retry. Publishing
/// the same due schedule twice before it resolves is still possible under
/// the at-least-once contract, and the dispatcher's terminal-status and
/// backoff checks absorb it.
pub struct DueSchedulePublisher<S, Q> {
    schedules: Arc<S>,
    queue: Arc<Q>,
}

impl<S, Q> DueSchedulePublisher<S, Q>
where
    S: ScheduleStore,
    Q: DispatchQueue,
{
    pub fn new(schedules: Arc<S>, queue: Arc<Q>) -> Self {
        Self { schedules, queue }
    }

    /// Publishes up to `limit` due schedules, returning how many were
    /// enqueued.
    pub fn publish_due(&self, now: DateTime<Utc>, limit: usize) -> Result<usize, DispatchError> {
        let due = self.schedules.list_due(now, limit)?;
        let mut published = 0;
        for schedule in due {
            self.queue.publish(QueueMessage {
                schedule_id: schedule.id.clone(),
                channel: schedule.channel,
                attempt: schedule.attempts,
            })?;
            debug!(schedule = %schedule.id, channel = %schedule.channel, "due schedule enqueued");
            published += 1;
        }
        Ok(published)
    }
}
