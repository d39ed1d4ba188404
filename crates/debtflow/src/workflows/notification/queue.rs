use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Channel, ScheduleId};

/// Envelope published to the per-channel dispatch topics. Carries only the
/// schedule reference plus the attempt count; the dispatcher always
/// re-reads the schedule fresh, so a stale payload is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub schedule_id: ScheduleId,
    pub channel: Channel,
    pub attempt: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue transport unavailable: {0}")]
    Unavailable(String),
}

/// Durable multi-topic queue boundary between planning and sending. One
/// logical topic per channel, at-least-once delivery: consumers must treat
/// a redelivered message as a possible duplicate.
pub trait DispatchQueue: Send + Sync {
    fn publish(&self, message: QueueMessage) -> Result<(), QueueError>;
    /// Pops the next visible message for a channel, or `None` when the topic
    /// is empty or every message is still under a backoff delay.
    fn receive(&self, channel: Channel, now: DateTime<Utc>)
        -> Result<Option<QueueMessage>, QueueError>;
    /// Returns a message to its topic, invisible until `delay` has elapsed.
    fn requeue(
        &self,
        message: QueueMessage,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError>;
    fn depth(&self, channel: Channel) -> Result<usize, QueueError>;
}

#[derive(Clone)]
struct Enqueued {
    message: QueueMessage,
    visible_at: DateTime<Utc>,
}

/// In-process queue with per-channel topics and visibility timestamps,
/// standing in for a broker in tests, the demo, and single-node deploys.
#[derive(Default, Clone)]
pub struct InMemoryDispatchQueue {
    topics: Arc<Mutex<HashMap<Channel, VecDeque<Enqueued>>>>,
}

impl DispatchQueue for InMemoryDispatchQueue {
    fn publish(&self, message: QueueMessage) -> Result<(), QueueError> {
        let mut guard = self.topics.lock().expect("queue mutex poisoned");
        guard
            .entry(message.channel)
            .or_default()
            .push_back(Enqueued {
                visible_at: DateTime::<Utc>::MIN_UTC,
                message,
            });
        Ok(())
    }

    fn receive(
        &self,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueMessage>, QueueError> {
        let mut guard = self.topics.lock().expect("queue mutex poisoned");
        let Some(topic) = guard.get_mut(&channel) else {
            return Ok(None);
        };
        let position = topic
            .iter()
            .position(|enqueued| enqueued.visible_at <= now);
        Ok(position
            .and_then(|index| topic.remove(index))
            .map(|enqueued| enqueued.message))
    }

    fn requeue(
        &self,
        message: QueueMessage,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let visible_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut guard = self.topics.lock().expect("queue mutex poisoned");
        guard
            .entry(message.channel)
            .or_default()
            .push_back(Enqueued {
                message,
                visible_at,
            });
        Ok(())
    }

    fn depth(&self, channel: Channel) -> Result<usize, QueueError> {
        let guard = self.topics.lock().expect("queue mutex poisoned");
        Ok(guard.get(&channel).map_or(0, VecDeque::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: &str) -> QueueMessage {
        QueueMessage {
            schedule_id: ScheduleId(id.to_string()),
            channel: Channel::Email,
            attempt: 0,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn delivers_in_publish_order() {
        let queue = InMemoryDispatchQueue::default();
        queue.publish(message("s-1")).expect("publish");
        queue.publish(message("s-2")).expect("publish");

        let first = queue.receive(Channel::Email, at(1)).expect("receive");
        assert_eq!(first.map(|m| m.schedule_id.0), Some("s-1".to_string()));
        let second = queue.receive(Channel::Email, at(1)).expect("receive");
        assert_eq!(second.map(|m| m.schedule_id.0), Some("s-2".to_string()));
        assert!(queue.receive(Channel::Email, at(1)).expect("receive").is_none());
    }

    #[test]
    fn requeued_message_stays_invisible_until_delay_elapses() {
        let queue = InMemoryDispatchQueue::default();
        queue
            .requeue(message("s-1"), Duration::from_secs(3600), at(1))
            .expect("requeue");

        assert!(queue.receive(Channel::Email, at(1)).expect("receive").is_none());
        let later = queue.receive(Channel::Email, at(3)).expect("receive");
        assert_eq!(later.map(|m| m.schedule_id.0), Some("s-1".to_string()));
    }

    #[test]
    fn topics_are_isolated_per_channel() {
        let queue = InMemoryDispatchQueue::default();
        queue.publish(message("s-1")).expect("publish");
        assert!(queue.receive(Channel::Sms, at(1)).expect("receive").is_none());
        assert_eq!(queue.depth(Channel::Email).expect("depth"), 1);
    }
}
