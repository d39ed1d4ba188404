use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::workflows::reconciliation::{ContractId, InstallmentId, PatientId};

/// Delivery channel for one contact attempt. Each channel maps to one queue
/// topic and one sender capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Whatsapp,
}

impl Channel {
    pub const fn ordered() -> [Self; 3] {
        [Self::Email, Self::Sms, Self::Whatsapp]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One stage of the escalation ladder: which channels it may use and how
/// many days after the anchor date it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    pub step: u32,
    pub channels: Vec<Channel>,
    pub cooldown_days: i64,
    pub active: bool,
}

/// Ordered catalog of configured steps. Steps are externally configured;
/// an empty catalog is a fatal configuration error surfaced at planning
/// time, not a panic.
#[derive(Debug, Clone, Default)]
pub struct StepCatalog {
    steps: Vec<StepConfig>,
}

impl StepCatalog {
    pub fn new(mut steps: Vec<StepConfig>) -> Self {
        steps.retain(|config| config.active);
        steps.sort_by_key(|config| config.step);
        steps.dedup_by_key(|config| config.step);
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn first_step(&self) -> Option<&StepConfig> {
        self.steps.first()
    }

    pub fn find(&self, step: u32) -> Option<&StepConfig> {
        self.steps.iter().find(|config| config.step == step)
    }

    pub fn max_step(&self) -> Option<u32> {
        self.steps.last().map(|config| config.step)
    }

    /// The next configured step strictly greater than `current`, or `None`
    /// when `current` is already the highest configured step.
    pub fn next_step(&self, current: u32) -> Option<&StepConfig> {
        self.steps.iter().find(|config| config.step > current)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub String);

/// Message body for one (step, channel) pair with `{{ placeholder }}`
/// variables. Several templates may exist per pair; the most recently
/// created active one wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub id: TemplateId,
    pub step: u32,
    pub channel: Channel,
    pub content: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleId(pub String);

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl ScheduleStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One planned contact attempt: the state-machine instance the planner
/// creates and the dispatcher resolves. Retry state lives here explicitly
/// (`attempts` plus `next_attempt_at`), not in broker redelivery counts,
/// so exhaustion and backoff are deterministic and testable without a real
/// broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSchedule {
    pub id: ScheduleId,
    pub contract_id: ContractId,
    pub patient_id: PatientId,
    pub installment_id: InstallmentId,
    pub step: u32,
    pub channel: Channel,
    pub scheduled_at: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub attempts: u32,
    /// Set while a failed attempt waits out its backoff; the schedule is
    /// not due again before this passes.
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl ContactSchedule {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Pending
            && self.scheduled_at <= now
            && self.next_attempt_at.map_or(true, |at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryId(pub String);

/// Append-only record of one resolved dispatch. History is a log, not a
/// single-slot cache: redelivery after a crash may produce a duplicate row
/// and consumers must tolerate that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactHistory {
    pub id: HistoryId,
    pub schedule_id: ScheduleId,
    pub contract_id: ContractId,
    pub patient_id: PatientId,
    pub step: u32,
    pub channel: Channel,
    pub sent_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(step: u32, active: bool) -> StepConfig {
        StepConfig {
            step,
            channels: vec![Channel::Email],
            cooldown_days: 7,
            active,
        }
    }

    #[test]
    fn catalog_orders_and_drops_inactive_steps() {
        let catalog = StepCatalog::new(vec![step(2, true), step(0, true), step(1, false)]);
        assert_eq!(catalog.first_step().map(|c| c.step), Some(0));
        assert_eq!(catalog.max_step(), Some(2));
        assert!(catalog.find(1).is_none());
    }

    #[test]
    fn next_step_skips_to_strictly_greater() {
        let catalog = StepCatalog::new(vec![step(0, true), step(3, true)]);
        assert_eq!(catalog.next_step(0).map(|c| c.step), Some(3));
        assert_eq!(catalog.next_step(3).map(|c| c.step), None);
    }
}
