use chrono::{DateTime, Utc};

use crate::workflows::reconciliation::{ContractId, StoreError};

use super::domain::{
    Channel, ContactHistory, ContactSchedule, MessageTemplate, ScheduleId, ScheduleStatus,
};

/// Storage abstraction for contact schedules. The at-most-one-PENDING
/// invariant lives here: `insert_pending` must check and insert inside one
/// critical section, so concurrent planner invocations cannot race a second
/// PENDING schedule into existence.
pub trait ScheduleStore: Send + Sync {
    fn find(&self, id: &ScheduleId) -> Result<Option<ContactSchedule>, StoreError>;
    /// Inserts a PENDING schedule, failing with `Conflict` when the contract
    /// already has one.
    fn insert_pending(&self, schedule: ContactSchedule) -> Result<(), StoreError>;
    fn set_status(
        &self,
        id: &ScheduleId,
        status: ScheduleStatus,
    ) -> Result<ContactSchedule, StoreError>;
    /// Increments the attempt counter and returns the new value.
    fn record_attempt(&self, id: &ScheduleId) -> Result<u32, StoreError>;
    /// Parks the schedule under a retry backoff: it is not due again until
    /// `until` has passed.
    fn defer_retry(&self, id: &ScheduleId, until: DateTime<Utc>) -> Result<(), StoreError>;
    fn find_pending_for_contract(
        &self,
        contract: &ContractId,
    ) -> Result<Option<ContactSchedule>, StoreError>;
    /// Every schedule ever created for a contract; the planner derives the
    /// current step from this.
    fn list_for_contract(&self, contract: &ContractId)
        -> Result<Vec<ContactSchedule>, StoreError>;
    /// PENDING schedules whose scheduled time has passed and that are not
    /// parked under a retry backoff, oldest first.
    fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ContactSchedule>, StoreError>;
}

/// Append-only dispatch log. Never updated in place; duplicate rows from
/// queue redelivery are an accepted artifact of the at-least-once contract.
pub trait HistoryStore: Send + Sync {
    fn append(&self, history: ContactHistory) -> Result<(), StoreError>;
    fn list_for_schedule(&self, schedule: &ScheduleId)
        -> Result<Vec<ContactHistory>, StoreError>;
    /// Channels that already failed for this contract within one step,
    /// feeding channel selection on the step retry path.
    fn failed_channels(&self, contract: &ContractId, step: u32)
        -> Result<Vec<Channel>, StoreError>;
}

pub trait TemplateStore: Send + Sync {
    /// The most recently created active template for (step, channel), if any.
    fn find(&self, step: u32, channel: Channel) -> Result<Option<MessageTemplate>, StoreError>;
    fn insert(&self, template: MessageTemplate) -> Result<(), StoreError>;
}
