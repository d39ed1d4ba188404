//! The contact state machine: per-contract escalation steps, schedule
//! planning, the durable dispatch queue boundary, and the retrying
//! dispatcher that resolves each planned contact.
//!
//! A contract holds at most one live (PENDING) schedule at a time. The
//! planner creates schedules, the publisher moves due ones onto per-channel
//! queue topics, and the dispatcher drives each to SENT, FAILED, or
//! CANCELLED, logging every resolution to the append-only contact history.

pub mod domain;
pub mod flow;
pub mod memory;
pub mod planner;
pub mod publisher;
pub mod queue;
pub mod repository;
pub mod template;

mod dispatcher;

#[cfg(test)]
mod tests;

pub use dispatcher::{
    ChannelSender, DispatchError, DispatchOutcome, DrainSummary, NotificationDispatcher,
    RetryPolicy, SendError,
};
pub use domain::{
    Channel, ContactHistory, ContactSchedule, HistoryId, MessageTemplate, ScheduleId,
    ScheduleStatus, StepCatalog, StepConfig, TemplateId,
};
pub use flow::{next_step, select_channel, should_cancel};
pub use memory::{InMemoryHistoryStore, InMemoryScheduleStore, InMemoryTemplateStore};
pub use planner::{PlanError, PlanOutcome, PlanSummary, SchedulePlanner};
pub use publisher::DueSchedulePublisher;
pub use queue::{DispatchQueue, InMemoryDispatchQueue, QueueError, QueueMessage};
pub use repository::{HistoryStore, ScheduleStore, TemplateStore};
pub use template::{format_amount, message_vars, render, TemplateError};
