pub mod escalation;
pub mod events;
pub mod notification;
pub mod reconciliation;
