//! Old-debt escalation: installments that stay unreceived past the
//! configured age are promoted out of the notification flow into collection
//! cases, optionally linked to the matching deal in the external CRM.

pub mod domain;
pub mod memory;
pub mod repository;

mod engine;

pub use domain::{CaseId, CollectionCase, DealReference, DebtEscalatedEvent};
pub use engine::{EscalationEngine, EscalationSummary};
pub use memory::{InMemoryCollectionCaseStore, InMemoryDealLookup};
pub use repository::{CollectionCaseStore, DealLookup, EscalationError, LookupError};
