//! Reconciliation of externally-synced billing data into local storage.
//!
//! The external billing system is the system of record, but it can return
//! inconsistent or partial data. This module turns its per-clinic snapshots
//! into a durable local mirror using per-field diffs, so re-running a sync
//! never churns timestamps or clobbers concurrent writes.

mod changeset;
pub mod domain;
pub mod dto;
mod engine;
mod memory;
pub mod repository;

pub use changeset::{ContractChanges, InstallmentChanges, PatientChanges};
pub use domain::{
    ClinicId, Contract, ContractId, ContractStatus, Installment, InstallmentId, Patient, PatientId,
};
pub use dto::{ContractRecord, DelinquencySnapshot, InstallmentRecord, PatientRecord};
pub use engine::{ReconciliationEngine, RecordError, SyncSummary};
pub use memory::{InMemoryContractStore, InMemoryInstallmentStore, InMemoryPatientStore};
pub use repository::{ContractStore, InstallmentStore, PatientStore, StoreError};
