use chrono::{DateTime, NaiveDate, Utc};

use super::changeset::{ContractChanges, InstallmentChanges, PatientChanges};
use super::domain::{ClinicId, Contract, ContractId, Installment, InstallmentId, Patient, PatientId};

/// Error enumeration for storage failures, shared by every store trait in
/// the engine (the planner, dispatcher, and escalation sweep read the same
/// contract/installment store the reconciliation engine writes).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for patients. Writes are either whole-record inserts
/// or narrow changeset applications; there is no whole-record overwrite, so
/// concurrent reconciliation runs converge field by field.
pub trait PatientStore: Send + Sync {
    fn find(&self, id: &PatientId) -> Result<Option<Patient>, StoreError>;
    fn insert(&self, patient: Patient) -> Result<(), StoreError>;
    fn apply(&self, id: &PatientId, changes: PatientChanges) -> Result<(), StoreError>;
    fn list_by_clinic(&self, clinic: &ClinicId) -> Result<Vec<Patient>, StoreError>;
}

pub trait ContractStore: Send + Sync {
    fn find(&self, id: &ContractId) -> Result<Option<Contract>, StoreError>;
    fn insert(&self, contract: Contract) -> Result<(), StoreError>;
    fn apply(&self, id: &ContractId, changes: ContractChanges) -> Result<(), StoreError>;
    fn list_by_clinic(&self, clinic: &ClinicId) -> Result<Vec<Contract>, StoreError>;
}

pub trait InstallmentStore: Send + Sync {
    fn find(&self, id: &InstallmentId) -> Result<Option<Installment>, StoreError>;
    fn insert(&self, installment: Installment) -> Result<(), StoreError>;
    /// Applies a changeset and, when it is non-empty, touches the
    /// last-modified timestamp. Applying an empty changeset is a no-op.
    fn apply(
        &self,
        id: &InstallmentId,
        changes: InstallmentChanges,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Installments for one contract, ordered by sequence number.
    fn list_by_contract(&self, contract: &ContractId) -> Result<Vec<Installment>, StoreError>;
    /// The lowest-sequence unreceived installment, if any. This is the
    /// installment the notification flow chases.
    fn current_outstanding(&self, contract: &ContractId)
        -> Result<Option<Installment>, StoreError>;
    /// Unreceived installments with a due date strictly before `cutoff`.
    fn list_overdue(&self, cutoff: NaiveDate) -> Result<Vec<Installment>, StoreError>;
}
