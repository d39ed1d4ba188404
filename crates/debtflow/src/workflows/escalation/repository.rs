use crate::workflows::reconciliation::{InstallmentId, StoreError};

use super::domain::{CollectionCase, DealReference};

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("deal lookup unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("escalation threshold must be positive, got {0}")]
    InvalidThreshold(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Storage abstraction for collection cases. `insert` must reject a second
/// case for the same installment, so the sweep stays idempotent under
/// concurrent runs.
pub trait CollectionCaseStore: Send + Sync {
    fn find_by_installment(
        &self,
        installment: &InstallmentId,
    ) -> Result<Option<CollectionCase>, StoreError>;
    fn insert(&self, case: CollectionCase) -> Result<(), StoreError>;
}

/// External CRM boundary: resolves a patient's tax id to the deal tracking
/// that patient's debt, when one exists.
pub trait DealLookup: Send + Sync {
    fn find_deal(&self, tax_id: &str) -> Result<Option<DealReference>, LookupError>;
}
