use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::reconciliation::{ContractId, InstallmentId, PatientId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseId(pub String);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to the matching deal in the external CRM. Linkage is
/// best-effort: a case without one is still actionable, just not
/// cross-referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealReference(pub String);

/// A collection case opened for one long-overdue installment. One case per
/// installment, never per contract: two old installments on the same
/// contract are two cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCase {
    pub id: CaseId,
    pub installment_id: InstallmentId,
    pub contract_id: ContractId,
    pub patient_id: PatientId,
    pub opened_at: DateTime<Utc>,
    pub amount_cents: i64,
    pub deal_reference: Option<DealReference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebtEscalatedEvent {
    pub installment_id: InstallmentId,
    pub case_id: CaseId,
    pub occurred_at: DateTime<Utc>,
    pub deal_reference: Option<DealReference>,
}
