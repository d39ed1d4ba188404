use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One patient's delinquency picture as returned by the external billing
/// source for a (clinic, date range) query. The source may return partial
/// records; validation happens in the engine, not at deserialization time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelinquencySnapshot {
    pub patient: PatientRecord,
    #[serde(default)]
    pub contracts: Vec<ContractRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractRecord {
    pub external_id: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub installments: Vec<InstallmentRecord>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallmentRecord {
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub amount_cents: i64,
    #[serde(default)]
    pub received: bool,
}
