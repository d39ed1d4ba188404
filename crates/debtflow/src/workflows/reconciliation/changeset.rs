use chrono::NaiveDate;

use super::domain::{Contract, ContractStatus, Installment, Patient};

/// Field-level diff against a stored patient. Only fields that actually
/// differ are populated, so applying a changeset writes the minimum set of
/// columns and an empty changeset means the record is already in sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientChanges {
    pub name: Option<String>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub tax_id: Option<Option<String>>,
}

impl PatientChanges {
    pub fn diff(stored: &Patient, incoming: &Patient) -> Self {
        let mut changes = Self::default();
        if stored.name != incoming.name {
            changes.name = Some(incoming.name.clone());
        }
        if stored.email != incoming.email {
            changes.email = Some(incoming.email.clone());
        }
        if stored.phone != incoming.phone {
            changes.phone = Some(incoming.phone.clone());
        }
        if stored.tax_id != incoming.tax_id {
            changes.tax_id = Some(incoming.tax_id.clone());
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    pub fn field_count(&self) -> usize {
        usize::from(self.name.is_some())
            + usize::from(self.email.is_some())
            + usize::from(self.phone.is_some())
            + usize::from(self.tax_id.is_some())
    }

    pub fn apply(self, patient: &mut Patient) {
        if let Some(name) = self.name {
            patient.name = name;
        }
        if let Some(email) = self.email {
            patient.email = email;
        }
        if let Some(phone) = self.phone {
            patient.phone = phone;
        }
        if let Some(tax_id) = self.tax_id {
            patient.tax_id = tax_id;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractChanges {
    pub status: Option<ContractStatus>,
}

impl ContractChanges {
    pub fn diff(stored: &Contract, incoming: &Contract) -> Self {
        let mut changes = Self::default();
        if stored.status != incoming.status {
            changes.status = Some(incoming.status);
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    pub fn field_count(&self) -> usize {
        usize::from(self.status.is_some())
    }

    pub fn apply(self, contract: &mut Contract) {
        if let Some(status) = self.status {
            contract.status = status;
        }
    }
}

/// Installment diff. Once a stored installment is `received`, its amount and
/// due date are frozen: the external system of record occasionally re-emits
/// stale figures for settled installments and those must not reopen history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallmentChanges {
    pub due_date: Option<NaiveDate>,
    pub amount_cents: Option<i64>,
    pub received: Option<bool>,
}

impl InstallmentChanges {
    pub fn diff(stored: &Installment, incoming: &Installment) -> Self {
        let mut changes = Self::default();
        if !stored.received {
            if stored.due_date != incoming.due_date {
                changes.due_date = Some(incoming.due_date);
            }
            if stored.amount_cents != incoming.amount_cents {
                changes.amount_cents = Some(incoming.amount_cents);
            }
        }
        if stored.received != incoming.received && !stored.received {
            changes.received = Some(incoming.received);
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    pub fn field_count(&self) -> usize {
        usize::from(self.due_date.is_some())
            + usize::from(self.amount_cents.is_some())
            + usize::from(self.received.is_some())
    }

    pub fn apply(self, installment: &mut Installment) {
        if let Some(due_date) = self.due_date {
            installment.due_date = due_date;
        }
        if let Some(amount_cents) = self.amount_cents {
            installment.amount_cents = amount_cents;
        }
        if let Some(received) = self.received {
            installment.received = received;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::reconciliation::domain::{ClinicId, ContractId, InstallmentId, PatientId};
    use chrono::{TimeZone, Utc};

    fn patient(name: &str, email: Option<&str>) -> Patient {
        Patient {
            id: PatientId("p-1".to_string()),
            clinic_id: ClinicId("c-1".to_string()),
            name: name.to_string(),
            email: email.map(str::to_string),
            phone: None,
            tax_id: None,
        }
    }

    fn installment(received: bool, amount_cents: i64) -> Installment {
        let contract_id = ContractId("ct-1".to_string());
        Installment {
            id: InstallmentId::derive(&contract_id, 1),
            contract_id,
            sequence: 1,
            due_date: NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date"),
            amount_cents,
            received,
            updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn identical_patients_produce_empty_changeset() {
        let stored = patient("Ana", Some("ana@example.com"));
        let changes = PatientChanges::diff(&stored, &stored.clone());
        assert!(changes.is_empty());
        assert_eq!(changes.field_count(), 0);
    }

    #[test]
    fn only_differing_fields_are_captured() {
        let stored = patient("Ana", Some("ana@example.com"));
        let incoming = patient("Ana Souza", Some("ana@example.com"));
        let changes = PatientChanges::diff(&stored, &incoming);
        assert_eq!(changes.field_count(), 1);
        assert_eq!(changes.name.as_deref(), Some("Ana Souza"));
        assert!(changes.email.is_none());
    }

    #[test]
    fn received_installment_freezes_amount_and_due_date() {
        let stored = installment(true, 10_000);
        let mut incoming = installment(false, 12_000);
        incoming.due_date = NaiveDate::from_ymd_opt(2025, 2, 1).expect("valid date");
        let changes = InstallmentChanges::diff(&stored, &incoming);
        assert!(changes.is_empty(), "settled installments must not reopen");
    }

    #[test]
    fn unreceived_installment_accepts_receipt_and_amount() {
        let stored = installment(false, 10_000);
        let mut incoming = installment(true, 9_500);
        incoming.due_date = stored.due_date;
        let changes = InstallmentChanges::diff(&stored, &incoming);
        assert_eq!(changes.field_count(), 2);
        assert_eq!(changes.amount_cents, Some(9_500));
        assert_eq!(changes.received, Some(true));
    }
}
