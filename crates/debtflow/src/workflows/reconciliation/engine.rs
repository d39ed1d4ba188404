use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::changeset::{ContractChanges, InstallmentChanges, PatientChanges};
use super::domain::{
    ClinicId, Contract, ContractId, ContractStatus, Installment, InstallmentId, Patient, PatientId,
};
use super::dto::{ContractRecord, DelinquencySnapshot, InstallmentRecord, PatientRecord};
use super::repository::{ContractStore, InstallmentStore, PatientStore, StoreError};

/// Per-batch outcome of a reconciliation run. Failures are captured per
/// record; the caller decides what to do with them (log, count, alert), the
/// engine never aborts the batch on a single bad snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub processed: usize,
    pub failed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub fields_written: usize,
    pub errors: Vec<RecordError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordError {
    pub patient_external_id: String,
    pub reason: String,
}

/// Merges externally-fetched delinquency snapshots into local storage with
/// minimal, idempotent writes: every entity is matched by its external
/// identifier, diffed field by field, and only the differing fields are
/// applied. Re-running the same batch writes nothing.
pub struct ReconciliationEngine<P, C, I> {
    patients: Arc<P>,
    contracts: Arc<C>,
    installments: Arc<I>,
}

impl<P, C, I> ReconciliationEngine<P, C, I>
where
    P: PatientStore,
    C: ContractStore,
    I: InstallmentStore,
{
    pub fn new(patients: Arc<P>, contracts: Arc<C>, installments: Arc<I>) -> Self {
        Self {
            patients,
            contracts,
            installments,
        }
    }

    pub fn reconcile(
        &self,
        clinic: &ClinicId,
        batch: &[DelinquencySnapshot],
        now: DateTime<Utc>,
    ) -> SyncSummary {
        let mut summary = SyncSummary::default();

        for snapshot in batch {
            if let Err(reason) = validate_snapshot(snapshot) {
                warn!(
                    patient = %snapshot.patient.external_id,
                    %reason,
                    "skipping malformed snapshot"
                );
                summary.failed += 1;
                summary.errors.push(RecordError {
                    patient_external_id: snapshot.patient.external_id.clone(),
                    reason,
                });
                continue;
            }

            match self.reconcile_snapshot(clinic, snapshot, now, &mut summary) {
                Ok(()) => summary.processed += 1,
                Err(err) => {
                    warn!(
                        patient = %snapshot.patient.external_id,
                        error = %err,
                        "snapshot failed to persist"
                    );
                    summary.failed += 1;
                    summary.errors.push(RecordError {
                        patient_external_id: snapshot.patient.external_id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            clinic = %clinic,
            processed = summary.processed,
            failed = summary.failed,
            fields_written = summary.fields_written,
            "reconciliation run complete"
        );
        summary
    }

    fn reconcile_snapshot(
        &self,
        clinic: &ClinicId,
        snapshot: &DelinquencySnapshot,
        now: DateTime<Utc>,
        summary: &mut SyncSummary,
    ) -> Result<(), StoreError> {
        let patient_id = self.upsert_patient(clinic, &snapshot.patient, summary)?;

        for record in &snapshot.contracts {
            let contract_id = self.upsert_contract(clinic, &patient_id, record, summary)?;
            for installment in &record.installments {
                self.upsert_installment(&contract_id, installment, now, summary)?;
            }
        }

        Ok(())
    }

    fn upsert_patient(
        &self,
        clinic: &ClinicId,
        record: &PatientRecord,
        summary: &mut SyncSummary,
    ) -> Result<PatientId, StoreError> {
        let incoming = Patient {
            id: PatientId(record.external_id.clone()),
            clinic_id: clinic.clone(),
            name: record.name.clone(),
            email: record.email.clone(),
            phone: record.phone.clone(),
            tax_id: record.tax_id.clone(),
        };
        let id = incoming.id.clone();

        match self.patients.find(&id)? {
            Some(stored) => {
                let changes = PatientChanges::diff(&stored, &incoming);
                if changes.is_empty() {
                    summary.unchanged += 1;
                } else {
                    summary.fields_written += changes.field_count();
                    summary.updated += 1;
                    self.patients.apply(&id, changes)?;
                }
            }
            None => {
                self.patients.insert(incoming)?;
                summary.created += 1;
            }
        }

        Ok(id)
    }

    fn upsert_contract(
        &self,
        clinic: &ClinicId,
        patient_id: &PatientId,
        record: &ContractRecord,
        summary: &mut SyncSummary,
    ) -> Result<ContractId, StoreError> {
        let incoming = Contract {
            id: ContractId(record.external_id.clone()),
            patient_id: patient_id.clone(),
            clinic_id: clinic.clone(),
            status: if record.active {
                ContractStatus::Active
            } else {
                ContractStatus::Inactive
            },
        };
        let id = incoming.id.clone();

        match self.contracts.find(&id)? {
            Some(stored) => {
                let changes = ContractChanges::diff(&stored, &incoming);
                if changes.is_empty() {
                    summary.unchanged += 1;
                } else {
                    summary.fields_written += changes.field_count();
                    summary.updated += 1;
                    self.contracts.apply(&id, changes)?;
                }
            }
            None => {
                self.contracts.insert(incoming)?;
                summary.created += 1;
            }
        }

        Ok(id)
    }

    fn upsert_installment(
        &self,
        contract_id: &ContractId,
        record: &InstallmentRecord,
        now: DateTime<Utc>,
        summary: &mut SyncSummary,
    ) -> Result<(), StoreError> {
        let incoming = Installment {
            id: InstallmentId::derive(contract_id, record.sequence),
            contract_id: contract_id.clone(),
            sequence: record.sequence,
            due_date: record.due_date,
            amount_cents: record.amount_cents,
            received: record.received,
            updated_at: now,
        };
        let id = incoming.id.clone();

        match self.installments.find(&id)? {
            Some(stored) => {
                let changes = InstallmentChanges::diff(&stored, &incoming);
                if changes.is_empty() {
                    summary.unchanged += 1;
                } else {
                    summary.fields_written += changes.field_count();
                    summary.updated += 1;
                    self.installments.apply(&id, changes, now)?;
                }
            }
            None => {
                self.installments.insert(incoming)?;
                summary.created += 1;
            }
        }

        Ok(())
    }
}

fn validate_snapshot(snapshot: &DelinquencySnapshot) -> Result<(), String> {
    if snapshot.patient.external_id.trim().is_empty() {
        return Err("patient external_id is blank".to_string());
    }
    if snapshot.patient.name.trim().is_empty() {
        return Err("patient name is blank".to_string());
    }

    for contract in &snapshot.contracts {
        if contract.external_id.trim().is_empty() {
            return Err(format!(
                "contract with blank external_id for patient {}",
                snapshot.patient.external_id
            ));
        }

        let mut seen = HashSet::new();
        for installment in &contract.installments {
            if installment.amount_cents < 0 {
                return Err(format!(
                    "negative amount on contract {} installment {}",
                    contract.external_id, installment.sequence
                ));
            }
            if !seen.insert(installment.sequence) {
                return Err(format!(
                    "duplicate installment sequence {} on contract {}",
                    installment.sequence, contract.external_id
                ));
            }
        }
    }

    Ok(())
}
