use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};

use super::changeset::{ContractChanges, InstallmentChanges, PatientChanges};
use super::domain::{ClinicId, Contract, ContractId, Installment, InstallmentId, Patient, PatientId};
use super::repository::{ContractStore, InstallmentStore, PatientStore, StoreError};

#[derive(Default, Clone)]
pub struct InMemoryPatientStore {
    records: Arc<Mutex<HashMap<PatientId, Patient>>>,
}

impl PatientStore for InMemoryPatientStore {
    fn find(&self, id: &PatientId) -> Result<Option<Patient>, StoreError> {
        let guard = self.records.lock().expect("patient store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn insert(&self, patient: Patient) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("patient store mutex poisoned");
        if guard.contains_key(&patient.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(patient.id.clone(), patient);
        Ok(())
    }

    fn apply(&self, id: &PatientId, changes: PatientChanges) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("patient store mutex poisoned");
        let patient = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        changes.apply(patient);
        Ok(())
    }

    fn list_by_clinic(&self, clinic: &ClinicId) -> Result<Vec<Patient>, StoreError> {
        let guard = self.records.lock().expect("patient store mutex poisoned");
        Ok(guard
            .values()
            .filter(|patient| &patient.clinic_id == clinic)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryContractStore {
    records: Arc<Mutex<HashMap<ContractId, Contract>>>,
}

impl ContractStore for InMemoryContractStore {
    fn find(&self, id: &ContractId) -> Result<Option<Contract>, StoreError> {
        let guard = self.records.lock().expect("contract store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn insert(&self, contract: Contract) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("contract store mutex poisoned");
        if guard.contains_key(&contract.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(contract.id.clone(), contract);
        Ok(())
    }

    fn apply(&self, id: &ContractId, changes: ContractChanges) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("contract store mutex poisoned");
        let contract = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        changes.apply(contract);
        Ok(())
    }

    fn list_by_clinic(&self, clinic: &ClinicId) -> Result<Vec<Contract>, StoreError> {
        let guard = self.records.lock().expect("contract store mutex poisoned");
        Ok(guard
            .values()
            .filter(|contract| &contract.clinic_id == clinic)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryInstallmentStore {
    records: Arc<Mutex<HashMap<InstallmentId, Installment>>>,
}

impl InMemoryInstallmentStore {
    /// Test and demo helper: flips the received flag directly, the way a
    /// payment posted by the external system lands between sync runs.
    pub fn mark_received(&self, id: &InstallmentId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("installment store mutex poisoned");
        let installment = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        installment.received = true;
        installment.updated_at = now;
        Ok(())
    }
}

impl InstallmentStore for InMemoryInstallmentStore {
    fn find(&self, id: &InstallmentId) -> Result<Option<Installment>, StoreError> {
        let guard = self.records.lock().expect("installment store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn insert(&self, installment: Installment) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("installment store mutex poisoned");
        if guard.contains_key(&installment.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(installment.id.clone(), installment);
        Ok(())
    }

    fn apply(
        &self,
        id: &InstallmentId,
        changes: InstallmentChanges,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut guard = self.records.lock().expect("installment store mutex poisoned");
        let installment = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        changes.apply(installment);
        installment.updated_at = now;
        Ok(())
    }

    fn list_by_contract(&self, contract: &ContractId) -> Result<Vec<Installment>, StoreError> {
        let guard = self.records.lock().expect("installment store mutex poisoned");
        let mut rows: Vec<Installment> = guard
            .values()
            .filter(|installment| &installment.contract_id == contract)
            .cloned()
            .collect();
        rows.sort_by_key(|installment| installment.sequence);
        Ok(rows)
    }

    fn current_outstanding(
        &self,
        contract: &ContractId,
    ) -> Result<Option<Installment>, StoreError> {
        Ok(self
            .list_by_contract(contract)?
            .into_iter()
            .find(|installment| !installment.received))
    }

    fn list_overdue(&self, cutoff: NaiveDate) -> Result<Vec<Installment>, StoreError> {
        let guard = self.records.lock().expect("installment store mutex poisoned");
        let mut rows: Vec<Installment> = guard
            .values()
            .filter(|installment| !installment.received && installment.due_date < cutoff)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.due_date, a.sequence).cmp(&(b.due_date, b.sequence)));
        Ok(rows)
    }
}
