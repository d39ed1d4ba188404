use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::workflows::reconciliation::{InstallmentId, StoreError};

use super::domain::{CaseId, CollectionCase, DealReference};
use super::repository::{CollectionCaseStore, DealLookup, LookupError};

#[derive(Default, Clone)]
pub struct InMemoryCollectionCaseStore {
    records: Arc<Mutex<HashMap<CaseId, CollectionCase>>>,
}

impl InMemoryCollectionCaseStore {
    pub fn all(&self) -> Vec<CollectionCase> {
        let guard = self.records.lock().expect("case store mutex poisoned");
        let mut cases: Vec<CollectionCase> = guard.values().cloned().collect();
        cases.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        cases
    }
}

impl CollectionCaseStore for InMemoryCollectionCaseStore {
    fn find_by_installment(
        &self,
        installment: &InstallmentId,
    ) -> Result<Option<CollectionCase>, StoreError> {
        let guard = self.records.lock().expect("case store mutex poisoned");
        Ok(guard
            .values()
            .find(|case| &case.installment_id == installment)
            .cloned())
    }

    fn insert(&self, case: CollectionCase) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("case store mutex poisoned");
        let duplicate = guard.contains_key(&case.id)
            || guard
                .values()
                .any(|existing| existing.installment_id == case.installment_id);
        if duplicate {
            return Err(StoreError::Conflict);
        }
        guard.insert(case.id.clone(), case);
        Ok(())
    }
}

/// Fixed tax-id-to-deal table standing in for the CRM in tests and the
/// demo.
#[derive(Default, Clone)]
pub struct InMemoryDealLookup {
    deals: Arc<Mutex<HashMap<String, DealReference>>>,
}

impl InMemoryDealLookup {
    pub fn register(&self, tax_id: &str, reference: DealReference) {
        self.deals
            .lock()
            .expect("deal lookup mutex poisoned")
            .insert(tax_id.to_string(), reference);
    }
}

impl DealLookup for InMemoryDealLookup {
    fn find_deal(&self, tax_id: &str) -> Result<Option<DealReference>, LookupError> {
        let guard = self.deals.lock().expect("deal lookup mutex poisoned");
        Ok(guard.get(tax_id).cloned())
    }
}
