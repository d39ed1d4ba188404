use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::workflows::events::{DomainEvent, EventSink};
use crate::workflows::reconciliation::{
    ContractStore, Installment, InstallmentStore, PatientStore, StoreError,
};

use super::domain::{CaseId, CollectionCase, DealReference, DebtEscalatedEvent};
use super::repository::{CollectionCaseStore, DealLookup, EscalationError};

static CASE_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_case_id() -> CaseId {
    let id = CASE_SEQ.fetch_add(1, Ordering::Relaxed);
    CaseId(format!("case-{id:06}"))
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct EscalationSummary {
    pub scanned: usize,
    pub created: usize,
    pub skipped_existing: usize,
    pub lookup_failures: usize,
    pub failed: usize,
}

/// Sweeps unreceived installments older than the configured threshold and
/// opens one collection case per installment that does not have one yet.
/// The sweep is idempotent; re-running it creates nothing new until more
/// installments age past the threshold.
pub struct EscalationEngine<I, C, P, K, D, E> {
    installments: Arc<I>,
    contracts: Arc<C>,
    patients: Arc<P>,
    cases: Arc<K>,
    deals: Arc<D>,
    events: Arc<E>,
}

impl<I, C, P, K, D, E> EscalationEngine<I, C, P, K, D, E>
where
    I: InstallmentStore,
    C: ContractStore,
    P: PatientStore,
    K: CollectionCaseStore,
    D: DealLookup,
    E: EventSink,
{
    pub fn new(
        installments: Arc<I>,
        contracts: Arc<C>,
        patients: Arc<P>,
        cases: Arc<K>,
        deals: Arc<D>,
        events: Arc<E>,
    ) -> Self {
        Self {
            installments,
            contracts,
            patients,
            cases,
            deals,
            events,
        }
    }

    pub fn run(
        &self,
        threshold_days: i64,
        now: DateTime<Utc>,
    ) -> Result<EscalationSummary, EscalationError> {
        if threshold_days <= 0 {
            return Err(EscalationError::InvalidThreshold(threshold_days));
        }
        let cutoff = now.date_naive() - Duration::days(threshold_days);
        let overdue = self.installments.list_overdue(cutoff)?;

        let mut summary = EscalationSummary::default();
        for installment in overdue {
            summary.scanned += 1;
            match self.escalate(&installment, now, &mut summary) {
                Ok(true) => summary.created += 1,
                Ok(false) => summary.skipped_existing += 1,
                Err(err) => {
                    warn!(installment = %installment.id, error = %err, "escalation failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            scanned = summary.scanned,
            created = summary.created,
            skipped_existing = summary.skipped_existing,
            lookup_failures = summary.lookup_failures,
            failed = summary.failed,
            "escalation sweep finished"
        );
        Ok(summary)
    }

    fn escalate(
        &self,
        installment: &Installment,
        now: DateTime<Utc>,
        summary: &mut EscalationSummary,
    ) -> Result<bool, EscalationError> {
        if self.cases.find_by_installment(&installment.id)?.is_some() {
            return Ok(false);
        }

        let contract = self
            .contracts
            .find(&installment.contract_id)?
            .ok_or(StoreError::NotFound)?;
        let patient = self
            .patients
            .find(&contract.patient_id)?
            .ok_or(StoreError::NotFound)?;

        let deal_reference = self.resolve_deal(patient.tax_id.as_deref(), summary);

        let case = CollectionCase {
            id: next_case_id(),
            installment_id: installment.id.clone(),
            contract_id: contract.id.clone(),
            patient_id: patient.id.clone(),
            opened_at: now,
            amount_cents: installment.amount_cents,
            deal_reference: deal_reference.clone(),
        };

        match self.cases.insert(case.clone()) {
            Ok(()) => {}
            // A concurrent sweep opened the case first.
            Err(StoreError::Conflict) => return Ok(false),
            Err(err) => return Err(err.into()),
        }

        info!(
            case = %case.id,
            installment = %installment.id,
            amount_cents = installment.amount_cents,
            days_overdue = installment.days_overdue(now.date_naive()),
            linked = deal_reference.is_some(),
            "collection case opened"
        );
        self.events
            .publish(DomainEvent::DebtEscalated(DebtEscalatedEvent {
                installment_id: installment.id.clone(),
                case_id: case.id,
                occurred_at: now,
                deal_reference,
            }));
        Ok(true)
    }

    /// A lookup outage never blocks a case: the debt is escalated without
    /// CRM linkage and the miss is counted.
    fn resolve_deal(
        &self,
        tax_id: Option<&str>,
        summary: &mut EscalationSummary,
    ) -> Option<DealReference> {
        let tax_id = tax_id?;
        match self.deals.find_deal(tax_id) {
            Ok(reference) => reference,
            Err(err) => {
                warn!(error = %err, "deal lookup failed, case opens unlinked");
                summary.lookup_failures += 1;
                None
            }
        }
    }
}
