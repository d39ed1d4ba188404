use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::workflows::events::{DomainEvent, EventSink};
use crate::workflows::reconciliation::{Contract, ContractStatus, InstallmentStore, StoreError};

use super::domain::{ContactSchedule, ScheduleId, ScheduleStatus, StepCatalog};
use super::flow::select_channel;
use super::repository::{HistoryStore, ScheduleStore};

static SCHEDULE_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_schedule_id() -> ScheduleId {
    let id = SCHEDULE_SEQ.fetch_add(1, Ordering::Relaxed);
    ScheduleId(format!("sch-{id:06}"))
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("no active notification steps are configured")]
    NoStepConfig,
    #[error("step {step} names no channels")]
    NoChannelForStep { step: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What planning decided for a single contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// A new PENDING schedule was created.
    Scheduled(ContactSchedule),
    /// The contract already has a live schedule; nothing to add.
    AlreadyPending,
    /// The highest configured step has already resolved for this contract.
    /// Step derivation follows the contract's whole schedule tail, not any
    /// single installment.
    Complete,
    /// Every installment on the contract has been received.
    NothingOutstanding,
    /// The contract is inactive and outside the notification flow.
    Inactive,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct PlanSummary {
    pub scanned: usize,
    pub scheduled: usize,
    pub already_pending: usize,
    pub complete: usize,
    pub nothing_outstanding: usize,
    pub inactive: usize,
    pub failed: usize,
}

/// Decides, per contract, whether a new contact attempt should exist and at
/// which step and channel. Planning is idempotent: re-running it while a
/// PENDING schedule exists changes nothing, so it can sit behind a cron
/// trigger or fire after every reconciliation pass.
pub struct SchedulePlanner<S, I, H, E> {
    schedules: Arc<S>,
    installments: Arc<I>,
    history: Arc<H>,
    events: Arc<E>,
    catalog: StepCatalog,
}

impl<S, I, H, E> SchedulePlanner<S, I, H, E>
where
    S: ScheduleStore,
    I: InstallmentStore,
    H: HistoryStore,
    E: EventSink,
{
    pub fn new(
        schedules: Arc<S>,
        installments: Arc<I>,
        history: Arc<H>,
        events: Arc<E>,
        catalog: StepCatalog,
    ) -> Self {
        Self {
            schedules,
            installments,
            history,
            events,
            catalog,
        }
    }

    /// Plans one contract against the current outstanding installment.
    ///
    /// Step selection follows the resolved tail of the contract's schedule
    /// history: SENT and CANCELLED advance to the next configured step,
    /// FAILED re-enters the same step on a channel that has not failed
    /// there yet, and no history at all starts at the first step.
    pub fn plan_contract(
        &self,
        contract: &Contract,
        now: DateTime<Utc>,
    ) -> Result<PlanOutcome, PlanError> {
        if self.catalog.is_empty() {
            return Err(PlanError::NoStepConfig);
        }
        if contract.status != ContractStatus::Active {
            return Ok(PlanOutcome::Inactive);
        }

        let Some(installment) = self.installments.current_outstanding(&contract.id)? else {
            return Ok(PlanOutcome::NothingOutstanding);
        };

        if self.schedules.find_pending_for_contract(&contract.id)?.is_some() {
            return Ok(PlanOutcome::AlreadyPending);
        }

        let history = self.schedules.list_for_contract(&contract.id)?;
        let last_resolved = history
            .iter()
            .filter(|schedule| schedule.status.is_terminal())
            .max_by_key(|schedule| (schedule.step, schedule.scheduled_at));

        let step = match last_resolved {
            None => self.catalog.first_step().map(|config| config.step),
            Some(last) => match last.status {
                ScheduleStatus::Failed => Some(last.step),
                _ => self.catalog.next_step(last.step).map(|config| config.step),
            },
        };
        let Some(step) = step else {
            return Ok(PlanOutcome::Complete);
        };
        let config = self
            .catalog
            .find(step)
            .ok_or(PlanError::NoStepConfig)?;

        let failed = self.history.failed_channels(&contract.id, step)?;
        let channel = select_channel(config, &failed)
            .ok_or(PlanError::NoChannelForStep { step })?;

        // First contact counts the cooldown from the due date, so a freshly
        // synced old debt fires promptly instead of waiting out the cooldown
        // from an arbitrary sync time. Later steps count from planning time,
        // which runs right after the previous step resolves.
        let due = installment
            .due_date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now);
        let anchor = if last_resolved.is_none() { due } else { now };
        let scheduled_at = (anchor + Duration::days(config.cooldown_days)).max(now);

        let schedule = ContactSchedule {
            id: next_schedule_id(),
            contract_id: contract.id.clone(),
            patient_id: contract.patient_id.clone(),
            installment_id: installment.id.clone(),
            step,
            channel,
            scheduled_at,
            status: ScheduleStatus::Pending,
            attempts: 0,
            next_attempt_at: None,
        };

        match self.schedules.insert_pending(schedule.clone()) {
            Ok(()) => {}
            // Lost a race with a concurrent planner run; their schedule wins.
            Err(StoreError::Conflict) => return Ok(PlanOutcome::AlreadyPending),
            Err(err) => return Err(err.into()),
        }

        info!(
            schedule = %schedule.id,
            contract = %contract.id,
            step,
            channel = %channel,
            scheduled_at = %scheduled_at,
            "contact scheduled"
        );
        self.events.publish(DomainEvent::NotificationScheduled {
            schedule_id: schedule.id.clone(),
            contract_id: contract.id.clone(),
            step,
            channel,
            scheduled_at,
        });

        Ok(PlanOutcome::Scheduled(schedule))
    }

    /// Plans a batch of contracts, tallying outcomes. A store failure on one
    /// contract is logged and counted, never aborting the sweep.
    pub fn plan_batch(
        &self,
        contracts: &[Contract],
        now: DateTime<Utc>,
    ) -> Result<PlanSummary, PlanError> {
        if self.catalog.is_empty() {
            return Err(PlanError::NoStepConfig);
        }
        let mut summary = PlanSummary::default();
        for contract in contracts {
            summary.scanned += 1;
            match self.plan_contract(contract, now) {
                Ok(PlanOutcome::Scheduled(_)) => summary.scheduled += 1,
                Ok(PlanOutcome::AlreadyPending) => summary.already_pending += 1,
                Ok(PlanOutcome::Complete) => {
                    debug!(contract = %contract.id, "notification flow complete");
                    summary.complete += 1;
                }
                Ok(PlanOutcome::NothingOutstanding) => summary.nothing_outstanding += 1,
                Ok(PlanOutcome::Inactive) => summary.inactive += 1,
                Err(err) => {
                    warn!(contract = %contract.id, error = %err, "planning failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}
