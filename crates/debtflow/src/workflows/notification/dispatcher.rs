use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::workflows::events::{DomainEvent, EventSink};
use crate::workflows::reconciliation::{
    ContractStore, Installment, InstallmentStore, Patient, PatientStore, StoreError,
};

use super::domain::{
    Channel, ContactHistory, ContactSchedule, HistoryId, ScheduleId, ScheduleStatus, StepCatalog,
};
use super::flow::should_cancel;
use super::planner::SchedulePlanner;
use super::queue::{DispatchQueue, QueueError, QueueMessage};
use super::repository::{HistoryStore, ScheduleStore, TemplateStore};
use super::template::{self, TemplateError};

static HISTORY_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_history_id() -> HistoryId {
    let id = HISTORY_SEQ.fetch_add(1, Ordering::Relaxed);
    HistoryId(format!("hist-{id:06}"))
}

/// A provider-side send failure. All transport failures are retryable from
/// the dispatcher's point of view; permanently bad input is caught before
/// the send as a validation failure.
#[derive(Debug, thiserror::Error)]
#[error("send via {channel} failed: {reason}")]
pub struct SendError {
    pub channel: Channel,
    pub reason: String,
}

/// One provider integration (mail relay, SMS gateway, messaging API).
pub trait ChannelSender: Send + Sync {
    fn send(&self, recipient: &str, content: &str) -> Result<(), SendError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no sender registered for channel {0}")]
    NoSender(Channel),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Bounded-retry schedule: attempt `n` failing requeues the message with a
/// delay of `base * 2^(n-1)`, until `max_attempts` tries have been burned.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(60),
        }
    }
}

/// How one queue message was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Cancelled,
    /// Transport failed with attempts left; the message went back on the
    /// queue under a backoff delay.
    Retried { attempt: u32, delay: Duration },
    Failed { reason: String },
    /// Stale or duplicate delivery; the schedule had already resolved.
    Skipped,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DrainSummary {
    pub processed: usize,
    pub sent: usize,
    pub cancelled: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Consumes queue messages and drives each schedule to a terminal status.
///
/// Invariants enforced here: the received flag is re-checked immediately
/// before every send, a terminal schedule is never re-sent, and exactly one
/// history row is written per resolution (success, validation failure, or
/// retry exhaustion). History is appended before the status flips, so a
/// crash between the two re-delivers into the duplicate-tolerant path
/// rather than losing the audit row. Once a schedule settles, the contract
/// loops straight back into planning so the follow-up step exists without
/// waiting for the next reconciliation pass.
pub struct NotificationDispatcher<S, H, T, C, P, I, Q, E> {
    schedules: Arc<S>,
    history: Arc<H>,
    templates: Arc<T>,
    contracts: Arc<C>,
    patients: Arc<P>,
    installments: Arc<I>,
    queue: Arc<Q>,
    events: Arc<E>,
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    planner: SchedulePlanner<S, I, H, E>,
    policy: RetryPolicy,
}

impl<S, H, T, C, P, I, Q, E> NotificationDispatcher<S, H, T, C, P, I, Q, E>
where
    S: ScheduleStore,
    H: HistoryStore,
    T: TemplateStore,
    C: ContractStore,
    P: PatientStore,
    I: InstallmentStore,
    Q: DispatchQueue,
    E: EventSink,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schedules: Arc<S>,
        history: Arc<H>,
        templates: Arc<T>,
        contracts: Arc<C>,
        patients: Arc<P>,
        installments: Arc<I>,
        queue: Arc<Q>,
        events: Arc<E>,
        senders: HashMap<Channel, Arc<dyn ChannelSender>>,
        catalog: StepCatalog,
        policy: RetryPolicy,
    ) -> Self {
        let planner = SchedulePlanner::new(
            schedules.clone(),
            installments.clone(),
            history.clone(),
            events.clone(),
            catalog,
        );
        Self {
            schedules,
            history,
            templates,
            contracts,
            patients,
            installments,
            queue,
            events,
            senders,
            planner,
            policy,
        }
    }

    /// Resolves one queue message against the current schedule state.
    pub fn process(
        &self,
        message: &QueueMessage,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(schedule) = self.schedules.find(&message.schedule_id)? else {
            warn!(schedule = %message.schedule_id, "message for unknown schedule dropped");
            return Ok(DispatchOutcome::Skipped);
        };
        if schedule.status.is_terminal() {
            return Ok(DispatchOutcome::Skipped);
        }
        // A duplicate delivery while the retry sits under its backoff must
        // not burn an extra attempt; the parked message resolves it later.
        if schedule.next_attempt_at.is_some_and(|at| at > now) {
            return Ok(DispatchOutcome::Skipped);
        }

        let installment = self
            .installments
            .find(&schedule.installment_id)?
            .ok_or(StoreError::NotFound)?;
        let outcome = if should_cancel(&installment) {
            self.schedules
                .set_status(&schedule.id, ScheduleStatus::Cancelled)?;
            info!(
                schedule = %schedule.id,
                installment = %installment.id,
                "payment received, contact cancelled"
            );
            DispatchOutcome::Cancelled
        } else {
            let patient = self
                .patients
                .find(&schedule.patient_id)?
                .ok_or(StoreError::NotFound)?;
            match self.prepare(&schedule, &patient, &installment) {
                Ok((recipient, content)) => {
                    self.attempt_send(&schedule, &recipient, &content, now)?
                }
                Err(reason) => self.fail_permanently(&schedule, reason, now)?,
            }
        };

        if !matches!(
            outcome,
            DispatchOutcome::Retried { .. } | DispatchOutcome::Skipped
        ) {
            self.plan_follow_up(&schedule, now);
        }
        Ok(outcome)
    }

    /// Resolves a single schedule directly, outside the queue path. A
    /// transient send failure still lands on the queue for a later drain.
    pub fn process_schedule(
        &self,
        schedule_id: &ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(schedule) = self.schedules.find(schedule_id)? else {
            return Ok(DispatchOutcome::Skipped);
        };
        self.process(
            &QueueMessage {
                schedule_id: schedule.id.clone(),
                channel: schedule.channel,
                attempt: schedule.attempts,
            },
            now,
        )
    }

    /// Loops a settled schedule back into planning. A planning error never
    /// fails the dispatch: the next reconciliation pass replans.
    fn plan_follow_up(&self, schedule: &ContactSchedule, now: DateTime<Utc>) {
        let contract = match self.contracts.find(&schedule.contract_id) {
            Ok(Some(contract)) => contract,
            Ok(None) => {
                warn!(
                    contract = %schedule.contract_id,
                    "settled schedule references an unknown contract"
                );
                return;
            }
            Err(err) => {
                warn!(
                    contract = %schedule.contract_id,
                    error = %err,
                    "contract lookup failed after dispatch"
                );
                return;
            }
        };
        if let Err(err) = self.planner.plan_contract(&contract, now) {
            warn!(contract = %contract.id, error = %err, "follow-up planning failed");
        }
    }

    /// Pulls and resolves up to `limit` due messages from one channel topic.
    pub fn drain(
        &self,
        channel: Channel,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<DrainSummary, DispatchError> {
        let mut summary = DrainSummary::default();
        while summary.processed < limit {
            let Some(message) = self.queue.receive(channel, now)? else {
                break;
            };
            summary.processed += 1;
            match self.process(&message, now)? {
                DispatchOutcome::Sent => summary.sent += 1,
                DispatchOutcome::Cancelled => summary.cancelled += 1,
                DispatchOutcome::Retried { .. } => summary.retried += 1,
                DispatchOutcome::Failed { .. } => summary.failed += 1,
                DispatchOutcome::Skipped => summary.skipped += 1,
            }
        }
        Ok(summary)
    }

    /// Builds the recipient address and rendered body, or a human-readable
    /// reason this schedule can never send.
    fn prepare(
        &self,
        schedule: &ContactSchedule,
        patient: &Patient,
        installment: &Installment,
    ) -> Result<(String, String), String> {
        let recipient = match schedule.channel {
            Channel::Email => patient.email.clone(),
            Channel::Sms | Channel::Whatsapp => patient.phone.clone(),
        }
        .ok_or_else(|| {
            format!(
                "patient {} has no {} recipient on file",
                patient.id, schedule.channel
            )
        })?;

        let template = self
            .templates
            .find(schedule.step, schedule.channel)
            .map_err(|err| format!("template lookup failed: {err}"))?
            .ok_or_else(|| {
                format!(
                    "no active template for step {} via {}",
                    schedule.step, schedule.channel
                )
            })?;

        let vars = template::message_vars(patient, installment);
        let content = template::render(&template.content, &vars).map_err(|err| match err {
            TemplateError::MissingVariable(name) => {
                format!("template references unknown variable '{name}'")
            }
            TemplateError::UnterminatedPlaceholder(at) => {
                format!("template has an unterminated placeholder at byte {at}")
            }
        })?;

        Ok((recipient, content))
    }

    fn attempt_send(
        &self,
        schedule: &ContactSchedule,
        recipient: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let sender = self
            .senders
            .get(&schedule.channel)
            .ok_or(DispatchError::NoSender(schedule.channel))?;

        let attempt = self.schedules.record_attempt(&schedule.id)?;
        match sender.send(recipient, content) {
            Ok(()) => {
                self.history.append(ContactHistory {
                    id: next_history_id(),
                    schedule_id: schedule.id.clone(),
                    contract_id: schedule.contract_id.clone(),
                    patient_id: schedule.patient_id.clone(),
                    step: schedule.step,
                    channel: schedule.channel,
                    sent_at: now,
                    success: true,
                    error: None,
                })?;
                self.schedules.set_status(&schedule.id, ScheduleStatus::Sent)?;
                info!(
                    schedule = %schedule.id,
                    channel = %schedule.channel,
                    step = schedule.step,
                    attempt,
                    "notification sent"
                );
                self.events.publish(DomainEvent::NotificationSent {
                    schedule_id: schedule.id.clone(),
                    channel: schedule.channel,
                    sent_at: now,
                });
                Ok(DispatchOutcome::Sent)
            }
            Err(err) if attempt < self.policy.max_attempts => {
                let delay = self.policy.backoff_for(attempt);
                warn!(
                    schedule = %schedule.id,
                    channel = %schedule.channel,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "send failed, requeued"
                );
                let until = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|delay| now.checked_add_signed(delay))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                self.schedules.defer_retry(&schedule.id, until)?;
                self.queue.requeue(
                    QueueMessage {
                        schedule_id: schedule.id.clone(),
                        channel: schedule.channel,
                        attempt,
                    },
                    delay,
                    now,
                )?;
                Ok(DispatchOutcome::Retried { attempt, delay })
            }
            Err(err) => self.fail_permanently(schedule, err.to_string(), now),
        }
    }

    /// Terminal failure path shared by validation errors and retry
    /// exhaustion: one failure history row, then the FAILED transition.
    fn fail_permanently(
        &self,
        schedule: &ContactSchedule,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.history.append(ContactHistory {
            id: next_history_id(),
            schedule_id: schedule.id.clone(),
            contract_id: schedule.contract_id.clone(),
            patient_id: schedule.patient_id.clone(),
            step: schedule.step,
            channel: schedule.channel,
            sent_at: now,
            success: false,
            error: Some(reason.clone()),
        })?;
        self.schedules
            .set_status(&schedule.id, ScheduleStatus::Failed)?;
        warn!(
            schedule = %schedule.id,
            channel = %schedule.channel,
            step = schedule.step,
            reason = %reason,
            "contact failed permanently"
        );
        Ok(DispatchOutcome::Failed { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_secs(60),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_secs(60));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(120));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(240));
    }

    #[test]
    fn backoff_exponent_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 40,
            base_backoff: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_for(17), policy.backoff_for(30));
    }
}
