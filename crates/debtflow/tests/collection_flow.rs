//! End-to-end specification of a contract's trip through the collection
//! flow: snapshot sync, step-by-step contact escalation over the queue, the
//! receipt stop signal, and promotion of old debt into collection cases.

mod common {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, NaiveDate, Utc};

    use debtflow::workflows::events::CollectingEventSink;
    use debtflow::workflows::escalation::{
        EscalationEngine, EscalationSummary, InMemoryCollectionCaseStore, InMemoryDealLookup,
    };
    use debtflow::workflows::notification::{
        Channel, ChannelSender, DrainSummary, DueSchedulePublisher, InMemoryDispatchQueue,
        InMemoryHistoryStore, InMemoryScheduleStore, InMemoryTemplateStore, MessageTemplate,
        NotificationDispatcher, RetryPolicy, SchedulePlanner, SendError, StepCatalog, StepConfig,
        TemplateId, TemplateStore,
    };
    use debtflow::workflows::reconciliation::{
        ClinicId, ContractId, ContractRecord, ContractStore, DelinquencySnapshot,
        InMemoryContractStore, InMemoryInstallmentStore, InMemoryPatientStore, InstallmentRecord,
        PatientRecord, ReconciliationEngine,
    };

    /// Sender that logs deliveries and never fails; one instance per
    /// channel topic.
    pub(super) struct LoggingSender {
        pub deliveries: Mutex<Vec<(Channel, String, String)>>,
        channel: Channel,
    }

    impl LoggingSender {
        fn for_channel(channel: Channel) -> Self {
            Self {
                deliveries: Mutex::new(Vec::new()),
                channel,
            }
        }
    }

    impl ChannelSender for LoggingSender {
        fn send(&self, recipient: &str, content: &str) -> Result<(), SendError> {
            self.deliveries
                .lock()
                .expect("sender mutex poisoned")
                .push((self.channel, recipient.to_string(), content.to_string()));
            Ok(())
        }
    }

    pub(super) struct World {
        pub patients: Arc<InMemoryPatientStore>,
        pub contracts: Arc<InMemoryContractStore>,
        pub installments: Arc<InMemoryInstallmentStore>,
        pub schedules: Arc<InMemoryScheduleStore>,
        pub history: Arc<InMemoryHistoryStore>,
        pub templates: Arc<InMemoryTemplateStore>,
        pub queue: Arc<InMemoryDispatchQueue>,
        pub cases: Arc<InMemoryCollectionCaseStore>,
        pub deals: Arc<InMemoryDealLookup>,
        pub events: Arc<CollectingEventSink>,
        pub senders: HashMap<Channel, Arc<LoggingSender>>,
    }

    impl World {
        pub(super) fn new() -> Self {
            let world = Self {
                patients: Arc::new(InMemoryPatientStore::default()),
                contracts: Arc::new(InMemoryContractStore::default()),
                installments: Arc::new(InMemoryInstallmentStore::default()),
                schedules: Arc::new(InMemoryScheduleStore::default()),
                history: Arc::new(InMemoryHistoryStore::default()),
                templates: Arc::new(InMemoryTemplateStore::default()),
                queue: Arc::new(InMemoryDispatchQueue::default()),
                cases: Arc::new(InMemoryCollectionCaseStore::default()),
                deals: Arc::new(InMemoryDealLookup::default()),
                events: Arc::new(CollectingEventSink::default()),
                senders: Channel::ordered()
                    .into_iter()
                    .map(|channel| (channel, Arc::new(LoggingSender::for_channel(channel))))
                    .collect(),
            };
            for (index, (step, channel)) in [
                (0, Channel::Email),
                (1, Channel::Sms),
                (1, Channel::Whatsapp),
                (2, Channel::Whatsapp),
            ]
            .into_iter()
            .enumerate()
            {
                world
                    .templates
                    .insert(MessageTemplate {
                        id: TemplateId(format!("tpl-{index}")),
                        step,
                        channel,
                        content: "{{ patient_name }}: {{ amount }} due {{ due_date }}"
                            .to_string(),
                        active: true,
                        created_at: DateTime::<Utc>::MIN_UTC,
                    })
                    .expect("seed template");
            }
            world
        }

        pub(super) fn sync(&self, batch: &[DelinquencySnapshot], now: DateTime<Utc>) {
            let engine = ReconciliationEngine::new(
                self.patients.clone(),
                self.contracts.clone(),
                self.installments.clone(),
            );
            let summary = engine.reconcile(&clinic(), batch, now);
            assert_eq!(summary.failed, 0, "sync must be clean: {:?}", summary.errors);
        }

        pub(super) fn plan(&self, now: DateTime<Utc>) {
            let planner = SchedulePlanner::new(
                self.schedules.clone(),
                self.installments.clone(),
                self.history.clone(),
                self.events.clone(),
                ladder(),
            );
            let contracts = self
                .contracts
                .list_by_clinic(&clinic())
                .expect("list contracts");
            planner.plan_batch(&contracts, now).expect("plan batch");
        }

        /// One notification run: every due schedule is enqueued, then each
        /// channel topic is drained.
        pub(super) fn run_notifications(&self, now: DateTime<Utc>) -> DrainSummary {
            DueSchedulePublisher::new(self.schedules.clone(), self.queue.clone())
                .publish_due(now, 100)
                .expect("publish due");

            let senders: HashMap<Channel, Arc<dyn ChannelSender>> = self
                .senders
                .iter()
                .map(|(channel, sender)| (*channel, sender.clone() as Arc<dyn ChannelSender>))
                .collect();
            let dispatcher = NotificationDispatcher::new(
                self.schedules.clone(),
                self.history.clone(),
                self.templates.clone(),
                self.contracts.clone(),
                self.patients.clone(),
                self.installments.clone(),
                self.queue.clone(),
                self.events.clone(),
                senders,
                ladder(),
                RetryPolicy::default(),
            );

            let mut total = DrainSummary::default();
            for channel in Channel::ordered() {
                let summary = dispatcher.drain(channel, now, 100).expect("drain channel");
                total.processed += summary.processed;
                total.sent += summary.sent;
                total.cancelled += summary.cancelled;
                total.retried += summary.retried;
                total.failed += summary.failed;
                total.skipped += summary.skipped;
            }
            total
        }

        pub(super) fn escalate(
            &self,
            threshold_days: i64,
            now: DateTime<Utc>,
        ) -> EscalationSummary {
            EscalationEngine::new(
                self.installments.clone(),
                self.contracts.clone(),
                self.patients.clone(),
                self.cases.clone(),
                self.deals.clone(),
                self.events.clone(),
            )
            .run(threshold_days, now)
            .expect("escalation sweep")
        }

        pub(super) fn deliveries(&self) -> Vec<(Channel, String, String)> {
            let mut all = Vec::new();
            for sender in self.senders.values() {
                all.extend(sender.deliveries.lock().expect("sender mutex poisoned").iter().cloned());
            }
            all
        }
    }

    pub(super) fn clinic() -> ClinicId {
        ClinicId("cl-1".to_string())
    }

    pub(super) fn contract_id() -> ContractId {
        ContractId("ct-1".to_string())
    }

    pub(super) fn ladder() -> StepCatalog {
        StepCatalog::new(vec![
            StepConfig {
                step: 0,
                channels: vec![Channel::Email],
                cooldown_days: 0,
                active: true,
            },
            StepConfig {
                step: 1,
                channels: vec![Channel::Sms, Channel::Whatsapp],
                cooldown_days: 2,
                active: true,
            },
            StepConfig {
                step: 2,
                channels: vec![Channel::Whatsapp],
                cooldown_days: 7,
                active: true,
            },
        ])
    }

    pub(super) fn overdue_snapshot(received: bool) -> DelinquencySnapshot {
        DelinquencySnapshot {
            patient: PatientRecord {
                external_id: "pt-1".to_string(),
                name: "Ana Souza".to_string(),
                email: Some("ana@example.com".to_string()),
                phone: Some("+5511999990000".to_string()),
                tax_id: Some("12345678901".to_string()),
            },
            contracts: vec![ContractRecord {
                external_id: "ct-1".to_string(),
                active: true,
                installments: vec![InstallmentRecord {
                    sequence: 1,
                    due_date: NaiveDate::from_ymd_opt(2025, 2, 10).expect("valid date"),
                    amount_cents: 15_000,
                    received,
                }],
            }],
        }
    }

}

use chrono::{Duration, TimeZone, Utc};
use common::*;
use debtflow::workflows::notification::{Channel, ScheduleStatus, ScheduleStore};

#[test]
fn a_contract_escalates_step_by_step_until_payment_lands() {
    let world = World::new();
    let day0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

    // Sync brings in one overdue installment; the first contact goes out by
    // email immediately.
    world.sync(&[overdue_snapshot(false)], day0);
    world.plan(day0);
    let first_run = world.run_notifications(day0);
    assert_eq!(first_run.sent, 1);
    let deliveries = world.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, Channel::Email);
    assert_eq!(deliveries[0].1, "ana@example.com");
    assert_eq!(deliveries[0].2, "Ana Souza: 150.00 due 2025-02-10");

    // Resolving step 0 queued step 1 over SMS, two days out; a later
    // planning pass finds it already live and adds nothing.
    world.plan(day0 + Duration::hours(1));
    let pending = world
        .schedules
        .find_pending_for_contract(&contract_id())
        .expect("query pending")
        .expect("step 1 scheduled");
    assert_eq!(pending.step, 1);
    assert_eq!(pending.channel, Channel::Sms);
    assert_eq!(pending.scheduled_at, day0 + Duration::days(2));

    // Not due yet: a run one day later moves nothing.
    let early = world.run_notifications(day0 + Duration::days(1));
    assert_eq!(early.processed, 0);

    // The payment posts before the SMS becomes due; the next run cancels
    // instead of sending.
    world.sync(&[overdue_snapshot(true)], day0 + Duration::days(2));
    let final_run = world.run_notifications(day0 + Duration::days(3));
    assert_eq!(final_run.cancelled, 1);
    assert_eq!(final_run.sent, 0);

    let resolved = world
        .schedules
        .find(&pending.id)
        .expect("find schedule")
        .expect("schedule exists");
    assert_eq!(resolved.status, ScheduleStatus::Cancelled);
    // Only the email that actually went out is in the contact log.
    assert_eq!(world.history.all().len(), 1);
    assert!(world.history.all()[0].success);

    // With the debt settled there is nothing left to plan.
    world.plan(day0 + Duration::days(4));
    assert!(world
        .schedules
        .find_pending_for_contract(&contract_id())
        .expect("query pending")
        .is_none());
}

#[test]
fn at_most_one_live_schedule_per_contract() {
    let world = World::new();
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    world.sync(&[overdue_snapshot(false)], now);

    world.plan(now);
    world.plan(now);
    world.plan(now + Duration::hours(2));

    let all = world
        .schedules
        .list_for_contract(&contract_id())
        .expect("list schedules");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, ScheduleStatus::Pending);
}

#[test]
fn ninety_day_debt_becomes_a_collection_case_once() {
    let world = World::new();
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
    world.sync(&[overdue_snapshot(false)], now);
    world.deals.register(
        "12345678901",
        debtflow::workflows::escalation::DealReference("deal-42".to_string()),
    );

    let first = world.escalate(90, now);
    assert_eq!(first.created, 1);
    assert_eq!(
        world.cases.all()[0].deal_reference,
        Some(debtflow::workflows::escalation::DealReference("deal-42".to_string()))
    );

    let second = world.escalate(90, now + Duration::days(1));
    assert_eq!(second.created, 0);
    assert_eq!(second.skipped_existing, 1);
}
