use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::workflows::events::CollectingEventSink;
use crate::workflows::notification::{
    Channel, ChannelSender, DueSchedulePublisher, InMemoryDispatchQueue, InMemoryHistoryStore,
    InMemoryScheduleStore, InMemoryTemplateStore, MessageTemplate, NotificationDispatcher,
    RetryPolicy, SchedulePlanner, SendError, StepCatalog, StepConfig, TemplateId, TemplateStore,
};
use crate::workflows::reconciliation::{
    ClinicId, Contract, ContractId, ContractStatus, ContractStore, InMemoryContractStore,
    InMemoryInstallmentStore, InMemoryPatientStore, Installment, InstallmentId, InstallmentStore,
    Patient, PatientId, PatientStore,
};

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

pub(super) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
}

pub(super) fn patient() -> Patient {
    Patient {
        id: PatientId("pt-1".to_string()),
        clinic_id: ClinicId("cl-1".to_string()),
        name: "Ana Souza".to_string(),
        email: Some("ana@example.com".to_string()),
        phone: Some("+5511999990000".to_string()),
        tax_id: Some("12345678901".to_string()),
    }
}

pub(super) fn contract() -> Contract {
    Contract {
        id: ContractId("ct-1".to_string()),
        patient_id: PatientId("pt-1".to_string()),
        clinic_id: ClinicId("cl-1".to_string()),
        status: ContractStatus::Active,
    }
}

pub(super) fn overdue_installment() -> Installment {
    let contract_id = ContractId("ct-1".to_string());
    Installment {
        id: InstallmentId::derive(&contract_id, 1),
        contract_id,
        sequence: 1,
        due_date: NaiveDate::from_ymd_opt(2025, 2, 10).expect("valid date"),
        amount_cents: 15_000,
        received: false,
        updated_at: at(1, 0),
    }
}

/// Sender that records every delivery and can be told to reject the next
/// `n` sends before succeeding again.
#[derive(Default)]
pub(super) struct ScriptedSender {
    pub deliveries: Mutex<Vec<(String, String)>>,
    failures_left: AtomicU32,
}

impl ScriptedSender {
    pub(super) fn failing(times: u32) -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            failures_left: AtomicU32::new(times),
        }
    }

    pub(super) fn delivery_count(&self) -> usize {
        self.deliveries.lock().expect("sender mutex poisoned").len()
    }
}

impl ChannelSender for ScriptedSender {
    fn send(&self, recipient: &str, content: &str) -> Result<(), SendError> {
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(SendError {
                channel: Channel::Email,
                reason: "gateway timeout".to_string(),
            });
        }
        self.deliveries
            .lock()
            .expect("sender mutex poisoned")
            .push((recipient.to_string(), content.to_string()));
        Ok(())
    }
}

/// Everything the planner and dispatcher need, wired over the in-memory
/// stores with one template per (step, channel) in the ladder.
pub(super) struct Harness {
    pub patients: Arc<InMemoryPatientStore>,
    pub contracts: Arc<InMemoryContractStore>,
    pub installments: Arc<InMemoryInstallmentStore>,
    pub schedules: Arc<InMemoryScheduleStore>,
    pub history: Arc<InMemoryHistoryStore>,
    pub templates: Arc<InMemoryTemplateStore>,
    pub queue: Arc<InMemoryDispatchQueue>,
    pub events: Arc<CollectingEventSink>,
}

impl Harness {
    pub(super) fn seeded() -> Self {
        let harness = Self {
            patients: Arc::new(InMemoryPatientStore::default()),
            contracts: Arc::new(InMemoryContractStore::default()),
            installments: Arc::new(InMemoryInstallmentStore::default()),
            schedules: Arc::new(InMemoryScheduleStore::default()),
            history: Arc::new(InMemoryHistoryStore::default()),
            templates: Arc::new(InMemoryTemplateStore::default()),
            queue: Arc::new(InMemoryDispatchQueue::default()),
            events: Arc::new(CollectingEventSink::default()),
        };
        harness.patients.insert(patient()).expect("seed patient");
        harness.contracts.insert(contract()).expect("seed contract");
        harness
            .installments
            .insert(overdue_installment())
            .expect("seed installment");

        let mut template_seq = 0;
        for (step, channel) in [
            (0, Channel::Email),
            (1, Channel::Sms),
            (1, Channel::Whatsapp),
            (2, Channel::Whatsapp),
        ] {
            template_seq += 1;
            harness
                .templates
                .insert(MessageTemplate {
                    id: TemplateId(format!("tpl-{template_seq}")),
                    step,
                    channel,
                    content:
                        "Hello {{ patient_name }}, {{ amount }} was due on {{ due_date }}."
                            .to_string(),
                    active: true,
                    created_at: at(1, 0),
                })
                .expect("seed template");
        }
        harness
    }

    pub(super) fn planner(
        &self,
    ) -> SchedulePlanner<
        InMemoryScheduleStore,
        InMemoryInstallmentStore,
        InMemoryHistoryStore,
        CollectingEventSink,
    > {
        SchedulePlanner::new(
            self.schedules.clone(),
            self.installments.clone(),
            self.history.clone(),
            self.events.clone(),
            ladder(),
        )
    }

    pub(super) fn publisher(
        &self,
    ) -> DueSchedulePublisher<InMemoryScheduleStore, InMemoryDispatchQueue> {
        DueSchedulePublisher::new(self.schedules.clone(), self.queue.clone())
    }

    pub(super) fn dispatcher(
        &self,
        senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    ) -> NotificationDispatcher<
        InMemoryScheduleStore,
        InMemoryHistoryStore,
        InMemoryTemplateStore,
        InMemoryContractStore,
        InMemoryPatientStore,
        InMemoryInstallmentStore,
        InMemoryDispatchQueue,
        CollectingEventSink,
    > {
        NotificationDispatcher::new(
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
            RetryPolicy {
                max_attempts: 3,
                base_backoff: std::time::Duration::from_secs(60),
            },
        )
    }
}

pub(super) fn sender_map(
    channel: Channel,
    sender: Arc<dyn ChannelSender>,
) -> HashMap<Channel, Arc<dyn ChannelSender>> {
    let mut senders: HashMap<Channel, Arc<dyn ChannelSender>> = HashMap::new();
    senders.insert(channel, sender);
    senders
}
