use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

use debtflow::config::BillingConfig;
use debtflow::workflows::escalation::{
    EscalationEngine, EscalationError, EscalationSummary, InMemoryCollectionCaseStore,
    InMemoryDealLookup,
};
use debtflow::workflows::events::NullEventSink;
use debtflow::workflows::notification::{
    Channel, ChannelSender, DispatchError, DrainSummary, DueSchedulePublisher,
    InMemoryDispatchQueue, InMemoryHistoryStore, InMemoryScheduleStore, InMemoryTemplateStore,
    MessageTemplate, NotificationDispatcher, PlanError, PlanSummary, RetryPolicy, SchedulePlanner,
    SendError, StepCatalog, StepConfig, TemplateId, TemplateStore,
};
use debtflow::workflows::reconciliation::{
    ClinicId, ContractStore, DelinquencySnapshot, InMemoryContractStore, InMemoryInstallmentStore,
    InMemoryPatientStore, ReconciliationEngine, StoreError, SyncSummary,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Sender used when no real provider is wired in: logs the delivery and
/// reports success, so single-node installs can exercise the whole flow.
pub(crate) struct LoggingChannelSender {
    channel: Channel,
}

impl LoggingChannelSender {
    pub(crate) fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

impl ChannelSender for LoggingChannelSender {
    fn send(&self, recipient: &str, content: &str) -> Result<(), SendError> {
        info!(channel = %self.channel, recipient, content, "outbound notification");
        Ok(())
    }
}

/// The three-step ladder used until step configuration gets an admin
/// surface: email first, text channels afterwards, a week between the later
/// nudges.
pub(crate) fn default_step_catalog() -> StepCatalog {
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
            cooldown_days: 7,
            active: true,
        },
        StepConfig {
            step: 2,
            channels: vec![Channel::Whatsapp, Channel::Email],
            cooldown_days: 7,
            active: true,
        },
    ])
}

pub(crate) fn seed_default_templates(store: &InMemoryTemplateStore) -> Result<(), StoreError> {
    let pairs = [
        (0, Channel::Email),
        (1, Channel::Sms),
        (1, Channel::Whatsapp),
        (2, Channel::Whatsapp),
        (2, Channel::Email),
    ];
    for (index, (step, channel)) in pairs.into_iter().enumerate() {
        store.insert(MessageTemplate {
            id: TemplateId(format!("tpl-default-{index}")),
            step,
            channel,
            content: "Hello {{ patient_name }}, your installment of {{ amount }} was due on \
                      {{ due_date }}. Please contact the clinic to settle it."
                .to_string(),
            active: true,
            created_at: DateTime::<Utc>::MIN_UTC,
        })?;
    }
    Ok(())
}

pub(crate) fn default_senders() -> HashMap<Channel, Arc<dyn ChannelSender>> {
    Channel::ordered()
        .into_iter()
        .map(|channel| {
            (
                channel,
                Arc::new(LoggingChannelSender::new(channel)) as Arc<dyn ChannelSender>,
            )
        })
        .collect()
}

/// All collection workflows over one shared set of stores. Engines are
/// cheap bundles of `Arc`s, so each operation builds its own on the fly.
pub(crate) struct CollectionService {
    pub(crate) patients: Arc<InMemoryPatientStore>,
    pub(crate) contracts: Arc<InMemoryContractStore>,
    pub(crate) installments: Arc<InMemoryInstallmentStore>,
    pub(crate) schedules: Arc<InMemoryScheduleStore>,
    pub(crate) history: Arc<InMemoryHistoryStore>,
    pub(crate) templates: Arc<InMemoryTemplateStore>,
    pub(crate) queue: Arc<InMemoryDispatchQueue>,
    pub(crate) cases: Arc<InMemoryCollectionCaseStore>,
    pub(crate) deals: Arc<InMemoryDealLookup>,
    events: Arc<NullEventSink>,
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    catalog: StepCatalog,
    billing: BillingConfig,
}

impl CollectionService {
    pub(crate) fn new(billing: BillingConfig) -> Result<Self, StoreError> {
        let templates = Arc::new(InMemoryTemplateStore::default());
        seed_default_templates(&templates)?;
        Ok(Self {
            patients: Arc::new(InMemoryPatientStore::default()),
            contracts: Arc::new(InMemoryContractStore::default()),
            installments: Arc::new(InMemoryInstallmentStore::default()),
            schedules: Arc::new(InMemoryScheduleStore::default()),
            history: Arc::new(InMemoryHistoryStore::default()),
            templates,
            queue: Arc::new(InMemoryDispatchQueue::default()),
            cases: Arc::new(InMemoryCollectionCaseStore::default()),
            deals: Arc::new(InMemoryDealLookup::default()),
            events: Arc::new(NullEventSink),
            senders: default_senders(),
            catalog: default_step_catalog(),
            billing,
        })
    }

    /// Reconciles a snapshot batch, then replans every contract in the
    /// clinic so newly-synced debt enters the contact flow right away.
    pub(crate) fn sync(
        &self,
        clinic: &ClinicId,
        batch: &[DelinquencySnapshot],
        now: DateTime<Utc>,
    ) -> Result<(SyncSummary, PlanSummary), PlanError> {
        let engine = ReconciliationEngine::new(
            self.patients.clone(),
            self.contracts.clone(),
            self.installments.clone(),
        );
        let sync = engine.reconcile(clinic, batch, now);

        let planner = SchedulePlanner::new(
            self.schedules.clone(),
            self.installments.clone(),
            self.history.clone(),
            self.events.clone(),
            self.catalog.clone(),
        );
        let contracts = self.contracts.list_by_clinic(clinic)?;
        let plan = planner.plan_batch(&contracts, now)?;
        Ok((sync, plan))
    }

    /// One notification run: publish due schedules, then drain every
    /// channel topic. Returns the per-channel drain summaries.
    pub(crate) fn run_notifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(Channel, DrainSummary)>, DispatchError> {
        DueSchedulePublisher::new(self.schedules.clone(), self.queue.clone())
            .publish_due(now, self.billing.batch_size)?;

        let dispatcher = NotificationDispatcher::new(
            self.schedules.clone(),
            self.history.clone(),
            self.templates.clone(),
            self.contracts.clone(),
            self.patients.clone(),
            self.installments.clone(),
            self.queue.clone(),
            self.events.clone(),
            self.senders.clone(),
            self.catalog.clone(),
            RetryPolicy {
                max_attempts: self.billing.dispatch_max_attempts,
                base_backoff: self.billing.dispatch_base_backoff,
            },
        );

        let mut summaries = Vec::new();
        for channel in Channel::ordered() {
            let summary = dispatcher.drain(channel, now, self.billing.batch_size)?;
            summaries.push((channel, summary));
        }
        Ok(summaries)
    }

    pub(crate) fn escalate(
        &self,
        now: DateTime<Utc>,
    ) -> Result<EscalationSummary, EscalationError> {
        EscalationEngine::new(
            self.installments.clone(),
            self.contracts.clone(),
            self.patients.clone(),
            self.cases.clone(),
            self.deals.clone(),
            self.events.clone(),
        )
        .run(self.billing.escalation_threshold_days, now)
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
