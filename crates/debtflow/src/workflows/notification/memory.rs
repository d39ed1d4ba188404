use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::workflows::reconciliation::{ContractId, StoreError};

use super::domain::{
    Channel, ContactHistory, ContactSchedule, MessageTemplate, ScheduleId, ScheduleStatus,
    TemplateId,
};
use super::repository::{HistoryStore, ScheduleStore, TemplateStore};

#[derive(Default, Clone)]
pub struct InMemoryScheduleStore {
    records: Arc<Mutex<HashMap<ScheduleId, ContactSchedule>>>,
}

impl ScheduleStore for InMemoryScheduleStore {
    fn find(&self, id: &ScheduleId) -> Result<Option<ContactSchedule>, StoreError> {
        let guard = self.records.lock().expect("schedule store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn insert_pending(&self, schedule: ContactSchedule) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("schedule store mutex poisoned");
        let has_pending = guard.values().any(|existing| {
            existing.contract_id == schedule.contract_id
                && existing.status == ScheduleStatus::Pending
        });
        if has_pending || guard.contains_key(&schedule.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(schedule.id.clone(), schedule);
        Ok(())
    }

    fn set_status(
        &self,
        id: &ScheduleId,
        status: ScheduleStatus,
    ) -> Result<ContactSchedule, StoreError> {
        let mut guard = self.records.lock().expect("schedule store mutex poisoned");
        let schedule = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        schedule.status = status;
        Ok(schedule.clone())
    }

    fn record_attempt(&self, id: &ScheduleId) -> Result<u32, StoreError> {
        let mut guard = self.records.lock().expect("schedule store mutex poisoned");
        let schedule = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        schedule.attempts += 1;
        Ok(schedule.attempts)
    }

    fn defer_retry(&self, id: &ScheduleId, until: DateTime<Utc>) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("schedule store mutex poisoned");
        let schedule = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        schedule.next_attempt_at = Some(until);
        Ok(())
    }

    fn find_pending_for_contract(
        &self,
        contract: &ContractId,
    ) -> Result<Option<ContactSchedule>, StoreError> {
        let guard = self.records.lock().expect("schedule store mutex poisoned");
        Ok(guard
            .values()
            .find(|schedule| {
                &schedule.contract_id == contract && schedule.status == ScheduleStatus::Pending
            })
            .cloned())
    }

    fn list_for_contract(
        &self,
        contract: &ContractId,
    ) -> Result<Vec<ContactSchedule>, StoreError> {
        let guard = self.records.lock().expect("schedule store mutex poisoned");
        let mut rows: Vec<ContactSchedule> = guard
            .values()
            .filter(|schedule| &schedule.contract_id == contract)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.step, a.scheduled_at).cmp(&(b.step, b.scheduled_at)));
        Ok(rows)
    }

    fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ContactSchedule>, StoreError> {
        let guard = self.records.lock().expect("schedule store mutex poisoned");
        let mut rows: Vec<ContactSchedule> = guard
            .values()
            .filter(|schedule| schedule.is_due(now))
            .cloned()
            .collect();
        rows.sort_by_key(|schedule| schedule.scheduled_at);
        rows.truncate(limit);
        Ok(rows)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryHistoryStore {
    rows: Arc<Mutex<Vec<ContactHistory>>>,
}

impl InMemoryHistoryStore {
    pub fn all(&self) -> Vec<ContactHistory> {
        self.rows.lock().expect("history store mutex poisoned").clone()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn append(&self, history: ContactHistory) -> Result<(), StoreError> {
        self.rows
            .lock()
            .expect("history store mutex poisoned")
            .push(history);
        Ok(())
    }

    fn list_for_schedule(
        &self,
        schedule: &ScheduleId,
    ) -> Result<Vec<ContactHistory>, StoreError> {
        let guard = self.rows.lock().expect("history store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|row| &row.schedule_id == schedule)
            .cloned()
            .collect())
    }

    fn failed_channels(
        &self,
        contract: &ContractId,
        step: u32,
    ) -> Result<Vec<Channel>, StoreError> {
        let guard = self.rows.lock().expect("history store mutex poisoned");
        let mut channels = Vec::new();
        for row in guard.iter() {
            if &row.contract_id == contract && row.step == step && !row.success {
                if !channels.contains(&row.channel) {
                    channels.push(row.channel);
                }
            }
        }
        Ok(channels)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTemplateStore {
    records: Arc<Mutex<HashMap<TemplateId, MessageTemplate>>>,
}

impl TemplateStore for InMemoryTemplateStore {
    fn find(&self, step: u32, channel: Channel) -> Result<Option<MessageTemplate>, StoreError> {
        let guard = self.records.lock().expect("template store mutex poisoned");
        Ok(guard
            .values()
            .filter(|template| {
                template.active && template.step == step && template.channel == channel
            })
            .max_by_key(|template| template.created_at)
            .cloned())
    }

    fn insert(&self, template: MessageTemplate) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("template store mutex poisoned");
        if guard.contains_key(&template.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(template.id.clone(), template);
        Ok(())
    }
}
