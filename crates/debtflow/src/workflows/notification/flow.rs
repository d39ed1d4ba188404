//! Pure step-transition logic shared by the planner and the dispatcher.
//! No I/O here: every function takes plain domain values so the transition
//! rules can be tested exhaustively without stores or queues.

use crate::workflows::reconciliation::Installment;

use super::domain::{Channel, StepCatalog, StepConfig};

/// The next step number strictly greater than `current`, or `None` when
/// `current` is the highest configured step (the COMPLETE pseudo-state).
pub fn next_step(catalog: &StepCatalog, current: u32) -> Option<u32> {
    catalog.next_step(current).map(|config| config.step)
}

/// Chooses a channel for a step, skipping channels that already failed
/// within this step. When every allowed channel has been tried, falls back
/// to the first allowed channel (retry-same-channel policy). Returns `None`
/// only for a misconfigured step with no channels at all.
pub fn select_channel(config: &StepConfig, failed: &[Channel]) -> Option<Channel> {
    config
        .channels
        .iter()
        .copied()
        .find(|channel| !failed.contains(channel))
        .or_else(|| config.channels.first().copied())
}

/// The authoritative stop signal, checked immediately before every dispatch
/// attempt. Receipt can land between scheduling and the scheduled time, so
/// this is never evaluated at schedule-creation time.
pub fn should_cancel(installment: &Installment) -> bool {
    installment.received
}
