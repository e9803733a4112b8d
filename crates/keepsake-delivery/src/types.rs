use chrono::{DateTime, Utc};
use keepsake_core::types::Message;
use serde::Serialize;

/// What the executor should do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    ReleaseNow,
    /// Convert to the date-triggered lifecycle; the sweep releases it later.
    ReleaseAt(DateTime<Utc>),
}

/// One unit of work handed from a producer to the executor.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub message: Message,
    pub disposition: Disposition,
}

impl WorkItem {
    pub fn now(message: Message) -> Self {
        Self {
            message,
            disposition: Disposition::ReleaseNow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No join rows, or every recipient lacks a usable contact address.
    NoDeliverableRecipient,
    /// `trigger = scheduled` without `release_date` or `release_event`.
    MissingTriggerFields,
    /// The message no longer exists.
    Vanished,
}

/// Result of processing one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Notified `notified` recipients and marked the message sent.
    Released { notified: usize },
    /// Converted to a date-triggered message releasing at `release_at`.
    Scheduled { release_at: DateTime<Utc> },
    /// Already `sent`; nothing was dispatched.
    AlreadySent,
    /// The guarded update found a different prior status: a concurrent run
    /// advanced the message first.
    LostRace,
    Skipped(SkipReason),
    /// Some sub-step failed; the message keeps its prior status and is
    /// eligible again on the next invocation.
    Failed { reason: String },
}

/// Aggregate counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseSummary {
    pub released: u32,
    pub scheduled: u32,
    pub errors: u32,
    pub skipped: u32,
}

impl ReleaseSummary {
    pub fn record(&mut self, outcome: &ReleaseOutcome) {
        match outcome {
            ReleaseOutcome::Released { .. } => self.released += 1,
            ReleaseOutcome::Scheduled { .. } => self.scheduled += 1,
            ReleaseOutcome::Failed { .. } => self.errors += 1,
            ReleaseOutcome::AlreadySent
            | ReleaseOutcome::LostRace
            | ReleaseOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.released + self.scheduled + self.errors + self.skipped
    }
}
