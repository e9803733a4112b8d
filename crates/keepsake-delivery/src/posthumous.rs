//! Posthumous release: the event-triggered producer.
//!
//! Invoked once per user after the trust network confirms the death. Every
//! pending posthumous message is grouped by recipient, paced by that
//! recipient's cadence, and handed to the executor as a work item.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use keepsake_core::types::{Message, MessageStatus, Trigger};
use keepsake_store::Store;
use tracing::{error, info, warn};

use crate::batch::{is_release_now, plan};
use crate::cadence::Cadence;
use crate::error::Result;
use crate::executor::ReleaseExecutor;
use crate::types::{Disposition, ReleaseOutcome, ReleaseSummary, WorkItem};

/// Statuses still waiting for the life event.
const ELIGIBLE: [MessageStatus; 2] = [MessageStatus::Draft, MessageStatus::Scheduled];

/// Work items for one run, plus the messages that could not be planned.
#[derive(Debug, Default)]
pub struct ReleasePlan {
    pub items: Vec<WorkItem>,
    /// (message id, reason). These keep their status and count as errors.
    pub held: Vec<(String, String)>,
}

pub struct PosthumousRelease {
    store: Arc<dyn Store>,
    executor: Arc<ReleaseExecutor>,
}

impl PosthumousRelease {
    pub fn new(store: Arc<dyn Store>, executor: Arc<ReleaseExecutor>) -> Self {
        Self { store, executor }
    }

    /// Release or schedule everything `user_id` left behind.
    ///
    /// Only the initial fetch can fail the run. Everything after it is
    /// counted per message in the returned summary, held messages as errors.
    pub async fn run(&self, user_id: &str, now: DateTime<Utc>) -> Result<ReleaseSummary> {
        let messages = self
            .store
            .fetch_eligible_messages(user_id, Trigger::Posthumous, &ELIGIBLE)
            .map_err(|e| {
                error!(user_id, error = %e, "could not load posthumous messages");
                e
            })?;
        if messages.is_empty() {
            info!(user_id, "no posthumous messages pending");
            return Ok(ReleaseSummary::default());
        }

        let plan = self.work_items(user_id, messages, now);
        let mut summary = self.executor.execute_batch(&plan.items, now).await;
        for (_, reason) in &plan.held {
            summary.record(&ReleaseOutcome::Failed {
                reason: reason.clone(),
            });
        }
        info!(
            user_id,
            released = summary.released,
            scheduled = summary.scheduled,
            errors = summary.errors,
            skipped = summary.skipped,
            "posthumous release finished"
        );
        Ok(summary)
    }

    /// Turn the eligible set into ordered, de-duplicated work items.
    ///
    /// Recipients are walked in first-seen order and each recipient's messages
    /// in cadence order. A message shared by several recipients releases at
    /// the earliest instant any of them computed, and appears once. A message
    /// whose recipients or cadence could not be read is held back untouched.
    pub fn work_items(
        &self,
        user_id: &str,
        messages: Vec<Message>,
        now: DateTime<Utc>,
    ) -> ReleasePlan {
        let mut recipient_order: Vec<String> = Vec::new();
        let mut by_recipient: HashMap<String, Vec<Message>> = HashMap::new();
        // Messages with no join rows still go to the executor, which skips them.
        let mut orphans: Vec<Message> = Vec::new();
        let mut held: Vec<(String, String)> = Vec::new();

        for message in messages {
            let links = match self.store.fetch_recipients_for(&message.id) {
                Ok(links) => links,
                Err(e) => {
                    warn!(
                        message_id = %message.id,
                        error = %e,
                        "could not load recipients, holding message"
                    );
                    held.push((message.id, e.to_string()));
                    continue;
                }
            };
            if links.is_empty() {
                orphans.push(message);
                continue;
            }
            for (recipient, _) in links {
                let group = by_recipient.entry(recipient.id.clone()).or_insert_with(|| {
                    recipient_order.push(recipient.id.clone());
                    Vec::new()
                });
                group.push(message.clone());
            }
        }

        let mut order: Vec<String> = Vec::new();
        let mut earliest: HashMap<String, (Message, DateTime<Utc>)> = HashMap::new();

        for recipient_id in &recipient_order {
            let Some(group) = by_recipient.remove(recipient_id) else {
                continue;
            };
            let cadence = match self.store.fetch_cadence(user_id, recipient_id) {
                Ok(setting) => Cadence::from_setting(setting.as_deref()),
                Err(e) => {
                    warn!(
                        user_id,
                        recipient_id = %recipient_id,
                        error = %e,
                        "cadence unreadable, holding this recipient's messages"
                    );
                    for message in group {
                        if !held.iter().any(|(id, _)| *id == message.id) {
                            held.push((message.id, e.to_string()));
                        }
                    }
                    continue;
                }
            };

            for planned in plan(group, &cadence, now) {
                let id = planned.message.id.clone();
                match earliest.get_mut(&id) {
                    Some((_, at)) => {
                        if planned.release_at < *at {
                            *at = planned.release_at;
                        }
                    }
                    None => {
                        order.push(id.clone());
                        earliest.insert(id, (planned.message, planned.release_at));
                    }
                }
            }
        }

        let held_ids: HashSet<&str> = held.iter().map(|(id, _)| id.as_str()).collect();
        let mut items: Vec<WorkItem> = order
            .iter()
            .filter(|id| !held_ids.contains(id.as_str()))
            .filter_map(|id| earliest.remove(id))
            .map(|(message, release_at)| WorkItem {
                message,
                disposition: if is_release_now(release_at, now) {
                    Disposition::ReleaseNow
                } else {
                    Disposition::ReleaseAt(release_at)
                },
            })
            .collect();
        items.extend(orphans.into_iter().map(WorkItem::now));
        ReleasePlan { items, held }
    }
}
