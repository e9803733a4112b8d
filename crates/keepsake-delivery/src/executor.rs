use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use keepsake_core::config::DeliveryConfig;
use keepsake_core::types::{Message, MessageRecipient, MessageStatus, Recipient, Trigger};
use keepsake_notify::Dispatcher;
use keepsake_store::{StatusUpdate, Store};
use tracing::{debug, info, warn};

use crate::error::{DeliveryError, Result};
use crate::template::{delivery_notice, test_notice};
use crate::token::{IssuedToken, TokenIssuer};
use crate::types::{Disposition, ReleaseOutcome, ReleaseSummary, SkipReason, WorkItem};

/// The single release mechanism shared by every producer.
///
/// Each work item is handled on its own: a fresh read of the message, token
/// issuance and dispatch per recipient, then one guarded status write. An
/// item's failure is reported in its [`ReleaseOutcome`] and never stops the
/// caller from moving on to the next item.
///
/// A message is released by at most one caller of this executor at a time;
/// an overlapping call returns [`ReleaseOutcome::LostRace`] without sending.
/// Executors in separate processes rely on the guarded write alone and may
/// both notify a message whose release they start together.
pub struct ReleaseExecutor {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
    tokens: TokenIssuer,
    delivery: DeliveryConfig,
    in_flight: Mutex<HashSet<String>>,
}

/// Holds a message id in the in-flight set until dropped.
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    message_id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.message_id);
    }
}

impl ReleaseExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn Dispatcher>,
        delivery: DeliveryConfig,
    ) -> Self {
        let tokens = TokenIssuer::new(Arc::clone(&store), delivery.token_ttl_days);
        Self {
            store,
            dispatcher,
            tokens,
            delivery,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub async fn execute(&self, item: &WorkItem, now: DateTime<Utc>) -> ReleaseOutcome {
        match item.disposition {
            Disposition::ReleaseNow => self.release(&item.message, now).await,
            Disposition::ReleaseAt(release_at) => self.defer(&item.message, release_at),
        }
    }

    /// Run items one after another, counting every outcome.
    pub async fn execute_batch(&self, items: &[WorkItem], now: DateTime<Utc>) -> ReleaseSummary {
        let mut summary = ReleaseSummary::default();
        for item in items {
            let outcome = self.execute(item, now).await;
            summary.record(&outcome);
        }
        summary
    }

    /// Immediate path: notify every deliverable recipient, then mark sent.
    pub async fn release(&self, message: &Message, now: DateTime<Utc>) -> ReleaseOutcome {
        let Some(_claim) = self.claim(&message.id) else {
            debug!(message_id = %message.id, "release already in progress");
            return ReleaseOutcome::LostRace;
        };

        let current = match self.store.fetch_message(&message.id) {
            Ok(Some(m)) => m,
            Ok(None) => {
                warn!(message_id = %message.id, "message vanished before release");
                return ReleaseOutcome::Skipped(SkipReason::Vanished);
            }
            Err(e) => return failed(&message.id, e.to_string()),
        };

        if current.is_sent() {
            debug!(message_id = %current.id, "already sent, nothing to do");
            return ReleaseOutcome::AlreadySent;
        }
        if current.missing_trigger_fields() {
            warn!(
                message_id = %current.id,
                "scheduled message has neither release_date nor release_event"
            );
            return ReleaseOutcome::Skipped(SkipReason::MissingTriggerFields);
        }

        let recipients = match self.store.fetch_recipients_for(&current.id) {
            Ok(r) => r,
            Err(e) => return failed(&current.id, e.to_string()),
        };

        let mut attempted = 0usize;
        let mut notified = 0usize;
        let mut failures = Vec::new();
        for (recipient, link) in &recipients {
            let Some(address) = recipient.contact_address() else {
                warn!(
                    message_id = %current.id,
                    recipient_id = %recipient.id,
                    "recipient has no usable contact address, skipping"
                );
                continue;
            };
            attempted += 1;
            match self.notify(&current, recipient, link, address, now).await {
                Ok(()) => notified += 1,
                Err(e) => {
                    warn!(
                        message_id = %current.id,
                        recipient_id = %recipient.id,
                        error = %e,
                        "delivery to recipient failed"
                    );
                    failures.push(format!("{}: {e}", recipient.id));
                }
            }
        }

        if attempted == 0 {
            warn!(message_id = %current.id, "no deliverable recipient");
            return ReleaseOutcome::Skipped(SkipReason::NoDeliverableRecipient);
        }
        if !failures.is_empty() {
            return failed(&current.id, failures.join("; "));
        }

        match self.store.update_message_status(
            &current.id,
            current.status,
            MessageStatus::Sent,
            StatusUpdate::sent(now),
        ) {
            Ok(true) => {
                info!(
                    message_id = %current.id,
                    from = %current.status,
                    notified,
                    "message released"
                );
                ReleaseOutcome::Released { notified }
            }
            Ok(false) => {
                debug!(message_id = %current.id, "lost the race to a concurrent run");
                ReleaseOutcome::LostRace
            }
            Err(e) => failed(&current.id, e.to_string()),
        }
    }

    /// Future path: convert an event-triggered message into a date-triggered
    /// one so the sweep picks it up at `release_at`.
    pub fn defer(&self, message: &Message, release_at: DateTime<Utc>) -> ReleaseOutcome {
        let current = match self.store.fetch_message(&message.id) {
            Ok(Some(m)) => m,
            Ok(None) => return ReleaseOutcome::Skipped(SkipReason::Vanished),
            Err(e) => return failed(&message.id, e.to_string()),
        };
        if current.is_sent() {
            return ReleaseOutcome::AlreadySent;
        }
        if current.trigger == Trigger::Scheduled {
            // Converted by another run; its release date stays as it was.
            debug!(message_id = %current.id, "already converted, keeping existing release date");
            return ReleaseOutcome::LostRace;
        }

        match self.store.update_message_status(
            &current.id,
            current.status,
            MessageStatus::Scheduled,
            StatusUpdate::rescheduled(release_at),
        ) {
            Ok(true) => {
                info!(message_id = %current.id, %release_at, "message scheduled for later release");
                ReleaseOutcome::Scheduled { release_at }
            }
            Ok(false) => ReleaseOutcome::LostRace,
            Err(e) => failed(&current.id, e.to_string()),
        }
    }

    /// "Send now" for one message, whatever its trigger.
    pub async fn release_message(
        &self,
        message_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReleaseOutcome> {
        let message = self
            .store
            .fetch_message(message_id)?
            .ok_or_else(|| DeliveryError::MessageNotFound {
                id: message_id.to_string(),
            })?;
        Ok(self.release(&message, now).await)
    }

    /// Send the first recipient's notice to `to` without touching status.
    ///
    /// The recipient's token is reused (or minted) and its expiry refreshed,
    /// so the link in the test mail is the one the recipient will get.
    pub async fn send_test(
        &self,
        message_id: &str,
        to: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let message = self
            .store
            .fetch_message(message_id)?
            .ok_or_else(|| DeliveryError::MessageNotFound {
                id: message_id.to_string(),
            })?;
        let (recipient, link) = self
            .store
            .fetch_recipients_for(message_id)?
            .into_iter()
            .next()
            .ok_or_else(|| DeliveryError::NoRecipients {
                id: message_id.to_string(),
            })?;

        let issued = self.tokens.issue_for_link(&message, &link, now)?;
        let url = self.delivery.redemption_link(&issued.token);
        let notice = test_notice(&message, &recipient, &url, issued.expires_at);
        self.dispatcher.send(to, &notice.subject, &notice.body).await?;

        info!(
            message_id,
            recipient_id = %recipient.id,
            reused = issued.reused,
            "test delivery sent"
        );
        Ok(issued)
    }

    fn claim(&self, message_id: &str) -> Option<Claim<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(message_id.to_string()) {
            return None;
        }
        Some(Claim {
            in_flight: &self.in_flight,
            message_id: message_id.to_string(),
        })
    }

    async fn notify(
        &self,
        message: &Message,
        recipient: &Recipient,
        link: &MessageRecipient,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let issued = self.tokens.issue_for_link(message, link, now)?;
        let url = self.delivery.redemption_link(&issued.token);
        let notice = delivery_notice(message, recipient, &url, issued.expires_at);
        self.dispatcher
            .send(address, &notice.subject, &notice.body)
            .await?;
        debug!(
            message_id = %message.id,
            recipient_id = %recipient.id,
            dispatcher = self.dispatcher.name(),
            "notification dispatched"
        );
        Ok(())
    }
}

fn failed(message_id: &str, reason: String) -> ReleaseOutcome {
    warn!(message_id, %reason, "release failed, message left for the next run");
    ReleaseOutcome::Failed { reason }
}
