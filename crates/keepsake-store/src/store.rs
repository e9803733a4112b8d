use chrono::{DateTime, Utc};
use keepsake_core::types::{Message, MessageRecipient, MessageStatus, Recipient, Trigger};

use crate::error::Result;

/// Extra columns written alongside a guarded status change.
///
/// `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub sent_at: Option<DateTime<Utc>>,
    pub trigger: Option<Trigger>,
    pub release_date: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn sent(at: DateTime<Utc>) -> Self {
        Self {
            sent_at: Some(at),
            ..Self::default()
        }
    }

    /// Convert an event-triggered message into the date-triggered lifecycle.
    pub fn rescheduled(release_date: DateTime<Utc>) -> Self {
        Self {
            trigger: Some(Trigger::Scheduled),
            release_date: Some(release_date),
            ..Self::default()
        }
    }
}

/// Everything the release engine reads from or writes to persistence.
///
/// Implementations must be `Send + Sync` so one store can be shared by the
/// executor, the sweep and the portal across Tokio tasks.
pub trait Store: Send + Sync {
    /// Messages of `user_id` with the given trigger whose status is one of
    /// `statuses`, oldest first.
    fn fetch_eligible_messages(
        &self,
        user_id: &str,
        trigger: Trigger,
        statuses: &[MessageStatus],
    ) -> Result<Vec<Message>>;

    /// Date-triggered, still-scheduled messages whose `release_date <= now`.
    fn fetch_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Message>>;

    fn fetch_message(&self, message_id: &str) -> Result<Option<Message>>;

    /// All recipients of a message together with their join rows.
    fn fetch_recipients_for(&self, message_id: &str) -> Result<Vec<(Recipient, MessageRecipient)>>;

    /// The raw cadence string for (user, recipient), if one was saved.
    fn fetch_cadence(&self, user_id: &str, recipient_id: &str) -> Result<Option<String>>;

    /// Compare-and-swap on status: only writes when the row is still in
    /// `expected`. Returns `Ok(false)` when another run got there first.
    fn update_message_status(
        &self,
        message_id: &str,
        expected: MessageStatus,
        new_status: MessageStatus,
        fields: StatusUpdate,
    ) -> Result<bool>;

    /// Set (or refresh) the token on a join row. Never creates a second row.
    fn upsert_token(
        &self,
        message_recipient_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    fn find_by_token(&self, token: &str) -> Result<Option<MessageRecipient>>;

    /// Record the first redemption. Returns `true` only on the first call.
    fn mark_viewed(&self, token: &str, at: DateTime<Utc>) -> Result<bool>;
}
