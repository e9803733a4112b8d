use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new primary key (UUIDv7, time-sortable for easier log correlation).
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Render a timestamp the way every table stores it.
///
/// Fixed microsecond precision with a `Z` suffix keeps the text lexically
/// ordered, so `release_date <= ?` in SQL compares chronologically.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 timestamp back into UTC.
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Lifecycle state of a message. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Draft,
    Scheduled,
    Sent,
}

impl MessageStatus {
    /// Whether `self → next` is a legal forward transition.
    ///
    /// `scheduled → scheduled` is allowed: a posthumous message that was
    /// already `scheduled` is re-stamped with a release date when it is
    /// converted into the date-triggered lifecycle.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Draft, MessageStatus::Scheduled)
                | (MessageStatus::Draft, MessageStatus::Sent)
                | (MessageStatus::Scheduled, MessageStatus::Scheduled)
                | (MessageStatus::Scheduled, MessageStatus::Sent)
        )
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageStatus::Draft => "draft",
            MessageStatus::Scheduled => "scheduled",
            MessageStatus::Sent => "sent",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(MessageStatus::Draft),
            "scheduled" => Ok(MessageStatus::Scheduled),
            "sent" => Ok(MessageStatus::Sent),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// The condition class controlling when a message becomes eligible for release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Released by an explicit "send now" from the owner.
    Manual,
    /// Released by the sweep once `release_date` has passed.
    Scheduled,
    /// Released when the trust network confirms the owner's death.
    Posthumous,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
            Trigger::Posthumous => "posthumous",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Trigger::Manual),
            "scheduled" => Ok(Trigger::Scheduled),
            "posthumous" => Ok(Trigger::Posthumous),
            other => Err(format!("unknown trigger: {other}")),
        }
    }
}

/// A unit of content owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    /// Ordered references to uploaded media (storage keys or URLs).
    #[serde(default)]
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
    pub trigger: Trigger,
    pub release_date: Option<DateTime<Utc>>,
    /// Named milestone ("graduation", "wedding") for event-dated messages.
    pub release_event: Option<String>,
    /// Set exactly once, when the message transitions to `sent`.
    pub sent_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_sent(&self) -> bool {
        self.status == MessageStatus::Sent
    }

    /// A date-triggered message must carry either a date or a named event.
    pub fn missing_trigger_fields(&self) -> bool {
        self.trigger == Trigger::Scheduled
            && self.release_date.is_none()
            && self.release_event.is_none()
    }
}

/// A named addressee belonging to one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Contact address handed to the notification dispatcher.
    pub email: Option<String>,
    pub relationship: Option<String>,
}

impl Recipient {
    /// The contact address, if it is present and looks usable.
    pub fn contact_address(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty() && e.contains('@'))
    }
}

/// Join row between a message and one of its recipients, carrying the
/// delivery token once one has been issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecipient {
    pub id: String,
    pub message_id: String,
    pub recipient_id: String,
    pub token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    /// First redemption time. Advisory only: later reads are still allowed.
    pub viewed_at: Option<DateTime<Utc>>,
}

impl MessageRecipient {
    /// The current token, if one exists and has not expired at `now`.
    pub fn usable_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.token, self.token_expires_at) {
            (Some(token), Some(expires)) if expires > now => Some(token.as_str()),
            _ => None,
        }
    }
}

/// Per (user, recipient) pacing preference. Absence means "all at once".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceSetting {
    pub user_id: String,
    pub recipient_id: String,
    pub cadence: String,
}
