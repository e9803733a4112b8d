//! Delivery tokens: single-purpose capabilities for one (message, recipient) pair.
//!
//! A token is the only credential the redemption portal needs. It is 32 bytes
//! from the thread-local CSPRNG, hex-encoded.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use keepsake_core::types::{Message, MessageRecipient};
use keepsake_store::Store;
use rand::RngCore;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::TokenError;

pub const TOKEN_BYTES: usize = 32;
const TOKEN_HEX_LEN: usize = TOKEN_BYTES * 2;

pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Cheap shape check before touching the store.
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_HEX_LEN && token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The pair's existing unexpired token was kept and only its expiry refreshed.
    pub reused: bool,
}

/// What the portal gets back from a successful redemption.
#[derive(Debug, Clone, Serialize)]
pub struct RedeemedMessage {
    pub message_id: String,
    pub title: String,
    pub body: String,
    pub attachments: Vec<String>,
    pub recipient_name: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    /// First redemption; unchanged by later reads.
    pub first_viewed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenIssuer {
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn Store>, ttl_days: i64) -> Self {
        Self {
            store,
            ttl: Duration::days(ttl_days),
        }
    }

    /// Issue a token for (message, recipient), looking up the join row.
    pub fn issue(
        &self,
        message_id: &str,
        recipient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let message = self
            .store
            .fetch_message(message_id)?
            .ok_or(TokenError::Unknown)?;
        let link = self
            .store
            .fetch_recipients_for(message_id)?
            .into_iter()
            .map(|(_, link)| link)
            .find(|link| link.recipient_id == recipient_id)
            .ok_or(TokenError::Unknown)?;
        self.issue_for_link(&message, &link, now)
    }

    /// Issue or refresh the token on an existing join row.
    ///
    /// An unexpired token is kept and its expiry pushed to `now + ttl`;
    /// otherwise a fresh token replaces it. Repeating the call never creates
    /// a second row. A sent message's expired token is never renewed.
    pub fn issue_for_link(
        &self,
        message: &Message,
        link: &MessageRecipient,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let existing = link.usable_token(now).map(str::to_string);
        if message.is_sent() && existing.is_none() {
            return Err(TokenError::Expired);
        }

        let expires_at = now + self.ttl;
        let (token, reused) = match existing {
            Some(token) => (token, true),
            None => (generate_token(), false),
        };
        self.store.upsert_token(&link.id, &token, expires_at)?;

        debug!(
            message_id = %link.message_id,
            recipient_id = %link.recipient_id,
            reused,
            %expires_at,
            "delivery token issued"
        );
        Ok(IssuedToken {
            token,
            expires_at,
            reused,
        })
    }

    /// Resolve a token to its message.
    ///
    /// Rejects malformed, unknown and expired tokens. The first successful
    /// read stamps `viewed_at`; later reads are still served. Viewing is
    /// advisory, not access control.
    pub fn redeem(&self, token: &str, now: DateTime<Utc>) -> Result<RedeemedMessage, TokenError> {
        if !is_well_formed(token) {
            return Err(TokenError::Malformed);
        }
        let link = self.store.find_by_token(token)?.ok_or(TokenError::Unknown)?;
        let expires_at = match link.token_expires_at {
            Some(expires) if expires > now => expires,
            _ => return Err(TokenError::Expired),
        };
        let message = self
            .store
            .fetch_message(&link.message_id)?
            .ok_or(TokenError::Unknown)?;

        let recipient_name = self
            .store
            .fetch_recipients_for(&link.message_id)?
            .into_iter()
            .find(|(_, mr)| mr.id == link.id)
            .map(|(recipient, _)| recipient.name);

        let first_view = self.store.mark_viewed(token, now)?;
        let first_viewed_at = if first_view {
            info!(
                message_id = %message.id,
                recipient_id = %link.recipient_id,
                "message opened for the first time"
            );
            now
        } else {
            link.viewed_at.unwrap_or(now)
        };

        Ok(RedeemedMessage {
            message_id: message.id,
            title: message.title,
            body: message.body,
            attachments: message.attachments,
            recipient_name,
            sent_at: message.sent_at,
            first_viewed_at,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use keepsake_core::types::{MessageStatus, Recipient, Trigger};
    use keepsake_store::SqliteStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 6, 10, 0, 0).unwrap()
    }

    /// m1 is linked to r1; r2 exists but receives nothing.
    fn issuer() -> (Arc<SqliteStore>, TokenIssuer) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        for id in ["r1", "r2"] {
            store
                .insert_recipient(&Recipient {
                    id: id.into(),
                    user_id: "u1".into(),
                    name: format!("Recipient {id}"),
                    email: Some(format!("{id}@example.com")),
                    relationship: None,
                })
                .unwrap();
        }
        store
            .insert_message(&Message {
                id: "m1".into(),
                user_id: "u1".into(),
                title: "Letter".into(),
                body: "body".into(),
                attachments: vec![],
                created_at: now() - Duration::days(30),
                status: MessageStatus::Draft,
                trigger: Trigger::Posthumous,
                release_date: None,
                release_event: None,
                sent_at: None,
            })
            .unwrap();
        store.link_recipient("m1", "r1").unwrap();
        let issuer = TokenIssuer::new(store.clone(), 7);
        (store, issuer)
    }

    #[test]
    fn issue_stores_a_token_valid_for_seven_days() {
        let (store, issuer) = issuer();
        let issued = issuer.issue("m1", "r1", now()).unwrap();

        assert!(is_well_formed(&issued.token));
        assert!(!issued.reused);
        assert_eq!(issued.expires_at, now() + Duration::days(7));

        let links = store.fetch_recipients_for("m1").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].1.token.as_deref(), Some(issued.token.as_str()));
        assert_eq!(links[0].1.token_expires_at, Some(issued.expires_at));
    }

    #[test]
    fn issuing_again_refreshes_expiry_on_the_same_row() {
        let (store, issuer) = issuer();
        let first = issuer.issue("m1", "r1", now()).unwrap();
        let later = now() + Duration::days(2);
        let second = issuer.issue("m1", "r1", later).unwrap();

        assert!(second.reused);
        assert_eq!(second.token, first.token);
        assert_eq!(second.expires_at, later + Duration::days(7));

        let links = store.fetch_recipients_for("m1").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].1.token_expires_at, Some(second.expires_at));
    }

    #[test]
    fn issue_for_an_unlinked_pair_is_unknown() {
        let (_, issuer) = issuer();
        assert!(matches!(issuer.issue("ghost", "r1", now()), Err(TokenError::Unknown)));
        assert!(matches!(issuer.issue("m1", "r2", now()), Err(TokenError::Unknown)));
    }

    #[test]
    fn generated_tokens_are_well_formed_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert!(is_well_formed(&a));
        assert!(is_well_formed(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn shape_check_rejects_other_strings() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("not-a-token"));
        assert!(!is_well_formed(&"A".repeat(TOKEN_HEX_LEN)));
        assert!(!is_well_formed(&"a".repeat(TOKEN_HEX_LEN + 1)));
    }
}
