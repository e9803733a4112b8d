use chrono::{DateTime, Utc};
use keepsake_core::types::{Message, Recipient};

/// Subject and plain-text body handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryNotice {
    pub subject: String,
    pub body: String,
}

/// The notification a recipient receives when a message is released to them.
/// Carries the redemption link, never the message content.
pub fn delivery_notice(
    message: &Message,
    recipient: &Recipient,
    link: &str,
    expires_at: DateTime<Utc>,
) -> DeliveryNotice {
    let subject = format!("A message has been left for you: {}", message.title);
    let body = format!(
        "Dear {name},\n\n\
         Someone who cares about you left you a message titled \"{title}\".\n\n\
         Open it here:\n{link}\n\n\
         This link is personal to you and works until {expires}.\n",
        name = recipient.name,
        title = message.title,
        link = link,
        expires = expires_at.format("%B %-d, %Y"),
    );
    DeliveryNotice { subject, body }
}

/// A test delivery the owner sends to themselves.
pub fn test_notice(
    message: &Message,
    recipient: &Recipient,
    link: &str,
    expires_at: DateTime<Utc>,
) -> DeliveryNotice {
    let real = delivery_notice(message, recipient, link, expires_at);
    DeliveryNotice {
        subject: format!("[Test] {}", real.subject),
        body: format!(
            "This is a test delivery. {} will receive the message below when it is released.\n\n{}",
            recipient.name, real.body
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use keepsake_core::types::{MessageStatus, Trigger};

    fn fixtures() -> (Message, Recipient) {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let message = Message {
            id: "m1".into(),
            user_id: "u1".into(),
            title: "For your wedding day".into(),
            body: "secret words".into(),
            attachments: vec![],
            created_at: created,
            status: MessageStatus::Scheduled,
            trigger: Trigger::Posthumous,
            release_date: None,
            release_event: None,
            sent_at: None,
        };
        let recipient = Recipient {
            id: "r1".into(),
            user_id: "u1".into(),
            name: "Maya".into(),
            email: Some("maya@example.com".into()),
            relationship: None,
        };
        (message, recipient)
    }

    #[test]
    fn notice_embeds_link_but_not_content() {
        let (message, recipient) = fixtures();
        let expires = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        let notice = delivery_notice(&message, &recipient, "https://k.example/view/abc", expires);
        assert!(notice.subject.contains("For your wedding day"));
        assert!(notice.body.contains("Dear Maya"));
        assert!(notice.body.contains("https://k.example/view/abc"));
        assert!(notice.body.contains("March 9, 2026"));
        assert!(!notice.body.contains("secret words"));
    }

    #[test]
    fn test_notice_is_marked() {
        let (message, recipient) = fixtures();
        let expires = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        let notice = test_notice(&message, &recipient, "link", expires);
        assert!(notice.subject.starts_with("[Test] "));
        assert!(notice.body.starts_with("This is a test delivery."));
    }
}
