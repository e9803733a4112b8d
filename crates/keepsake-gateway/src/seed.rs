//! `keepsake seed`: load recipients, messages and cadences from a JSON file.
//!
//! Stands in for the authoring UI on local runs.

use std::path::Path;

use anyhow::Context;
use keepsake_core::types::{CadenceSetting, Message, Recipient};
use keepsake_store::SqliteStore;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub messages: Vec<SeedMessage>,
    #[serde(default)]
    pub cadences: Vec<CadenceSetting>,
}

#[derive(Debug, Deserialize)]
pub struct SeedMessage {
    #[serde(flatten)]
    pub message: Message,
    /// Recipient ids to link the message to.
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedCounts {
    pub recipients: usize,
    pub messages: usize,
    pub links: usize,
    pub cadences: usize,
}

pub fn load_file(path: &Path) -> anyhow::Result<SeedFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing seed file {}", path.display()))
}

pub fn apply(store: &SqliteStore, seed: &SeedFile) -> anyhow::Result<SeedCounts> {
    let mut counts = SeedCounts::default();
    for recipient in &seed.recipients {
        store
            .insert_recipient(recipient)
            .with_context(|| format!("inserting recipient {}", recipient.id))?;
        counts.recipients += 1;
    }
    for entry in &seed.messages {
        store
            .insert_message(&entry.message)
            .with_context(|| format!("inserting message {}", entry.message.id))?;
        counts.messages += 1;
        for recipient_id in &entry.recipients {
            store.link_recipient(&entry.message.id, recipient_id)?;
            counts.links += 1;
        }
    }
    for setting in &seed.cadences {
        store.set_cadence(&setting.user_id, &setting.recipient_id, &setting.cadence)?;
        counts.cadences += 1;
    }
    info!(
        recipients = counts.recipients,
        messages = counts.messages,
        links = counts.links,
        cadences = counts.cadences,
        "seed applied"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_core::types::MessageStatus;
    use keepsake_store::Store;

    const SEED: &str = r#"{
        "recipients": [
            { "id": "r1", "user_id": "u1", "name": "Ana", "email": "ana@example.com", "relationship": "daughter" }
        ],
        "messages": [
            {
                "id": "m1", "user_id": "u1", "title": "For later", "body": "...",
                "created_at": "2025-01-01T09:00:00Z", "status": "draft", "trigger": "posthumous",
                "recipients": ["r1"]
            }
        ],
        "cadences": [ { "user_id": "u1", "recipient_id": "r1", "cadence": "2_per_week" } ]
    }"#;

    #[test]
    fn seed_file_populates_store() {
        let seed: SeedFile = serde_json::from_str(SEED).unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let counts = apply(&store, &seed).unwrap();

        assert_eq!(
            counts,
            SeedCounts {
                recipients: 1,
                messages: 1,
                links: 1,
                cadences: 1
            }
        );
        let message = store.fetch_message("m1").unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Draft);
        assert!(message.attachments.is_empty());
        assert_eq!(store.fetch_recipients_for("m1").unwrap().len(), 1);
        assert_eq!(
            store.fetch_cadence("u1", "r1").unwrap().as_deref(),
            Some("2_per_week")
        );
    }
}
