//! Dispatcher that only logs. Used for local runs and dry runs.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::{dispatcher::Dispatcher, error::NotifyError};

#[derive(Default)]
pub struct LogDispatcher {
    sent: AtomicU64,
}

impl LogDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications "sent" since construction.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Dispatcher for LogDispatcher {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if to.trim().is_empty() {
            return Err(NotifyError::InvalidAddress(to.to_string()));
        }
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        info!(to, subject, body_chars = body.len(), seq = n, "notification (log only)");
        Ok(())
    }
}
