use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use keepsake_store::Store;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::Result;
use crate::executor::ReleaseExecutor;
use crate::types::{ReleaseSummary, WorkItem};

/// Finds date-triggered messages that are due and releases them.
///
/// Stateless between ticks. Safe to run alongside another sweep: the
/// executor's guarded write lets exactly one of them mark a message sent.
pub struct ScheduledSweep {
    store: Arc<dyn Store>,
    executor: Arc<ReleaseExecutor>,
    concurrency: usize,
}

impl ScheduledSweep {
    pub fn new(store: Arc<dyn Store>, executor: Arc<ReleaseExecutor>, concurrency: usize) -> Self {
        Self {
            store,
            executor,
            concurrency: concurrency.max(1),
        }
    }

    /// One pass. Up to `concurrency` messages are in flight at once; each
    /// message's recipients are handled together by the executor.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<ReleaseSummary> {
        let due = self.store.fetch_due_scheduled(now)?;
        if due.is_empty() {
            return Ok(ReleaseSummary::default());
        }
        let count = due.len();

        let outcomes: Vec<_> = stream::iter(due.into_iter().map(WorkItem::now))
            .map(|item| {
                let executor = Arc::clone(&self.executor);
                async move { executor.execute(&item, now).await }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = ReleaseSummary::default();
        for outcome in &outcomes {
            summary.record(outcome);
        }
        info!(
            due = count,
            released = summary.released,
            errors = summary.errors,
            skipped = summary.skipped,
            "sweep tick finished"
        );
        Ok(summary)
    }

    /// Tick every `every` until `shutdown` broadcasts `true`.
    pub async fn run(self, every: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = every.as_secs(), "scheduled sweep started");
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!(error = %e, "sweep tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender also ends the loop.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduled sweep shutting down");
                        break;
                    }
                }
            }
        }
    }
}
