use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::{dispatcher::Dispatcher, error::NotifyError};

const WINDOW: Duration = Duration::from_secs(1);

/// Fixed one-second window counter.
struct Window {
    started: Instant,
    used: u32,
}

/// Best-effort send cap in front of another dispatcher.
///
/// The counter lives in process memory only. It is not authoritative and
/// resets with every invocation; over the cap, callers wait for the next
/// window instead of failing.
pub struct RateLimited {
    inner: Arc<dyn Dispatcher>,
    max_per_window: u32,
    window: Mutex<Window>,
}

impl RateLimited {
    pub fn new(inner: Arc<dyn Dispatcher>, max_per_second: u32) -> Self {
        Self {
            inner,
            max_per_window: max_per_second.max(1),
            window: Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Take a slot at `now`, or return how long to wait before retrying.
    fn reserve(&self, now: Instant) -> Option<Duration> {
        // A poisoned counter is still a usable counter.
        let mut w = self.window.lock().unwrap_or_else(|p| p.into_inner());
        if now.duration_since(w.started) >= WINDOW {
            w.started = now;
            w.used = 0;
        }
        if w.used < self.max_per_window {
            w.used += 1;
            None
        } else {
            Some((w.started + WINDOW).saturating_duration_since(now))
        }
    }
}

#[async_trait]
impl Dispatcher for RateLimited {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        while let Some(wait) = self.reserve(Instant::now()) {
            debug!(wait_ms = wait.as_millis() as u64, "send cap reached, waiting for next window");
            sleep(wait).await;
        }
        self.inner.send(to, subject, body).await
    }
}
