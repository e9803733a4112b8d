use std::sync::Arc;

use async_trait::async_trait;
use keepsake_core::config::{NotifyConfig, NotifyMode};
use tracing::info;

use crate::{
    error::NotifyError, http::HttpDispatcher, log_only::LogDispatcher, rate_limit::RateLimited,
};

/// The notification collaborator: delivers one message to one address.
///
/// A call is all-or-nothing. Whatever retrying the provider does internally
/// is invisible to the caller; `Err` means "not delivered this time".
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Stable lowercase identifier used in logs (e.g. `"http"`).
    fn name(&self) -> &str;

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Build the dispatcher chain described by `config`.
///
/// The rate limiter wraps the real dispatcher unless `max_per_second` is 0.
pub fn from_config(config: &NotifyConfig) -> Result<Arc<dyn Dispatcher>, NotifyError> {
    let inner: Arc<dyn Dispatcher> = match config.mode {
        NotifyMode::Log => Arc::new(LogDispatcher::new()),
        NotifyMode::Http => Arc::new(HttpDispatcher::from_config(config)?),
    };
    info!(
        dispatcher = inner.name(),
        max_per_second = config.max_per_second,
        "notification dispatcher ready"
    );

    if config.max_per_second == 0 {
        return Ok(inner);
    }
    Ok(Arc::new(RateLimited::new(inner, config.max_per_second)))
}
