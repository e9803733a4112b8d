use thiserror::Error;

/// Errors a dispatcher can report. The release engine treats every variant
/// as a transient failure of that one send.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The address is empty or not something the provider can deliver to.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The provider answered with a non-success status.
    #[error("Provider rejected send ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The request never completed (DNS, TLS, timeout, …).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The dispatcher is missing required configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}
