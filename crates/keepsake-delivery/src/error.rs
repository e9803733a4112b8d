use keepsake_store::StoreError;
use thiserror::Error;

/// Whole-batch failures. Per-item failures are counted in
/// [`ReleaseSummary`](crate::types::ReleaseSummary) instead of returned here.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The store could not produce the eligible set at all.
    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Message not found: {id}")]
    MessageNotFound { id: String },

    /// The message has no recipient that a token could be issued for.
    #[error("Message {id} has no recipients")]
    NoRecipients { id: String },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] keepsake_notify::NotifyError),
}

/// Reasons a delivery token cannot be issued or redeemed.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("unknown token")]
    Unknown,

    /// Past `expires_at`. Also raised when asked to renew the token of a
    /// message that has already been sent.
    #[error("token expired")]
    Expired,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
