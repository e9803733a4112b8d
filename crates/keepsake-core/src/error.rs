use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeepsakeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeepsakeError {
    /// Short machine-readable code for log fields.
    pub fn code(&self) -> &'static str {
        match self {
            KeepsakeError::Config(_) => "CONFIG_ERROR",
            KeepsakeError::InvalidValue { .. } => "INVALID_VALUE",
            KeepsakeError::Serialization(_) => "SERIALIZATION_ERROR",
            KeepsakeError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, KeepsakeError>;
