use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A time expression or persisted document does not have the expected shape.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Short error code printed by the CLI next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidFormat(_) => "INVALID_FORMAT",
            CoreError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
