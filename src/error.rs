/// Error types shared by the provider, the settings store and the engine
use thiserror::Error;

/// Message the browser reports while a tab drag or similar edit is in progress
pub const BUSY_MESSAGE: &str = "Tabs cannot be edited right now";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Transient: the browser is mid-edit and will accept the call shortly
    #[error("browser busy during {op}: {message}")]
    Busy { op: &'static str, message: String },

    #[error("{op} rejected: {message}")]
    Rejected { op: &'static str, message: String },
}

impl ProviderError {
    /// Classify a raw browser error message for the given operation
    pub fn from_message(op: &'static str, message: impl Into<String>) -> ProviderError {
        let message = message.into();
        if message.contains(BUSY_MESSAGE) {
            ProviderError::Busy { op, message }
        } else {
            ProviderError::Rejected { op, message }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Busy { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("failed to read setting {key}: {message}")]
    Read { key: &'static str, message: String },

    #[error("failed to write setting {key}: {message}")]
    Write { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("invalid domain or address: {0:?}")]
    InvalidDomain(String),

    #[error("group name must not be empty")]
    EmptyGroupName,
}
