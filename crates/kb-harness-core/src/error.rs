//! Error taxonomy shared by every core component.
//!
//! | Variant | Raised when |
//! |---------|-------------|
//! | [`Validation`](HarnessError::Validation) | malformed documents, empty queries, bad filters, bad test cases |
//! | [`NotInitialized`](HarnessError::NotInitialized) | a collection operation runs before `create_or_get` |
//! | [`ExternalService`](HarnessError::ExternalService) | the embedding or completion backend fails |
//! | [`Format`](HarnessError::Format) | a persisted payload cannot be decoded |
//! | [`Configuration`](HarnessError::Configuration) | a system under test returns an unusable answer shape |
//! | [`Storage`](HarnessError::Storage) | the vector store backend fails to read or write |

/// Errors produced by the core crate.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("collection not initialized: call create_or_get first")]
    NotInitialized,

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("format error in {source_name}: {message}")]
    Format {
        source_name: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl HarnessError {
    pub fn validation(message: impl Into<String>) -> Self {
        HarnessError::Validation(message.into())
    }

    pub fn external(message: impl Into<String>) -> Self {
        HarnessError::ExternalService(message.into())
    }

    pub fn format(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        HarnessError::Format {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        HarnessError::Storage(message.into())
    }

    /// True for errors that must abort a benchmark run instead of being
    /// recorded as a failed case.
    pub fn is_configuration(&self) -> bool {
        matches!(self, HarnessError::Configuration(_))
    }
}

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, HarnessError>;
