//! Error types for metadata construction.

use thiserror::Error;

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors raised while building entity metadata.
///
/// Both variants indicate a programming error in the mapping configuration
/// and must abort startup; they are never recovered automatically.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The driver has no description for the class and it is not an alias.
    #[error("no mapping found for class: {class}")]
    NotFound {
        /// The requested class name.
        class: String,
    },

    /// The mapping is ambiguous, duplicated or contradictory.
    #[error("mapping conflict for class {class}: {message}")]
    Conflict {
        /// The offending class name.
        class: String,
        /// Description of the conflict.
        message: String,
    },
}

impl MappingError {
    /// Creates a not-found error.
    pub fn not_found(class: impl Into<String>) -> Self {
        Self::NotFound {
            class: class.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            class: class.into(),
            message: message.into(),
        }
    }
}
