//! Engine error types.

use remorm_meta::MappingError;
use remorm_rpc::RpcError;
use remorm_wire::TypeError;
use thiserror::Error;

/// Errors raised by the persistence engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A mapping could not be resolved or was invalid.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A scalar conversion failed.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// No accessor table is registered for a class.
    #[error("no accessors registered for class '{class}'")]
    NotRegistered {
        /// Class name.
        class: String,
    },

    /// An accessor was applied to an instance of the wrong concrete type.
    #[error("accessor error on class '{class}': {message}")]
    Accessor {
        /// Class name.
        class: String,
        /// What went wrong.
        message: String,
    },

    /// A wire record could not be turned into an entity instance.
    #[error("cannot hydrate class '{class}': {message}")]
    Hydration {
        /// Class being hydrated.
        class: String,
        /// What went wrong.
        message: String,
    },

    /// A lazy load found no remote record for a managed identifier.
    #[error("no remote record for class '{class}' with id '{id}'")]
    Fetch {
        /// Class being loaded.
        class: String,
        /// Flattened identifier.
        id: String,
    },

    /// A remote call failed.
    #[error("remote call '{method}' failed")]
    RemoteCallFailed {
        /// Resolved method name.
        method: String,
        /// Underlying RPC failure.
        #[source]
        source: RpcError,
    },

    /// A flush step failed; earlier steps of the same flush are not
    /// rolled back.
    #[error("commit failed for class '{class}' during {operation}")]
    CommitFailed {
        /// Class whose write failed.
        class: String,
        /// Flush step that failed.
        operation: String,
        /// Underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// An operation was applied to an entity in the wrong lifecycle
    /// state.
    #[error("invalid state for class '{class}': {message}")]
    InvalidState {
        /// Class name.
        class: String,
        /// What went wrong.
        message: String,
    },

    /// The unit of work backing a proxy or collection is gone.
    #[error("unit of work has been dropped")]
    EngineGone,
}

impl CoreError {
    pub(crate) fn not_registered(class: impl Into<String>) -> Self {
        CoreError::NotRegistered {
            class: class.into(),
        }
    }

    pub(crate) fn accessor(class: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Accessor {
            class: class.into(),
            message: message.into(),
        }
    }

    pub(crate) fn hydration(class: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Hydration {
            class: class.into(),
            message: message.into(),
        }
    }

    pub(crate) fn fetch(class: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::Fetch {
            class: class.into(),
            id: id.into(),
        }
    }

    pub(crate) fn remote(method: impl Into<String>, source: RpcError) -> Self {
        CoreError::RemoteCallFailed {
            method: method.into(),
            source,
        }
    }

    pub(crate) fn commit(
        class: impl Into<String>,
        operation: impl Into<String>,
        source: CoreError,
    ) -> Self {
        CoreError::CommitFailed {
            class: class.into(),
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn invalid_state(class: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::InvalidState {
            class: class.into(),
            message: message.into(),
        }
    }
}

/// Result alias for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;
