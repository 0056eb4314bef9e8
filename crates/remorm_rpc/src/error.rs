//! Error types for the RPC layer.

use crate::client::RpcFault;
use thiserror::Error;

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors that can occur when talking to the remote service.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Network or transport failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the call can be retried.
        retryable: bool,
    },

    /// The remote answered, but with an unsuccessful response.
    #[error("remote call '{method}' failed: {fault}")]
    Unsuccessful {
        /// The resolved method name.
        method: String,
        /// The fault reported by the remote.
        fault: RpcFault,
    },

    /// The client returned a different number of responses than requests.
    #[error("response count mismatch: sent {sent} requests, got {received} responses")]
    ResponseCountMismatch {
        /// Requests sent.
        sent: usize,
        /// Responses received.
        received: usize,
    },

    /// A successful response carried no body where one was required.
    #[error("remote call '{method}' returned an empty body")]
    EmptyBody {
        /// The resolved method name.
        method: String,
    },

    /// No client is registered under the declared name.
    #[error("unknown RPC client: {name}")]
    UnknownClient {
        /// The declared client name.
        name: String,
    },

    /// No API factory is registered under the declared alias.
    #[error("unknown API alias: {alias}")]
    UnknownApi {
        /// The declared API alias.
        alias: String,
    },
}

impl RpcError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            message: message.into(),
            retryable,
        }
    }

    /// Creates an unsuccessful-response error.
    pub fn unsuccessful(method: impl Into<String>, fault: RpcFault) -> Self {
        Self::Unsuccessful {
            method: method.into(),
            fault,
        }
    }
}
