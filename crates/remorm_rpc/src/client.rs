//! RPC envelope and client contract.

use crate::error::{RpcError, RpcResult};
use parking_lot::Mutex;
use remorm_wire::{Record, Value};
use std::collections::VecDeque;
use std::fmt;

/// A single RPC request: a resolved method name plus named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// Fully resolved remote method name, e.g. `users/find`.
    pub method: String,
    /// Named parameters, already expressed in wire field names.
    pub parameters: Record,
}

impl RpcRequest {
    /// Creates a request.
    pub fn new(method: impl Into<String>, parameters: Record) -> Self {
        Self {
            method: method.into(),
            parameters,
        }
    }

    /// Creates a request with a single named parameter.
    pub fn with_parameter(
        method: impl Into<String>,
        name: impl Into<String>,
        value: Value,
    ) -> Self {
        let mut parameters = Record::new();
        parameters.insert(name.into(), value);
        Self::new(method, parameters)
    }
}

/// A fault reported by the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcFault {
    /// Remote error code.
    pub code: i64,
    /// Remote error message.
    pub message: String,
}

impl RpcFault {
    /// Creates a fault.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)
    }
}

/// A single RPC response.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    body: Option<Value>,
    error: Option<RpcFault>,
}

impl RpcResponse {
    /// Creates a successful response with a body.
    #[must_use]
    pub fn success(body: Value) -> Self {
        Self {
            body: Some(body),
            error: None,
        }
    }

    /// Creates a successful response without a body.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            body: None,
            error: None,
        }
    }

    /// Creates a failed response.
    #[must_use]
    pub fn failure(fault: RpcFault) -> Self {
        Self {
            body: None,
            error: Some(fault),
        }
    }

    /// Returns true if the remote reported success.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.error.is_none()
    }

    /// Returns the response body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Returns the fault, if the response failed.
    #[must_use]
    pub fn error(&self) -> Option<&RpcFault> {
        self.error.as_ref()
    }

    /// Consumes the response, yielding the body of a successful response.
    ///
    /// A failed response becomes `RpcError::Unsuccessful` for `method`.
    pub fn into_body(self, method: &str) -> RpcResult<Option<Value>> {
        match self.error {
            Some(fault) => Err(RpcError::unsuccessful(method, fault)),
            None => Ok(self.body),
        }
    }
}

/// The minimal client contract consumed by the engine.
///
/// `invoke` takes a batch of requests and must return exactly one response
/// per request, in order. Implementations are free to coalesce the batch
/// into one network round trip.
pub trait RpcClient: Send + Sync {
    /// Invokes a batch of requests against the remote service.
    fn invoke(&self, requests: &[RpcRequest]) -> RpcResult<Vec<RpcResponse>>;

    /// Invokes a single request.
    fn call(&self, request: RpcRequest) -> RpcResult<RpcResponse> {
        let method = request.method.clone();
        let mut responses = self.invoke(std::slice::from_ref(&request))?;
        match responses.len() {
            1 => Ok(responses.remove(0)),
            n => {
                tracing::debug!(method = %method, responses = n, "invoke returned a bad batch");
                Err(RpcError::ResponseCountMismatch {
                    sent: 1,
                    received: n,
                })
            }
        }
    }
}

/// A scripted client for tests.
///
/// Responses are queued per method name; every request is recorded. When no
/// response is scripted for a method, `invoke` fails with a non-retryable
/// transport error so tests notice unexpected calls.
#[derive(Default)]
pub struct MockRpcClient {
    responses: Mutex<std::collections::HashMap<String, VecDeque<RpcResponse>>>,
    requests: Mutex<Vec<RpcRequest>>,
}

impl MockRpcClient {
    /// Creates a mock with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for a method.
    pub fn script(&self, method: impl Into<String>, response: RpcResponse) {
        self.responses
            .lock()
            .entry(method.into())
            .or_default()
            .push_back(response);
    }

    /// Returns all recorded requests so far.
    #[must_use]
    pub fn recorded(&self) -> Vec<RpcRequest> {
        self.requests.lock().clone()
    }

    /// Returns how many requests were made for a method.
    #[must_use]
    pub fn calls_to(&self, method: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }
}

impl RpcClient for MockRpcClient {
    fn invoke(&self, requests: &[RpcRequest]) -> RpcResult<Vec<RpcResponse>> {
        let mut out = Vec::with_capacity(requests.len());
        for request in requests {
            self.requests.lock().push(request.clone());
            let response = self
                .responses
                .lock()
                .get_mut(&request.method)
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| {
                    RpcError::transport(
                        format!("no scripted response for '{}'", request.method),
                        false,
                    )
                })?;
            out.push(response);
        }
        Ok(out)
    }
}
