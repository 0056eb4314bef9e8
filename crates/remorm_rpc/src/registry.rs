//! Client and API resolution registries.

use crate::api::{CrudApi, RpcCrudApi};
use crate::client::RpcClient;
use crate::error::{RpcError, RpcResult};
use crate::method::EntityMethods;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves declared client names to live RPC clients.
#[derive(Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Arc<dyn RpcClient>>,
    default_client: Option<Arc<dyn RpcClient>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client under a name.
    pub fn register(&mut self, name: impl Into<String>, client: Arc<dyn RpcClient>) {
        self.clients.insert(name.into(), client);
    }

    /// Sets the client used when a class declares no client name.
    pub fn set_default(&mut self, client: Arc<dyn RpcClient>) {
        self.default_client = Some(client);
    }

    /// Resolves a client by declared name, falling back to the default.
    pub fn resolve(&self, name: Option<&str>) -> RpcResult<Arc<dyn RpcClient>> {
        match name {
            Some(name) => self
                .clients
                .get(name)
                .cloned()
                .ok_or_else(|| RpcError::UnknownClient { name: name.into() }),
            None => self
                .default_client
                .clone()
                .ok_or_else(|| RpcError::UnknownClient {
                    name: "<default>".into(),
                }),
        }
    }
}

/// Factory producing a CRUD API for one entity class.
pub type ApiFactory =
    Arc<dyn Fn(Arc<dyn RpcClient>, EntityMethods) -> Box<dyn CrudApi> + Send + Sync>;

/// Resolves declared API aliases to CRUD API factories.
///
/// An unknown alias is a configuration error; the absence of an alias
/// selects the stock `RpcCrudApi`.
pub struct ApiRegistry {
    factories: HashMap<String, ApiFactory>,
}

impl ApiRegistry {
    /// Creates a registry with no custom factories.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory under an alias.
    pub fn register(&mut self, alias: impl Into<String>, factory: ApiFactory) {
        self.factories.insert(alias.into(), factory);
    }

    /// Builds the CRUD API for a class.
    pub fn build(
        &self,
        alias: Option<&str>,
        client: Arc<dyn RpcClient>,
        methods: EntityMethods,
    ) -> RpcResult<Box<dyn CrudApi>> {
        match alias {
            Some(alias) => {
                let factory = self
                    .factories
                    .get(alias)
                    .ok_or_else(|| RpcError::UnknownApi { alias: alias.into() })?;
                Ok(factory(client, methods))
            }
            None => Ok(Box::new(RpcCrudApi::new(client, methods))),
        }
    }
}

impl Default for ApiRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockRpcClient;

    #[test]
    fn resolves_registered_client() {
        let mut registry = ClientRegistry::new();
        registry.register("billing", Arc::new(MockRpcClient::new()));

        assert!(registry.resolve(Some("billing")).is_ok());
        assert!(matches!(
            registry.resolve(Some("missing")),
            Err(RpcError::UnknownClient { .. })
        ));
    }

    #[test]
    fn default_client_fallback() {
        let mut registry = ClientRegistry::new();
        assert!(registry.resolve(None).is_err());

        registry.set_default(Arc::new(MockRpcClient::new()));
        assert!(registry.resolve(None).is_ok());
    }

    #[test]
    fn api_registry_defaults_to_rpc_api() {
        let registry = ApiRegistry::new();
        let client: Arc<dyn RpcClient> = Arc::new(MockRpcClient::new());
        let api = registry.build(None, client, EntityMethods::new("users"));
        assert!(api.is_ok());
    }

    #[test]
    fn unknown_alias_is_an_error() {
        let registry = ApiRegistry::new();
        let client: Arc<dyn RpcClient> = Arc::new(MockRpcClient::new());
        let api = registry.build(Some("soap"), client, EntityMethods::new("users"));
        assert!(matches!(api, Err(RpcError::UnknownApi { .. })));
    }
}
