//! The CRUD API consumed by entity persisters.

use crate::client::{RpcClient, RpcRequest};
use crate::error::{RpcError, RpcResult};
use crate::method::{EntityMethods, Verb};
use remorm_wire::{Record, Value};
use std::sync::Arc;

/// Sort direction for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    /// The wire name of this direction.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// A flat search query, already expressed in wire field names.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Equality/IN criteria per wire field.
    pub criteria: Record,
    /// Ordering, applied in declaration order.
    pub order_by: Vec<(String, SortOrder)>,
    /// Maximum number of records.
    pub limit: Option<u64>,
    /// Records to skip.
    pub offset: Option<u64>,
}

impl SearchQuery {
    /// Creates a query with criteria only.
    #[must_use]
    pub fn with_criteria(criteria: Record) -> Self {
        Self {
            criteria,
            ..Self::default()
        }
    }

    fn to_parameters(&self) -> Record {
        let mut parameters = Record::new();
        parameters.insert("criteria".into(), Value::Map(self.criteria.clone()));
        if !self.order_by.is_empty() {
            let order: Record = self
                .order_by
                .iter()
                .map(|(field, dir)| (field.clone(), Value::Text(dir.as_str().into())))
                .collect();
            parameters.insert("order".into(), Value::Map(order));
        }
        if let Some(limit) = self.limit {
            parameters.insert("limit".into(), Value::Int(limit as i64));
        }
        if let Some(offset) = self.offset {
            parameters.insert("offset".into(), Value::Int(offset as i64));
        }
        parameters
    }
}

/// The six remote operations for one entity class, over wire values.
///
/// Implementations are resolved through the `ApiRegistry` by the API alias
/// declared on the class mapping; `RpcCrudApi` is the stock implementation
/// over an `RpcClient` plus resolved method names.
pub trait CrudApi: Send + Sync {
    /// Fetches a single record by identifier criteria.
    ///
    /// A successful response with a null or missing body means not found.
    fn find(&self, criteria: &Record) -> RpcResult<Option<Record>>;

    /// Fetches all records matching a query.
    fn search(&self, query: &SearchQuery) -> RpcResult<Vec<Record>>;

    /// Creates a record, returning the remote's response body (which may
    /// carry a generated identifier or a full record).
    fn create(&self, payload: &Record) -> RpcResult<Option<Value>>;

    /// Creates several records in one invoke batch.
    fn create_many(&self, payloads: &[Record]) -> RpcResult<Vec<Option<Value>>>;

    /// Applies a partial update to records matching identifier criteria.
    fn patch(&self, criteria: &Record, patch: &Record) -> RpcResult<()>;

    /// Deletes records matching identifier criteria.
    fn remove(&self, criteria: &Record) -> RpcResult<()>;

    /// Counts records matching criteria.
    fn count(&self, criteria: &Record) -> RpcResult<i64>;
}

/// Stock `CrudApi` implementation over an RPC client.
pub struct RpcCrudApi {
    client: Arc<dyn RpcClient>,
    methods: EntityMethods,
}

impl RpcCrudApi {
    /// Creates an API over a client and resolved method configuration.
    pub fn new(client: Arc<dyn RpcClient>, methods: EntityMethods) -> Self {
        Self { client, methods }
    }

    fn call(&self, verb: Verb, parameters: Record) -> RpcResult<Option<Value>> {
        let method = self.methods.resolve(verb);
        tracing::trace!(method = %method, "remote call");
        let response = self.client.call(RpcRequest::new(method.clone(), parameters))?;
        response.into_body(&method)
    }

    fn expect_record(value: Value, method: &str) -> RpcResult<Record> {
        match value {
            Value::Map(record) => Ok(record),
            other => Err(RpcError::transport(
                format!("'{method}' returned a {} where a record was expected", other.kind()),
                false,
            )),
        }
    }
}

impl CrudApi for RpcCrudApi {
    fn find(&self, criteria: &Record) -> RpcResult<Option<Record>> {
        let method = self.methods.resolve(Verb::Find);
        match self.call(Verb::Find, criteria.clone())? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Self::expect_record(value, &method).map(Some),
        }
    }

    fn search(&self, query: &SearchQuery) -> RpcResult<Vec<Record>> {
        let method = self.methods.resolve(Verb::Search);
        match self.call(Verb::Search, query.to_parameters())? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| Self::expect_record(item, &method))
                .collect(),
            Some(other) => Err(RpcError::transport(
                format!("'{method}' returned a {} where a list was expected", other.kind()),
                false,
            )),
        }
    }

    fn create(&self, payload: &Record) -> RpcResult<Option<Value>> {
        self.call(Verb::Create, payload.clone())
    }

    fn create_many(&self, payloads: &[Record]) -> RpcResult<Vec<Option<Value>>> {
        if payloads.is_empty() {
            return Ok(Vec::new());
        }
        let method = self.methods.resolve(Verb::Create);
        let requests: Vec<RpcRequest> = payloads
            .iter()
            .map(|payload| RpcRequest::new(method.clone(), payload.clone()))
            .collect();
        let responses = self.client.invoke(&requests)?;
        if responses.len() != requests.len() {
            return Err(RpcError::ResponseCountMismatch {
                sent: requests.len(),
                received: responses.len(),
            });
        }
        responses
            .into_iter()
            .map(|response| response.into_body(&method))
            .collect()
    }

    fn patch(&self, criteria: &Record, patch: &Record) -> RpcResult<()> {
        let mut parameters = Record::new();
        parameters.insert("criteria".into(), Value::Map(criteria.clone()));
        parameters.insert("patch".into(), Value::Map(patch.clone()));
        self.call(Verb::Patch, parameters)?;
        Ok(())
    }

    fn remove(&self, criteria: &Record) -> RpcResult<()> {
        self.call(Verb::Remove, criteria.clone())?;
        Ok(())
    }

    fn count(&self, criteria: &Record) -> RpcResult<i64> {
        let method = self.methods.resolve(Verb::Count);
        let mut parameters = Record::new();
        parameters.insert("criteria".into(), Value::Map(criteria.clone()));
        match self.call(Verb::Count, parameters)? {
            Some(Value::Int(n)) => Ok(n),
            Some(other) => Err(RpcError::transport(
                format!("'{method}' returned a {} where a count was expected", other.kind()),
                false,
            )),
            None => Err(RpcError::EmptyBody { method }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockRpcClient, RpcResponse};

    fn api(mock: Arc<MockRpcClient>) -> RpcCrudApi {
        RpcCrudApi::new(mock, EntityMethods::new("users"))
    }

    fn id_criteria(id: i64) -> Record {
        let mut criteria = Record::new();
        criteria.insert("id".into(), Value::Int(id));
        criteria
    }

    #[test]
    fn find_maps_null_body_to_none() {
        let mock = Arc::new(MockRpcClient::new());
        mock.script("users/find", RpcResponse::success(Value::Null));

        let found = api(Arc::clone(&mock)).find(&id_criteria(9)).unwrap();
        assert!(found.is_none());
        assert_eq!(mock.calls_to("users/find"), 1);
    }

    #[test]
    fn find_returns_record() {
        let mock = Arc::new(MockRpcClient::new());
        let mut record = Record::new();
        record.insert("id".into(), Value::Int(9));
        mock.script("users/find", RpcResponse::success(Value::Map(record.clone())));

        let found = api(Arc::clone(&mock)).find(&id_criteria(9)).unwrap();
        assert_eq!(found, Some(record));
    }

    #[test]
    fn search_builds_query_parameters() {
        let mock = Arc::new(MockRpcClient::new());
        mock.script("users/search", RpcResponse::success(Value::Array(vec![])));

        let query = SearchQuery {
            criteria: id_criteria(1),
            order_by: vec![("name".into(), SortOrder::Desc)],
            limit: Some(10),
            offset: Some(5),
        };
        let results = api(Arc::clone(&mock)).search(&query).unwrap();
        assert!(results.is_empty());

        let recorded = mock.recorded();
        let parameters = &recorded[0].parameters;
        assert!(parameters.contains_key("criteria"));
        assert!(parameters.contains_key("order"));
        assert_eq!(parameters.get("limit"), Some(&Value::Int(10)));
        assert_eq!(parameters.get("offset"), Some(&Value::Int(5)));
    }

    #[test]
    fn count_requires_integer_body() {
        let mock = Arc::new(MockRpcClient::new());
        mock.script("users/count", RpcResponse::success(Value::Int(3)));
        assert_eq!(api(Arc::clone(&mock)).count(&Record::new()).unwrap(), 3);

        mock.script("users/count", RpcResponse::success(Value::Text("3".into())));
        assert!(api(mock).count(&Record::new()).is_err());
    }

    #[test]
    fn create_many_batches_in_one_invoke() {
        let mock = Arc::new(MockRpcClient::new());
        mock.script("users/create", RpcResponse::success(Value::Int(1)));
        mock.script("users/create", RpcResponse::success(Value::Int(2)));

        let payloads = vec![Record::new(), Record::new()];
        let ids = api(Arc::clone(&mock)).create_many(&payloads).unwrap();
        assert_eq!(ids, vec![Some(Value::Int(1)), Some(Value::Int(2))]);
        assert_eq!(mock.calls_to("users/create"), 2);
    }
}
