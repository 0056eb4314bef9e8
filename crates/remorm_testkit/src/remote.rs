//! An in-process fake of the remote CRUD service.
//!
//! `FakeRemote` keeps per-entity tables of wire records and answers the
//! six verbs the engine speaks: equality/IN criteria, ordering, paging,
//! sequential identifier generation, and a per-method failure queue for
//! error-path tests. Every call is logged so tests can assert exactly
//! how many remote round trips an operation cost.

use parking_lot::Mutex;
use remorm_rpc::{RpcClient, RpcFault, RpcRequest, RpcResponse, RpcResult};
use remorm_wire::{Record, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

struct Table {
    rows: Vec<Record>,
    /// Wire field receiving generated identifiers, if the table
    /// generates them.
    id_field: Option<String>,
    next_id: i64,
}

impl Table {
    fn natural() -> Self {
        Self {
            rows: Vec::new(),
            id_field: None,
            next_id: 1,
        }
    }

    fn generating(id_field: &str) -> Self {
        Self {
            rows: Vec::new(),
            id_field: Some(id_field.to_owned()),
            next_id: 1,
        }
    }
}

/// In-memory remote service for tests.
#[derive(Default)]
pub struct FakeRemote {
    tables: Mutex<HashMap<String, Table>>,
    log: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, VecDeque<RpcFault>>>,
}

impl FakeRemote {
    /// Creates a remote with no tables; unknown entity paths get a
    /// natural-identifier table on first touch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a table whose identifiers are generated remotely.
    pub fn generate_ids(&self, path: &str, id_field: &str) {
        self.tables
            .lock()
            .insert(path.to_owned(), Table::generating(id_field));
    }

    /// Sets the next generated identifier for a table.
    pub fn set_next_id(&self, path: &str, next_id: i64) {
        let mut tables = self.tables.lock();
        tables
            .entry(path.to_owned())
            .or_insert_with(Table::natural)
            .next_id = next_id;
    }

    /// Inserts a row directly, bypassing the verbs.
    pub fn seed(&self, path: &str, row: Record) {
        let mut tables = self.tables.lock();
        tables
            .entry(path.to_owned())
            .or_insert_with(Table::natural)
            .rows
            .push(row);
    }

    /// Snapshot of a table's rows.
    #[must_use]
    pub fn rows(&self, path: &str) -> Vec<Record> {
        self.tables
            .lock()
            .get(path)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// The first row whose `field` equals `value`.
    #[must_use]
    pub fn row_where(&self, path: &str, field: &str, value: &Value) -> Option<Record> {
        self.rows(path)
            .into_iter()
            .find(|row| row.get(field) == Some(value))
    }

    /// Every method invoked so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// How many times a method was invoked.
    #[must_use]
    pub fn calls_to(&self, method: &str) -> usize {
        self.log.lock().iter().filter(|m| *m == method).count()
    }

    /// Total number of invocations.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.log.lock().len()
    }

    /// Forgets the call log.
    pub fn reset_calls(&self) {
        self.log.lock().clear();
    }

    /// Queues a fault for the next invocation of `method`.
    pub fn fail_next(&self, method: &str, code: i64, message: &str) {
        self.failures
            .lock()
            .entry(method.to_owned())
            .or_default()
            .push_back(RpcFault::new(code, message));
    }

    fn respond(&self, request: &RpcRequest) -> RpcResponse {
        if let Some(fault) = self
            .failures
            .lock()
            .get_mut(&request.method)
            .and_then(VecDeque::pop_front)
        {
            return RpcResponse::failure(fault);
        }

        let Some((path, verb)) = request.method.rsplit_once('/') else {
            return RpcResponse::failure(RpcFault::new(400, "malformed method name"));
        };
        let mut tables = self.tables.lock();
        let table = tables
            .entry(path.to_owned())
            .or_insert_with(Table::natural);

        match verb {
            "find" => {
                let found = table
                    .rows
                    .iter()
                    .find(|row| matches_criteria(row, &request.parameters));
                match found {
                    Some(row) => RpcResponse::success(Value::Map(row.clone())),
                    None => RpcResponse::success(Value::Null),
                }
            }
            "search" => {
                let criteria = map_parameter(&request.parameters, "criteria");
                let mut rows: Vec<Record> = table
                    .rows
                    .iter()
                    .filter(|row| matches_criteria(row, &criteria))
                    .cloned()
                    .collect();
                if let Some(Value::Map(order)) = request.parameters.get("order") {
                    for (field, direction) in order {
                        let descending = direction.as_text() == Some("desc");
                        rows.sort_by(|a, b| {
                            let ordering = compare_values(
                                a.get(field).unwrap_or(&Value::Null),
                                b.get(field).unwrap_or(&Value::Null),
                            );
                            if descending {
                                ordering.reverse()
                            } else {
                                ordering
                            }
                        });
                    }
                }
                let offset = int_parameter(&request.parameters, "offset").unwrap_or(0) as usize;
                let limit = int_parameter(&request.parameters, "limit")
                    .map_or(usize::MAX, |n| n as usize);
                let page: Vec<Value> = rows
                    .into_iter()
                    .skip(offset)
                    .take(limit)
                    .map(Value::Map)
                    .collect();
                RpcResponse::success(Value::Array(page))
            }
            "create" => {
                let mut row = request.parameters.clone();
                let generated = table.id_field.clone().map(|field| {
                    let id = table.next_id;
                    table.next_id += 1;
                    row.insert(field, Value::Int(id));
                    id
                });
                table.rows.push(row);
                match generated {
                    Some(id) => RpcResponse::success(Value::Int(id)),
                    None => RpcResponse::empty(),
                }
            }
            "patch" => {
                let criteria = map_parameter(&request.parameters, "criteria");
                let patch = map_parameter(&request.parameters, "patch");
                for row in table
                    .rows
                    .iter_mut()
                    .filter(|row| matches_criteria(row, &criteria))
                {
                    for (field, value) in &patch {
                        row.insert(field.clone(), value.clone());
                    }
                }
                RpcResponse::empty()
            }
            "remove" => {
                table
                    .rows
                    .retain(|row| !matches_criteria(row, &request.parameters));
                RpcResponse::empty()
            }
            "count" => {
                let criteria = map_parameter(&request.parameters, "criteria");
                let n = table
                    .rows
                    .iter()
                    .filter(|row| matches_criteria(row, &criteria))
                    .count();
                RpcResponse::success(Value::Int(n as i64))
            }
            other => RpcResponse::failure(RpcFault::new(400, format!("unknown verb '{other}'"))),
        }
    }
}

impl RpcClient for FakeRemote {
    fn invoke(&self, requests: &[RpcRequest]) -> RpcResult<Vec<RpcResponse>> {
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            self.log.lock().push(request.method.clone());
            responses.push(self.respond(request));
        }
        Ok(responses)
    }
}

fn map_parameter(parameters: &Record, name: &str) -> Record {
    match parameters.get(name) {
        Some(Value::Map(map)) => map.clone(),
        _ => Record::new(),
    }
}

fn int_parameter(parameters: &Record, name: &str) -> Option<i64> {
    match parameters.get(name) {
        Some(Value::Int(n)) => Some(*n),
        _ => None,
    }
}

/// Equality per criterion; an array criterion is an IN filter.
fn matches_criteria(row: &Record, criteria: &Record) -> bool {
    criteria.iter().all(|(field, expected)| {
        let actual = row.get(field).unwrap_or(&Value::Null);
        match expected {
            Value::Array(options) => options.contains(actual),
            single => single == actual,
        }
    })
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Int(x), Value::Float(y)) => {
            (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (Value::Float(x), Value::Int(y)) => {
            x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal)
        }
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn find_matches_equality_criteria() {
        let remote = FakeRemote::new();
        remote.seed("user", row(&[("id", Value::from("u-1")), ("name", Value::from("Ada"))]));

        let response = remote
            .call(RpcRequest::with_parameter(
                "user/find",
                "id",
                Value::from("u-1"),
            ))
            .unwrap();
        assert!(matches!(response.body(), Some(Value::Map(_))));

        let missing = remote
            .call(RpcRequest::with_parameter(
                "user/find",
                "id",
                Value::from("ghost"),
            ))
            .unwrap();
        assert_eq!(missing.body(), Some(&Value::Null));
    }

    #[test]
    fn search_orders_and_pages() {
        let remote = FakeRemote::new();
        for (id, title) in [(3, "c"), (1, "a"), (2, "b")] {
            remote.seed("post", row(&[("id", Value::Int(id)), ("title", Value::from(title))]));
        }

        let mut parameters = Record::new();
        parameters.insert("criteria".into(), Value::Map(Record::new()));
        let mut order = Record::new();
        order.insert("id".into(), Value::from("asc"));
        parameters.insert("order".into(), Value::Map(order));
        parameters.insert("limit".into(), Value::Int(2));
        parameters.insert("offset".into(), Value::Int(1));

        let response = remote
            .call(RpcRequest::new("post/search", parameters))
            .unwrap();
        let Some(Value::Array(items)) = response.body() else {
            panic!("expected an array body");
        };
        assert_eq!(items.len(), 2);
        let Value::Map(first) = &items[0] else {
            panic!("expected record items");
        };
        assert_eq!(first.get("id"), Some(&Value::Int(2)));
    }

    #[test]
    fn create_generates_sequential_identifiers() {
        let remote = FakeRemote::new();
        remote.generate_ids("post", "id");
        remote.set_next_id("post", 241);

        let response = remote
            .call(RpcRequest::with_parameter(
                "post/create",
                "title",
                Value::from("hello"),
            ))
            .unwrap();
        assert_eq!(response.body(), Some(&Value::Int(241)));
        assert_eq!(
            remote.row_where("post", "id", &Value::Int(241)).unwrap()["title"],
            Value::from("hello")
        );
    }

    #[test]
    fn patch_merges_into_matching_rows() {
        let remote = FakeRemote::new();
        remote.seed("user", row(&[("id", Value::from("u-1")), ("name", Value::from("Ada"))]));

        let mut parameters = Record::new();
        parameters.insert(
            "criteria".into(),
            Value::Map(row(&[("id", Value::from("u-1"))])),
        );
        parameters.insert(
            "patch".into(),
            Value::Map(row(&[("name", Value::from("Grace"))])),
        );
        remote.call(RpcRequest::new("user/patch", parameters)).unwrap();

        let updated = remote.row_where("user", "id", &Value::from("u-1")).unwrap();
        assert_eq!(updated.get("name"), Some(&Value::from("Grace")));
    }

    #[test]
    fn in_criteria_and_count() {
        let remote = FakeRemote::new();
        for id in 1..=4 {
            remote.seed("comment", row(&[("id", Value::Int(id))]));
        }

        let mut criteria = Record::new();
        criteria.insert(
            "id".into(),
            Value::Array(vec![Value::Int(1), Value::Int(3)]),
        );
        let mut parameters = Record::new();
        parameters.insert("criteria".into(), Value::Map(criteria));

        let response = remote
            .call(RpcRequest::new("comment/count", parameters))
            .unwrap();
        assert_eq!(response.body(), Some(&Value::Int(2)));
    }

    #[test]
    fn queued_fault_fails_one_call() {
        let remote = FakeRemote::new();
        remote.fail_next("user/find", 503, "unavailable");

        let failed = remote
            .call(RpcRequest::new("user/find", Record::new()))
            .unwrap();
        assert!(!failed.is_successful());

        let ok = remote
            .call(RpcRequest::new("user/find", Record::new()))
            .unwrap();
        assert!(ok.is_successful());
    }

    #[test]
    fn every_call_is_logged() {
        let remote = FakeRemote::new();
        remote.call(RpcRequest::new("user/find", Record::new())).unwrap();
        remote.call(RpcRequest::new("user/count", Record::new())).unwrap();
        assert_eq!(remote.calls(), vec!["user/find", "user/count"]);
        assert_eq!(remote.calls_to("user/find"), 1);
    }
}
