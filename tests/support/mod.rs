//! In-memory PCE used by the integration tests.

#![allow(dead_code)]

use pcectl::core::api::PceApi;
use pcectl::core::apply::Prompt;
use pcectl::core::error::PceResult;
use serde_json::{Value, json};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub path: String,
    pub body: Value,
}

/// Collections are keyed by path and ignore query parameters. Every POST
/// and PUT is recorded in order.
#[derive(Default)]
pub struct FakePce {
    collections: RefCell<HashMap<String, Vec<Value>>>,
    calls: RefCell<Vec<Call>>,
    next_id: Cell<u32>,
}

impl FakePce {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(100),
            ..Self::default()
        }
    }

    pub fn with(self, path: &str, items: Vec<Value>) -> Self {
        self.collections.borrow_mut().insert(path.to_string(), items);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| format!("{} {}", c.method, c.path)).collect()
    }

    fn id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn record(&self, method: &'static str, path: &str, body: &Value) {
        self.calls.borrow_mut().push(Call {
            method,
            path: path.to_string(),
            body: body.clone(),
        });
    }
}

impl PceApi for FakePce {
    fn org(&self) -> u32 {
        1
    }

    fn get_collection(&self, path: &str, _query: &[(String, String)]) -> PceResult<Vec<Value>> {
        Ok(self.collections.borrow().get(path).cloned().unwrap_or_default())
    }

    fn post(&self, path: &str, body: &Value) -> PceResult<Value> {
        self.record("POST", path, body);
        let id = self.id();
        if path == "/orgs/1/labels" {
            let label = json!({
                "href": format!("/orgs/1/labels/{}", id),
                "key": body["key"],
                "value": body["value"],
            });
            self.collections
                .borrow_mut()
                .entry(path.to_string())
                .or_default()
                .push(label.clone());
            return Ok(label);
        }
        Ok(json!({ "href": format!("{}/{}", path, id) }))
    }

    fn put(&self, path: &str, body: &Value) -> PceResult<Value> {
        self.record("PUT", path, body);
        if path.ends_with("/workloads/bulk_update") || path.ends_with("/workloads/bulk_create") {
            let creating = path.ends_with("bulk_create");
            let items = body.as_array().cloned().unwrap_or_default();
            let statuses = items
                .iter()
                .map(|item| {
                    if creating {
                        json!({ "href": format!("/orgs/1/workloads/{}", self.id()), "status": "created" })
                    } else {
                        json!({ "href": item["href"], "status": "updated" })
                    }
                })
                .collect();
            return Ok(Value::Array(statuses));
        }
        Ok(Value::Null)
    }
}

/// A confirmation prompt that must never be shown.
pub struct Untouchable;

impl Prompt for Untouchable {
    fn ask(&mut self, question: &str) -> PceResult<String> {
        panic!("unexpected prompt: {}", question);
    }
}

/// Answers every prompt with the same text.
pub struct Answer(pub &'static str);

impl Prompt for Answer {
    fn ask(&mut self, _question: &str) -> PceResult<String> {
        Ok(self.0.to_string())
    }
}

pub fn label(n: u32, key: &str, value: &str) -> Value {
    json!({ "href": format!("/orgs/1/labels/{}", n), "key": key, "value": value })
}

/// Write `lines` to `name` inside `dir`.
pub fn write_csv(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    path
}
