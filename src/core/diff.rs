//! Diff accumulation: partitions reconciled rows into update, create and
//! no-op buckets and collects the placeholder labels they depend on.

use crate::core::inventory::{Inventory, PendingLabel};
use crate::core::reconcile::Reconciled;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// The fields to send for one object. Only changed fields are present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub href: Option<String>,
    /// Collection a create is POSTed to when it differs per row
    /// (a rule's ruleset, for example).
    pub parent: Option<String>,
    pub fields: Map<String, Value>,
}

impl Patch {
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Body for a single-object PUT or POST.
    pub fn body(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Body for a bulk call, which identifies objects by `href` in-line.
    pub fn bulk_body(&self) -> Value {
        let mut fields = self.fields.clone();
        if let Some(href) = &self.href {
            fields.insert("href".into(), Value::String(href.clone()));
        }
        Value::Object(fields)
    }

    /// Replace every string equal to a placeholder with its real href.
    pub fn substitute_hrefs(&mut self, real: &HashMap<String, String>) {
        for value in self.fields.values_mut() {
            substitute(value, real);
        }
    }
}

fn substitute(value: &mut Value, real: &HashMap<String, String>) {
    match value {
        Value::String(s) => {
            if let Some(href) = real.get(s.as_str()) {
                *s = href.clone();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute(v, real)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute(v, real)),
        _ => {}
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    /// 1-based CSV line that produced the entry.
    pub line: usize,
    /// Human name of the object for summaries and logs.
    pub target: String,
    pub patch: Patch,
    pub changed: bool,
}

impl DiffEntry {
    pub fn new(line: usize, target: impl Into<String>, href: Option<String>) -> Self {
        Self {
            line,
            target: target.into(),
            patch: Patch {
                href,
                ..Patch::default()
            },
            changed: false,
        }
    }

    pub fn href(&self) -> Option<&str> {
        self.patch.href.as_deref()
    }

    /// Record `field` in the patch when it changed.
    pub fn track<T: Into<Value>>(&mut self, field: &str, reconciled: Reconciled<T>) {
        if reconciled.changed {
            self.changed = true;
            self.patch.set(field, reconciled.value);
        }
    }

    /// Like [`track`](Self::track) for optional strings: a cleared value is
    /// sent as `""`.
    pub fn track_string(&mut self, field: &str, reconciled: Reconciled<Option<String>>) {
        self.track(
            field,
            Reconciled {
                changed: reconciled.changed,
                value: reconciled.value.unwrap_or_default(),
            },
        );
    }

    /// Names of the fields this entry will send.
    pub fn changed_fields(&self) -> Vec<&str> {
        self.patch.fields.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    pub unchanged: usize,
    pub skipped: usize,
    pub updates: Vec<DiffEntry>,
    pub creates: Vec<DiffEntry>,
    pub new_labels: Vec<PendingLabel>,
}

impl Diff {
    /// Existing object with a change ⇒ update; existing without ⇒ unchanged;
    /// no href ⇒ create when allowed, otherwise skipped.
    pub fn record(&mut self, entry: DiffEntry, allow_create: bool) {
        match (entry.href(), entry.changed) {
            (Some(_), true) => {
                debug!(line = entry.line, target = %entry.target, fields = ?entry.changed_fields(), "queued update");
                self.updates.push(entry);
            }
            (Some(_), false) => self.unchanged += 1,
            (None, _) if allow_create => {
                debug!(line = entry.line, target = %entry.target, "queued create");
                self.creates.push(entry);
            }
            (None, _) => {
                warn!(line = entry.line, target = %entry.target, "no matching object and creation is disabled; skipping row");
                self.skipped += 1;
            }
        }
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    /// Collect the placeholder labels queued entries depend on.
    pub fn finish(mut self, inv: &Inventory) -> Self {
        self.new_labels = inv.pending_labels();
        self
    }

    pub fn has_work(&self) -> bool {
        !self.updates.is_empty() || !self.creates.is_empty()
    }
}
