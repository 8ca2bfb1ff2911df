//! In-memory stand-ins for the inventory, DNS and command runner seams.

use async_trait::async_trait;
use serde_json::{Map, Value};
use stackconf_core::dns::{DnsRecordIntent, DnsService, RecordSet, Zone};
use stackconf_core::inventory::Inventory;
use stackconf_core::process::{
    CommandRunner, LogLine, LogStream, ProcessOutput, ProcessSpec, ProcessStatus,
};
use stackconf_core::resource::record_id;
use stackconf_core::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub path: String,
    pub body: Value,
}

pub struct MockInventory {
    records: Mutex<BTreeMap<String, Vec<Value>>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<&'static str, usize>>,
    failing_terms: Mutex<HashSet<String>>,
    next_id: AtomicU64,
}

impl MockInventory {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            failing_terms: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(100),
        }
    }

    pub fn with(self, collection: &str, record: Value) -> Self {
        self.records
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(record);
        self
    }

    /// Make the next `count` calls of `method` fail.
    pub fn fail_next(&self, method: &'static str, count: usize) {
        self.failures.lock().unwrap().insert(method, count);
    }

    /// Make substring searches for `term` fail.
    pub fn fail_search(&self, term: &str) {
        self.failing_terms.lock().unwrap().insert(term.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, method: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c.method, "post" | "put" | "delete"))
            .collect()
    }

    pub fn records(&self, collection: &str) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, method: &'static str, path: &str, body: &Value) {
        self.calls.lock().unwrap().push(Call {
            method,
            path: path.to_string(),
            body: body.clone(),
        });
    }

    fn take_failure(&self, method: &'static str) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(method) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    fn name_of(record: &Value) -> Option<&str> {
        record.get("name").and_then(Value::as_str)
    }
}

fn split_path(path: &str) -> (&str, &str) {
    path.split_once('/').unwrap_or((path, ""))
}

#[async_trait]
impl Inventory for MockInventory {
    async fn search(&self, collection: &str, name: &str) -> Result<Option<Value>> {
        self.record("search", collection, &Value::String(name.to_string()));
        if self.take_failure("search") {
            return Err(Error::Remote("search failed".to_string()));
        }
        Ok(self.records(collection).into_iter().find(|r| {
            Self::name_of(r) == Some(name)
                || r.get("title").and_then(Value::as_str) == Some(name)
        }))
    }

    async fn search_any(&self, collection: &str, term: &str) -> Result<Vec<Value>> {
        self.record("search_any", collection, &Value::String(term.to_string()));
        if self.failing_terms.lock().unwrap().contains(term) {
            return Err(Error::Remote(format!("search for {} failed", term)));
        }
        Ok(self
            .records(collection)
            .into_iter()
            .filter(|r| Self::name_of(r).is_some_and(|n| n.contains(term)))
            .collect())
    }

    async fn post(&self, collection: &str, body: &Value) -> Result<Value> {
        self.record("post", collection, body);
        if self.take_failure("post") {
            return Err(Error::Remote("post failed".to_string()));
        }
        // Unwrap `{"host": {...}}` style bodies
        let mut record = match body.as_object() {
            Some(map) if map.len() == 1 => map.values().next().cloned().unwrap_or_default(),
            _ => body.clone(),
        };
        if !record.is_object() {
            record = Value::Object(Map::new());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        record["id"] = Value::from(id);
        self.records
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.record("put", path, body);
        if self.take_failure("put") {
            return Err(Error::Remote("put failed".to_string()));
        }
        let (_, id) = split_path(path);
        Ok(serde_json::json!({ "id": id }))
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        self.record("delete", path, &Value::Null);
        if self.take_failure("delete") {
            return Err(Error::Remote("delete failed".to_string()));
        }
        let (collection, id) = split_path(path);
        if let Some(records) = self.records.lock().unwrap().get_mut(collection) {
            records.retain(|r| record_id(r).ok().as_deref() != Some(id));
        }
        Ok(Value::Null)
    }
}

#[derive(Default)]
pub struct MockDns {
    zones: Mutex<Vec<Zone>>,
    upserts: Mutex<Vec<DnsRecordIntent>>,
    deleted_records: Mutex<Vec<(String, String, String)>>,
    deleted_zones: Mutex<Vec<String>>,
}

impl MockDns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zone holding `(name, type)` record sets.
    pub fn with_zone(self, id: &str, rrsets: &[(&str, &str)]) -> Self {
        self.zones.lock().unwrap().push(Zone {
            id: id.to_string(),
            name: id.to_string(),
            rrsets: rrsets
                .iter()
                .map(|(name, record_type)| RecordSet {
                    name: name.to_string(),
                    record_type: record_type.to_string(),
                })
                .collect(),
        });
        self
    }

    pub fn upserts(&self) -> Vec<DnsRecordIntent> {
        self.upserts.lock().unwrap().clone()
    }

    /// Deleted records as `(zone, type, owner)`.
    pub fn deleted_records(&self) -> Vec<(String, String, String)> {
        self.deleted_records.lock().unwrap().clone()
    }

    pub fn deleted_zones(&self) -> Vec<String> {
        self.deleted_zones.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.upserts().len() + self.deleted_records().len() + self.deleted_zones().len()
    }
}

#[async_trait]
impl DnsService for MockDns {
    async fn get_zone(&self, zone: &str) -> Result<Zone> {
        let wanted = zone.trim_end_matches('.');
        self.zones
            .lock()
            .unwrap()
            .iter()
            .find(|z| z.id.trim_end_matches('.') == wanted)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("zone {}", zone)))
    }

    async fn list_zones(&self) -> Result<Vec<Zone>> {
        Ok(self.zones.lock().unwrap().clone())
    }

    async fn upsert_record(&self, record: &DnsRecordIntent) -> Result<()> {
        self.upserts.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn delete_record(&self, zone: &str, record_type: &str, owner: &str) -> Result<()> {
        self.deleted_records.lock().unwrap().push((
            zone.to_string(),
            record_type.to_string(),
            owner.to_string(),
        ));
        Ok(())
    }

    async fn delete_zone(&self, zone_id: &str) -> Result<()> {
        self.deleted_zones.lock().unwrap().push(zone_id.to_string());
        Ok(())
    }
}

/// Replays scripted outputs for commands whose command line contains
/// `matcher`; every other command exits 0 silently.
pub struct ScriptedRunner {
    matcher: String,
    script: Mutex<VecDeque<ProcessOutput>>,
    specs: Mutex<Vec<ProcessSpec>>,
}

impl ScriptedRunner {
    pub fn new(matcher: &str, outputs: Vec<ProcessOutput>) -> Self {
        Self {
            matcher: matcher.to_string(),
            script: Mutex::new(outputs.into()),
            specs: Mutex::new(Vec::new()),
        }
    }

    pub fn specs(&self) -> Vec<ProcessSpec> {
        self.specs.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.specs().iter().map(ProcessSpec::display).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: ProcessSpec) -> Result<ProcessOutput> {
        let scripted = spec.display().contains(&self.matcher);
        self.specs.lock().unwrap().push(spec);
        let next = if scripted {
            self.script.lock().unwrap().pop_front()
        } else {
            None
        };
        Ok(next.unwrap_or_else(|| exited(0, &[])))
    }
}

pub fn exited(code: i32, stderr: &[&str]) -> ProcessOutput {
    ProcessOutput {
        status: ProcessStatus::Exited(Some(code)),
        lines: stderr
            .iter()
            .map(|l| LogLine::new(LogStream::Stderr, *l))
            .collect(),
        elapsed: Duration::from_secs(12),
    }
}

pub fn timed_out() -> ProcessOutput {
    ProcessOutput {
        status: ProcessStatus::TimedOut,
        lines: Vec::new(),
        elapsed: Duration::from_secs(1800),
    }
}
