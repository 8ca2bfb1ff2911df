//! Host metadata: the merged configuration tree.
//!
//! Precedence, lowest first: config file and environment variables, Facter
//! facts (`puppetfacter`), OpenStack instance metadata (`openstackmeta`),
//! then the override block selected by `stackenv`.

use serde_json::{Map, Value};
use tracing::debug;

/// Namespace key for Facter facts.
pub const FACTS_KEY: &str = "puppetfacter";

/// Namespace key for OpenStack instance metadata.
pub const INSTANCE_META_KEY: &str = "openstackmeta";

/// Highest index probed by [`HostMetadata::indexed_list`].
const MAX_LIST_INDEX: usize = 99;

#[derive(Debug, Clone, PartialEq)]
pub struct HostMetadata {
    tree: Value,
}

impl Default for HostMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMetadata {
    pub fn new() -> Self {
        Self {
            tree: Value::Object(Map::new()),
        }
    }

    /// Wrap an existing tree; non-object values become an empty tree.
    pub fn from_value(tree: Value) -> Self {
        match tree {
            Value::Object(_) => Self { tree },
            _ => Self::new(),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.tree
    }

    /// Deep-merge `other` over the tree.
    pub fn merge(&mut self, other: Value) {
        deep_merge(&mut self.tree, other);
    }

    /// Merge a source under its namespace key.
    pub fn merge_source(&mut self, namespace: &str, value: Value) {
        let mut wrapper = Map::new();
        wrapper.insert(namespace.to_string(), value);
        self.merge(Value::Object(wrapper));
    }

    /// Set a value at a dotted path, creating intermediate objects.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        set_in(&mut self.tree, &segments, value);
    }

    /// Value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.tree, |node, segment| node.get(segment))
    }

    /// Scalar at a dotted path rendered as a string; empty strings count as missing.
    pub fn get_str(&self, path: &str) -> Option<String> {
        self.get(path)
            .and_then(scalar_to_string)
            .filter(|s| !s.is_empty())
    }

    /// Apply dotted keys from the instance metadata `meta` map as overrides.
    pub fn apply_instance_overrides(&mut self) {
        let overrides: Vec<(String, Value)> = match self
            .get(&format!("{}.meta", INSTANCE_META_KEY))
            .and_then(Value::as_object)
        {
            Some(meta) => meta
                .iter()
                .filter(|(k, _)| k.contains('.'))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => return,
        };
        for (path, value) in overrides {
            debug!(key = %path, "Applying instance metadata override");
            self.set_path(&path, value);
        }
    }

    /// Merge the `stackenvs.<stackenv>` block over the whole tree.
    pub fn apply_stackenv(&mut self) {
        let Some(env) = self.get_str("stackenv") else {
            return;
        };
        let Some(block) = self.get("stackenvs").and_then(|s| s.get(&env)).cloned() else {
            debug!(stackenv = %env, "No override block for stackenv");
            return;
        };
        debug!(stackenv = %env, "Applying stackenv override block");
        self.merge(block);
    }

    /// Concatenate the lists at `key`, `key1` .. `key99`.
    ///
    /// A single scalar or map counts as a one-entry list.
    pub fn indexed_list(&self, key: &str) -> Vec<Value> {
        let mut items = Vec::new();
        for index in 0..=MAX_LIST_INDEX {
            let lookup = if index == 0 {
                key.to_string()
            } else {
                format!("{}{}", key, index)
            };
            match self.get(&lookup) {
                Some(Value::Array(values)) => items.extend(values.iter().cloned()),
                Some(Value::Null) | None => {}
                Some(single) => {
                    debug!(key = %lookup, "Single record, treating as one-entry list");
                    items.push(single.clone());
                }
            }
        }
        items
    }
}

/// Render a scalar JSON value as a string.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn set_in(node: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        set_in(child, rest, value);
    }
}

fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
