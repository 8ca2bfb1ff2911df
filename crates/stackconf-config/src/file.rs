//! Static config file parsing.
//!
//! The config file is KDL. It is converted into a JSON tree so it can be
//! merged with facts and instance metadata:
//!
//! ```kdl
//! foreman {
//!     config { host "https://foreman.example.com"; username "api"; password "secret" }
//!     host {
//!         hostgroup "acme/web"
//!         parameter { role "web"; tier "front" }
//!     }
//! }
//! dns {
//!     record {
//!         mycname "www" "api"
//!         mya { - "db"="10.0.0.9" }
//!     }
//! }
//! ```

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode, KdlValue};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the config file looked up in `$HOME` and `/etc`.
pub const CONFIG_FILE_NAME: &str = ".stackconf.kdl";

/// Prefix of environment variables mapped onto config keys.
pub const ENV_PREFIX: &str = "STACKCONF_";

/// Parse a config document from KDL text into a JSON object.
pub fn parse_config(kdl: &str) -> ConfigResult<Value> {
    let doc: KdlDocument = kdl.parse()?;
    Ok(Value::Object(document_to_map(&doc)?))
}

/// Read the config file.
///
/// An explicit path must exist. Without one, `$HOME/.stackconf.kdl` and then
/// `/etc/.stackconf.kdl` are tried; finding neither yields an empty tree.
pub fn load_config_file(explicit: Option<&Path>) -> ConfigResult<(Value, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)?;
        return Ok((parse_config(&content)?, Some(path.to_path_buf())));
    }

    let mut candidates = Vec::new();
    if let Ok(home) = std::env::var("HOME") {
        candidates.push(PathBuf::from(home).join(CONFIG_FILE_NAME));
    }
    candidates.push(PathBuf::from("/etc").join(CONFIG_FILE_NAME));

    for path in candidates {
        if path.is_file() {
            let content = std::fs::read_to_string(&path)?;
            return Ok((parse_config(&content)?, Some(path)));
        }
    }

    debug!("No config file found, continuing with an empty configuration");
    Ok((Value::Object(Map::new()), None))
}

/// Map `STACKCONF_FOREMAN__CONFIG__HOST=x` to `("foreman.config.host", "x")`.
pub fn env_overrides<I>(vars: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| {
            let rest = key.strip_prefix(ENV_PREFIX)?;
            if rest.is_empty() {
                return None;
            }
            let path = rest.to_lowercase().replace("__", ".");
            Some((path, Value::String(value)))
        })
        .collect()
}

fn document_to_map(doc: &KdlDocument) -> ConfigResult<Map<String, Value>> {
    let mut map = Map::new();
    for node in doc.nodes() {
        let key = node.name().value().to_string();
        let value = node_to_value(node)?;
        if is_repeated(doc, &key) {
            // Repeated sibling names collect into an array
            if let Value::Array(items) = map.entry(key).or_insert_with(|| Value::Array(Vec::new()))
            {
                items.push(value);
            }
        } else {
            map.insert(key, value);
        }
    }
    Ok(map)
}

fn is_repeated(doc: &KdlDocument, name: &str) -> bool {
    doc.nodes()
        .iter()
        .filter(|n| n.name().value() == name)
        .count()
        > 1
}

fn node_to_value(node: &KdlNode) -> ConfigResult<Value> {
    let args: Vec<Value> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| kdl_scalar(e.value()))
        .collect();
    let props: Vec<(String, Value)> = node
        .entries()
        .iter()
        .filter_map(|e| {
            e.name()
                .map(|n| (n.value().to_string(), kdl_scalar(e.value())))
        })
        .collect();

    let children = node.children().filter(|c| !c.nodes().is_empty());

    if props.is_empty() && children.is_none() {
        return Ok(match args.len() {
            0 => Value::Null,
            1 => args.into_iter().next().unwrap_or(Value::Null),
            _ => Value::Array(args),
        });
    }

    if !args.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: node.name().value().to_string(),
            message: "positional values cannot be mixed with properties or children".to_string(),
        });
    }

    if let Some(children) = children {
        if children.nodes().iter().all(|c| c.name().value() == "-") {
            if !props.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: node.name().value().to_string(),
                    message: "list nodes cannot carry properties".to_string(),
                });
            }
            let items = children
                .nodes()
                .iter()
                .map(node_to_value)
                .collect::<ConfigResult<Vec<_>>>()?;
            return Ok(Value::Array(items));
        }
    }

    let mut map = Map::new();
    for (key, value) in props {
        map.insert(key, value);
    }
    if let Some(children) = children {
        for (key, value) in document_to_map(children)? {
            map.insert(key, value);
        }
    }
    Ok(Value::Object(map))
}

fn kdl_scalar(value: &KdlValue) -> Value {
    if let Some(s) = value.as_string() {
        Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string()))
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if let Some(b) = value.as_bool() {
        Value::Bool(b)
    } else {
        Value::Null
    }
}
