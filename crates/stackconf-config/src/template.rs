//! Template expansion against host metadata.
//!
//! Supports references like:
//! - `{{ openstackmeta.name }}` - any scalar in the metadata tree
//! - `{{ .puppetfacter.networking.ip }}` - a leading dot is accepted
//! - `{{ fqdn }}`, `{{ hostname }}`, `{{ domain }}`, `{{ ip }}` - locals set by the pipeline

use crate::HostMetadata;
use crate::metadata::scalar_to_string;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

// A reference path: dotted segments of word characters and dashes
static PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.?([A-Za-z0-9_][A-Za-z0-9_\-]*(?:\.[A-Za-z0-9_\-]+)*)$").unwrap()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated reference in '{0}'")]
    Unterminated(String),

    #[error("malformed reference '{{{{ {0} }}}}'")]
    Malformed(String),

    #[error("unresolved reference '{0}'")]
    Unresolved(String),

    #[error("reference '{0}' is not a scalar")]
    NotScalar(String),
}

/// Context for template expansion.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    metadata: &'a HostMetadata,
    locals: HashMap<String, String>,
}

impl<'a> TemplateContext<'a> {
    pub fn new(metadata: &'a HostMetadata) -> Self {
        Self {
            metadata,
            locals: HashMap::new(),
        }
    }

    /// Add a local variable, checked before the metadata tree.
    pub fn with_local(mut self, name: &str, value: impl Into<String>) -> Self {
        self.locals.insert(name.to_string(), value.into());
        self
    }

    /// Resolve a reference path to its value.
    pub fn resolve(&self, path: &str) -> Result<String, TemplateError> {
        if let Some(local) = self.locals.get(path) {
            return Ok(local.clone());
        }
        match self.metadata.get(path) {
            None | Some(Value::Null) => Err(TemplateError::Unresolved(path.to_string())),
            Some(value) => {
                scalar_to_string(value).ok_or_else(|| TemplateError::NotScalar(path.to_string()))
            }
        }
    }

    /// Expand all references in a string.
    pub fn render(&self, input: &str) -> Result<String, TemplateError> {
        let mut output = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or_else(|| TemplateError::Unterminated(input.to_string()))?;
            let expr = after_open[..end].trim();
            let caps = PATH_REGEX
                .captures(expr)
                .ok_or_else(|| TemplateError::Malformed(expr.to_string()))?;
            output.push_str(&self.resolve(&caps[1])?);
            rest = &after_open[end + 2..];
        }

        output.push_str(rest);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> HostMetadata {
        HostMetadata::from_value(json!({
            "openstackmeta": { "name": "web1.example.com", "meta": { "stack": "blue" } },
            "puppetfacter": { "networking": { "ip": "10.0.0.5" }, "processors": { "count": 4 } }
        }))
    }

    #[test]
    fn test_basic_expansion() {
        let meta = metadata();
        let ctx = TemplateContext::new(&meta);
        assert_eq!(
            ctx.render("{{ openstackmeta.name }} at {{.puppetfacter.networking.ip}}").unwrap(),
            "web1.example.com at 10.0.0.5"
        );
    }

    #[test]
    fn test_numbers_render() {
        let meta = metadata();
        let ctx = TemplateContext::new(&meta);
        assert_eq!(ctx.render("cpus={{ puppetfacter.processors.count }}").unwrap(), "cpus=4");
    }

    #[test]
    fn test_locals_take_precedence() {
        let meta = metadata();
        let ctx = TemplateContext::new(&meta)
            .with_local("hostname", "web1")
            .with_local("domain", "example.com");
        assert_eq!(
            ctx.render("{{ hostname }}-{{ openstackmeta.meta.stack }}.{{ domain }}").unwrap(),
            "web1-blue.example.com"
        );
    }

    #[test]
    fn test_unresolved_reference_errors() {
        let meta = metadata();
        let ctx = TemplateContext::new(&meta);
        assert_eq!(
            ctx.render("{{ openstackmeta.missing }}"),
            Err(TemplateError::Unresolved("openstackmeta.missing".to_string()))
        );
    }

    #[test]
    fn test_non_scalar_errors() {
        let meta = metadata();
        let ctx = TemplateContext::new(&meta);
        assert_eq!(
            ctx.render("{{ openstackmeta.meta }}"),
            Err(TemplateError::NotScalar("openstackmeta.meta".to_string()))
        );
    }

    #[test]
    fn test_unterminated_and_malformed() {
        let meta = metadata();
        let ctx = TemplateContext::new(&meta);
        assert!(matches!(
            ctx.render("web-{{ hostname"),
            Err(TemplateError::Unterminated(_))
        ));
        assert!(matches!(
            ctx.render("{{ index .x 1 }}"),
            Err(TemplateError::Malformed(_))
        ));
    }

    #[test]
    fn test_plain_text_untouched() {
        let meta = metadata();
        let ctx = TemplateContext::new(&meta);
        assert_eq!(ctx.render(r#"{"a": "b"}"#).unwrap(), r#"{"a": "b"}"#);
    }
}
