//! Name matching for bulk environment deletion.
//!
//! Generated resource names embed the environment token anywhere in the
//! name, so both predicates use case-sensitive substring matching.

/// Whether `name` belongs to the environment identified by `token`.
pub fn matches_environment(name: &str, token: &str) -> bool {
    !token.is_empty() && name.contains(token)
}

/// Substrings protecting matching names from deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    entries: Vec<String>,
}

impl Whitelist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(Into::into)
                .filter(|e: &String| !e.is_empty())
                .collect(),
        }
    }

    /// Parse a comma-separated list (`a,b`).
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim))
    }

    pub fn protects(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| name.contains(entry.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_substring_match() {
        assert!(matches_environment("foo.env1.example.com", "env1"));
        assert!(matches_environment("env10-db.example.com", "env1"));
        assert!(!matches_environment("foo.env2.example.com", "env1"));
        assert!(!matches_environment("foo.env1.example.com", ""));
    }

    #[test]
    fn test_whitelist_protects_by_substring() {
        let whitelist = Whitelist::parse("db, keep");
        assert!(whitelist.protects("db01.env1.example.com"));
        assert!(whitelist.protects("keepalive.env1.example.com"));
        assert!(!whitelist.protects("web01.env1.example.com"));
    }

    #[test]
    fn test_whitelist_is_case_sensitive() {
        let whitelist = Whitelist::parse("DB");
        assert!(!whitelist.protects("db01.env1.example.com"));
    }

    #[test]
    fn test_empty_entries_protect_nothing() {
        let whitelist = Whitelist::parse(",,");
        assert!(whitelist.is_empty());
        assert!(!whitelist.protects("anything"));
    }
}
