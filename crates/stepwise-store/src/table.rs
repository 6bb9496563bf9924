use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use stepwise_migrate::StoreError;

/// Ledger table used when none is configured.
pub const DEFAULT_TABLE: &str = "_stepwise_ledger";

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// A ledger table name that is safe to splice into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: &str) -> Result<Self, StoreError> {
        if IDENTIFIER.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(StoreError::backend(format!(
                "invalid ledger table name {name:?}: use letters, digits and underscores"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self(DEFAULT_TABLE.to_string())
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_identifiers() {
        assert_eq!(TableName::new("schema_ledger").unwrap().as_str(), "schema_ledger");
        assert_eq!(TableName::default().as_str(), DEFAULT_TABLE);
    }

    #[test]
    fn rejects_injection() {
        for name in ["", "1abc", "ledger; DROP TABLE users", "a-b", "\"quoted\""] {
            assert!(TableName::new(name).is_err(), "{name:?}");
        }
    }
}
