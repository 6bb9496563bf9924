//! Migration definitions and their ordering key.
//!
//! A definition file holds the forward (up) SQL, then [`SEPARATOR`], then the
//! backward (down) SQL. Names look like `20240101000000-init.sql`; the
//! 14-digit UTC timestamp prefix fixes the canonical order.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MalformedReason, MigrationError, Result};

/// Splits a definition into its forward and backward halves.
pub const SEPARATOR: &str =
    "\n--\n-- UNDO (DOWN) migration is below this line:\n-- (do not change this block!)\n--\n";

/// File extension of definitions on disk.
pub const EXTENSION: &str = ".sql";

/// Width of the timestamp prefix.
pub const TIMESTAMP_WIDTH: usize = 14;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{14})-([A-Za-z0-9_-]+)(?:\.sql)?$").unwrap());

static COMMENT_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^--[^\n]*$").unwrap());

/// Ordering key of a migration.
///
/// Orders exactly like the canonical file names compare as strings: the
/// timestamp first, then the label with its `.sql` suffix, so `x-y.sql` sorts
/// before `x.sql`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationKey {
    timestamp: u64,
    label: String,
}

impl MigrationKey {
    /// Build a key from a creation time and an already sanitised label.
    pub fn new(created: NaiveDateTime, label: &str) -> Option<Self> {
        let stamp = created.format(TIMESTAMP_FORMAT).to_string();
        format!("{stamp}-{label}").parse().ok()
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The creation time encoded in the prefix, if it is a real date.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.stamp(), TIMESTAMP_FORMAT).ok()
    }

    /// `<timestamp>-<label>.sql`
    pub fn file_name(&self) -> String {
        format!("{self}{EXTENSION}")
    }

    fn stamp(&self) -> String {
        format!("{:0width$}", self.timestamp, width = TIMESTAMP_WIDTH)
    }
}

impl Ord for MigrationKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| {
                let ours = self.label.bytes().chain(EXTENSION.bytes());
                ours.cmp(other.label.bytes().chain(EXTENSION.bytes()))
            })
    }
}

impl PartialOrd for MigrationKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MigrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.stamp(), self.label)
    }
}

impl FromStr for MigrationKey {
    type Err = MigrationError;

    fn from_str(name: &str) -> Result<Self> {
        let invalid = || MigrationError::MalformedDefinition {
            name: name.to_string(),
            reason: MalformedReason::InvalidName,
        };
        let caps = NAME_PATTERN.captures(name).ok_or_else(invalid)?;
        let timestamp = caps[1].parse().map_err(|_| invalid())?;
        Ok(Self {
            timestamp,
            label: caps[2].to_string(),
        })
    }
}

/// Unparsed definition as handed over by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDefinition {
    pub name: String,
    pub content: String,
}

impl RawDefinition {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A validated migration: name, ordering key and both effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDefinition {
    name: String,
    key: MigrationKey,
    forward: String,
    backward: String,
}

impl MigrationDefinition {
    /// Validate a definition's name and split its content into effects.
    pub fn parse(name: &str, content: &str) -> Result<Self> {
        let key: MigrationKey = name.parse()?;
        let (forward, backward) = split_effects(name, content)?;
        Ok(Self {
            name: name.to_string(),
            key,
            forward,
            backward,
        })
    }

    pub fn from_raw(raw: &RawDefinition) -> Result<Self> {
        Self::parse(&raw.name, &raw.content)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &MigrationKey {
        &self.key
    }

    /// SQL run when migrating up, comments stripped.
    pub fn forward(&self) -> &str {
        &self.forward
    }

    /// SQL run when migrating down, comments stripped.
    pub fn backward(&self) -> &str {
        &self.backward
    }
}

fn split_effects(name: &str, content: &str) -> Result<(String, String)> {
    let malformed = |reason| MigrationError::MalformedDefinition {
        name: name.to_string(),
        reason,
    };

    let content = content.replace("\r\n", "\n");
    if !content.contains(SEPARATOR) {
        return Err(malformed(MalformedReason::MissingSeparator));
    }

    let parts: Vec<&str> = content.split(SEPARATOR).collect();
    if parts.len() != 2 {
        return Err(malformed(MalformedReason::SeparatorCount(parts.len())));
    }

    let forward = clean_sql(parts[0]);
    if forward.is_empty() {
        return Err(malformed(MalformedReason::EmptyForward));
    }
    let backward = clean_sql(parts[1]);
    if backward.is_empty() {
        return Err(malformed(MalformedReason::EmptyBackward));
    }

    Ok((forward, backward))
}

/// Drop `--` comment lines and surrounding whitespace.
fn clean_sql(sql: &str) -> String {
    COMMENT_LINE.replace_all(sql, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(forward: &str, backward: &str) -> String {
        format!("--\n--   demo\n--\n{forward}\n{SEPARATOR}{backward}\n")
    }

    #[test]
    fn key_orders_by_timestamp_then_label() {
        let a: MigrationKey = "20240101000000-init".parse().unwrap();
        let b: MigrationKey = "20240101000000-users.sql".parse().unwrap();
        let c: MigrationKey = "20240102000000-addcol".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.timestamp(), 20240101000000);
        assert_eq!(b.label(), "users");
    }

    #[test]
    fn key_order_matches_file_name_order() {
        let mut names = vec![
            "20240101000000-add.sql",
            "20240101000000-add-index.sql",
            "20240101000000-add_x.sql",
            "20231231000000-zzz.sql",
        ];
        let mut keys: Vec<MigrationKey> = names.iter().map(|n| n.parse().unwrap()).collect();
        keys.sort();
        names.sort();

        let from_keys: Vec<_> = keys.iter().map(MigrationKey::file_name).collect();
        assert_eq!(from_keys, names);

        let bare: MigrationKey = "20240101000000-add-index".parse().unwrap();
        let add: MigrationKey = "20240101000000-add".parse().unwrap();
        assert!(bare < add);
    }

    #[test]
    fn key_rejects_bad_names() {
        for name in [
            "2024010100000-short",
            "20240101000000-",
            "20240101000000_init",
            "20240101000000-has space",
            "init.sql",
            "20240101000000-init.txt",
        ] {
            let err = name.parse::<MigrationKey>().unwrap_err();
            assert!(
                matches!(
                    err,
                    MigrationError::MalformedDefinition {
                        reason: MalformedReason::InvalidName,
                        ..
                    }
                ),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn key_round_trips_through_display() {
        let created =
            NaiveDateTime::parse_from_str("20240305071502", TIMESTAMP_FORMAT).unwrap();
        let key = MigrationKey::new(created, "add_index").unwrap();
        assert_eq!(key.to_string(), "20240305071502-add_index");
        assert_eq!(key.file_name(), "20240305071502-add_index.sql");
        assert_eq!(key.created_at(), Some(created));
    }

    #[test]
    fn parse_splits_and_strips_comments() {
        let content = file(
            "-- forward\nCREATE TABLE t (id INTEGER);",
            "-- backward\nDROP TABLE t;",
        );
        let def = MigrationDefinition::parse("20240101000000-init.sql", &content).unwrap();
        assert_eq!(def.name(), "20240101000000-init.sql");
        assert_eq!(def.forward(), "CREATE TABLE t (id INTEGER);");
        assert_eq!(def.backward(), "DROP TABLE t;");
    }

    #[test]
    fn parse_keeps_indented_comments() {
        let content = file("SELECT 1;\n  -- still sql", "SELECT 2;");
        let def = MigrationDefinition::parse("20240101000000-init", &content).unwrap();
        assert_eq!(def.forward(), "SELECT 1;\n  -- still sql");
    }

    #[test]
    fn parse_accepts_crlf() {
        let content = file("SELECT 1;", "SELECT 2;").replace('\n', "\r\n");
        let def = MigrationDefinition::parse("20240101000000-init", &content).unwrap();
        assert_eq!(def.forward(), "SELECT 1;");
        assert_eq!(def.backward(), "SELECT 2;");
    }

    #[test]
    fn parse_requires_separator() {
        let err = MigrationDefinition::parse("20240101000000-init", "CREATE TABLE t (id INT);")
            .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::MalformedDefinition {
                reason: MalformedReason::MissingSeparator,
                ..
            }
        ));
    }

    #[test]
    fn parse_rejects_repeated_separator() {
        let content = format!("SELECT 1;{SEPARATOR}SELECT 2;{SEPARATOR}SELECT 3;");
        let err = MigrationDefinition::parse("20240101000000-init", &content).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::MalformedDefinition {
                reason: MalformedReason::SeparatorCount(3),
                ..
            }
        ));
    }

    #[test]
    fn parse_rejects_comment_only_halves() {
        let err = MigrationDefinition::parse(
            "20240101000000-init",
            &file("-- TODO", "DROP TABLE t;"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::MalformedDefinition {
                reason: MalformedReason::EmptyForward,
                ..
            }
        ));

        let err = MigrationDefinition::parse(
            "20240101000000-init",
            &file("CREATE TABLE t (id INT);", "\n-- nothing\n   \n"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::MalformedDefinition {
                reason: MalformedReason::EmptyBackward,
                ..
            }
        ));
    }
}
