//! New migration files.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use stepwise_migrate::{MigrationKey, SEPARATOR};

static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// Join `words` with `-` and drop everything outside `[A-Za-z0-9_-]`.
///
/// `None` when nothing is left.
pub fn sanitize(words: &[String]) -> Option<String> {
    let joined = words.join("-");
    let cleaned = DISALLOWED.replace_all(joined.trim(), "").into_owned();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// `YYYYMMDDHHMMSS-<label>.sql` for the given UTC instant.
pub fn file_name(label: &str, now: DateTime<Utc>) -> Option<String> {
    MigrationKey::new(now.naive_utc(), label).map(|key| key.file_name())
}

/// Body of a new migration: a header, an empty forward section and the
/// separator marker.
pub fn render(label: &str, now: DateTime<Utc>) -> String {
    let created = now.format("%A, %d-%b-%y %H:%M:%S UTC");
    format!(
        "--\n--   {label}\n--\n-- created: {created}\n--\n\
         -- FORWARD (UP) migration is below this line:\n--\n\n\n{SEPARATOR}\n\n"
    )
}

/// Write a new migration into `dir`. Never overwrites an existing file.
pub fn write_new(dir: &Path, words: &[String], now: DateTime<Utc>) -> anyhow::Result<PathBuf> {
    let Some(label) = sanitize(words) else {
        bail!("migration name is empty after removing characters outside [A-Za-z0-9_-]");
    };
    let Some(name) = file_name(&label, now) else {
        bail!("cannot derive a migration file name from {label:?}");
    };
    let path = dir.join(name);

    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            bail!("migration file already exists: {}", path.display())
        }
        Err(e) => return Err(e).with_context(|| format!("cannot create {}", path.display())),
    };
    file.write_all(render(&label, now).as_bytes())
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}
