//! Where migration definitions come from.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::definition::{MigrationDefinition, MigrationKey, RawDefinition};
use crate::error::{MigrationError, Result};

static FILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{14}-[A-Za-z0-9_-]+\.sql$").unwrap());

/// Supplies raw definitions from some storage location.
pub trait DefinitionProvider {
    /// Human-readable location, used in error messages.
    fn location(&self) -> String;

    /// Every raw definition available, in any order.
    fn provide(&self) -> Result<Vec<RawDefinition>>;
}

/// Reads `*.sql` definitions from a directory.
///
/// Only files named `YYYYMMDDHHMMSS-label.sql` are considered; anything else
/// in the directory is ignored.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    dir: PathBuf,
}

impl DirectoryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn unavailable(&self, source: std::io::Error) -> MigrationError {
        MigrationError::SourceUnavailable {
            location: self.location(),
            source,
        }
    }
}

impl DefinitionProvider for DirectoryProvider {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn provide(&self) -> Result<Vec<RawDefinition>> {
        let mut raws = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| self.unavailable(e))? {
            let entry = entry.map_err(|e| self.unavailable(e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !FILE_PATTERN.is_match(&name) {
                continue;
            }
            // metadata() follows symlinks
            if !fs::metadata(entry.path())
                .map_err(|e| self.unavailable(e))?
                .is_file()
            {
                continue;
            }
            let content = fs::read_to_string(entry.path()).map_err(|e| {
                MigrationError::SourceUnavailable {
                    location: entry.path().display().to_string(),
                    source: e,
                }
            })?;
            raws.push(RawDefinition { name, content });
        }
        Ok(raws)
    }
}

/// Definitions held in memory, e.g. compiled in with `include_str!`.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    definitions: Vec<RawDefinition>,
}

impl StaticProvider {
    pub fn new(definitions: Vec<RawDefinition>) -> Self {
        Self { definitions }
    }

    pub fn push(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.definitions.push(RawDefinition::new(name, content));
    }
}

impl DefinitionProvider for StaticProvider {
    fn location(&self) -> String {
        "<static>".to_string()
    }

    fn provide(&self) -> Result<Vec<RawDefinition>> {
        Ok(self.definitions.clone())
    }
}

/// Ordered, validated view over a provider.
#[derive(Debug, Clone)]
pub struct MigrationSource<P> {
    provider: P,
}

impl<P: DefinitionProvider> MigrationSource<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn location(&self) -> String {
        self.provider.location()
    }

    /// All definitions in canonical order.
    ///
    /// Every definition is parsed before this returns, so one malformed file
    /// fails the whole listing.
    pub fn list(&self) -> Result<Vec<MigrationDefinition>> {
        let mut keyed = self
            .provider
            .provide()?
            .into_iter()
            .map(|raw| Ok((raw.name.parse::<MigrationKey>()?, raw)))
            .collect::<Result<Vec<_>>>()?;
        keyed.sort_by(|(a, _), (b, _)| a.cmp(b));

        for pair in keyed.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(MigrationError::DuplicateName {
                    name: pair[1].1.name.clone(),
                });
            }
        }

        let definitions = keyed
            .iter()
            .map(|(_, raw)| MigrationDefinition::from_raw(raw))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            location = %self.provider.location(),
            count = definitions.len(),
            "listed migration definitions"
        );
        Ok(definitions)
    }
}
