//! Where the database connection comes from.
//!
//! Resolution order: the `--database-url` flag (or `STEPWISE_DATABASE_URL`),
//! then the `POSTGRESQL_*` variables, then `<dir>/connection-string.txt`.
//! Every function takes the environment as a lookup closure so nothing here
//! reads process state directly.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use stepwise_store::{AnyLedger, SqliteConfig, SqliteLedger, TableName};
use tracing::debug;

/// File inside the migrations folder that holds the connection string.
pub const CONNECTION_FILE: &str = "connection-string.txt";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: &str = "5432";
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_PASSWORD: &str = "";
pub const DEFAULT_DATABASE: &str = "postgres";

const ENV_USER: &str = "POSTGRESQL_USER";
const ENV_PASSWORD: &str = "POSTGRESQL_PASSWORD";
const ENV_PASSWORD_FILE: &str = "POSTGRESQL_PASSWORD_FILE";
const ENV_HOST: &str = "POSTGRESQL_HOST";
const ENV_PORT: &str = "POSTGRESQL_PORT";
const ENV_DATABASE: &str = "POSTGRESQL_DATABASE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no database connection configured and {path} does not exist")]
    NotConfigured { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("connection string from {origin} is empty")]
    Empty { origin: Origin },

    #[error("unsupported connection string {0:?}: expected postgres://, postgresql:// or sqlite:")]
    Unsupported(String),
}

/// Which step of the resolution order produced a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Flag,
    Environment,
    File(PathBuf),
    Prompt,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => write!(f, "--database-url"),
            Self::Environment => write!(f, "POSTGRESQL_* environment"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Prompt => write!(f, "prompt"),
        }
    }
}

/// A connection string and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub url: String,
    pub origin: Origin,
}

/// PostgreSQL credentials, assembled into a `postgresql://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgCredentials {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: String,
    pub database: String,
}

impl Default for PgCredentials {
    fn default() -> Self {
        Self {
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
            database: DEFAULT_DATABASE.to_string(),
        }
    }
}

impl PgCredentials {
    pub fn to_url(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Credentials from `POSTGRESQL_*`, or `None` if none of them is set.
///
/// Empty values count as unset. `POSTGRESQL_PASSWORD_FILE` only replaces the
/// password; on its own it does not select the environment.
pub fn credentials_from_env<F>(lookup: &F) -> Result<Option<PgCredentials>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
    let mut creds = PgCredentials::default();
    let mut any = false;

    for (key, slot) in [
        (ENV_USER, &mut creds.user),
        (ENV_PASSWORD, &mut creds.password),
        (ENV_HOST, &mut creds.host),
        (ENV_PORT, &mut creds.port),
        (ENV_DATABASE, &mut creds.database),
    ] {
        if let Some(value) = get(key) {
            *slot = value;
            any = true;
        }
    }

    if let Some(path) = get(ENV_PASSWORD_FILE) {
        let path = PathBuf::from(path);
        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable { path, source })?;
        creds.password = contents.trim_end_matches(['\r', '\n']).to_string();
    }

    Ok(any.then_some(creds))
}

/// Steps 1 and 2 of the resolution order. `None` means nothing is set.
pub fn from_environment<F>(flag: Option<&str>, lookup: &F) -> Result<Option<Resolved>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = flag {
        let url = url.trim();
        if url.is_empty() {
            return Err(ConfigError::Empty {
                origin: Origin::Flag,
            });
        }
        return Ok(Some(Resolved {
            url: url.to_string(),
            origin: Origin::Flag,
        }));
    }

    Ok(credentials_from_env(lookup)?.map(|creds| Resolved {
        url: creds.to_url(),
        origin: Origin::Environment,
    }))
}

pub fn connection_file(dir: &Path) -> PathBuf {
    dir.join(CONNECTION_FILE)
}

/// Contents of the connection file, `None` if it does not exist.
pub fn read_connection_file(dir: &Path) -> Result<Option<String>, ConfigError> {
    let path = connection_file(dir);
    match fs::read_to_string(&path) {
        Ok(contents) => {
            let url = contents.trim();
            if url.is_empty() {
                return Err(ConfigError::Empty {
                    origin: Origin::File(path),
                });
            }
            Ok(Some(url.to_string()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Unreadable { path, source }),
    }
}

pub fn write_connection_file(dir: &Path, url: &str) -> io::Result<PathBuf> {
    let path = connection_file(dir);
    fs::write(&path, url)?;
    Ok(path)
}

/// Full resolution order.
pub fn resolve<F>(flag: Option<&str>, dir: &Path, lookup: &F) -> Result<Resolved, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(resolved) = from_environment(flag, lookup)? {
        return Ok(resolved);
    }
    match read_connection_file(dir)? {
        Some(url) => Ok(Resolved {
            url,
            origin: Origin::File(connection_file(dir)),
        }),
        None => Err(ConfigError::NotConfigured {
            path: connection_file(dir),
        }),
    }
}

/// Backend selected by a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Postgres(String),
    Sqlite(PathBuf),
}

impl FromStr for ConnectionTarget {
    type Err = ConfigError;

    fn from_str(url: &str) -> Result<Self, ConfigError> {
        let url = url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Self::Postgres(url.to_string()));
        }
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        if path.is_empty() || path.contains("://") {
            return Err(ConfigError::Unsupported(url.to_string()));
        }
        Ok(Self::Sqlite(PathBuf::from(path)))
    }
}

impl ConnectionTarget {
    pub fn describe(&self) -> String {
        match self {
            Self::Postgres(_) => "PostgreSQL".to_string(),
            Self::Sqlite(path) => format!("SQLite ({})", path.display()),
        }
    }

    /// Open the ledger, creating its table if needed.
    pub fn open(&self, table: TableName) -> anyhow::Result<AnyLedger> {
        debug!(target_db = %self.describe(), table = %table, "opening ledger");
        match self {
            Self::Sqlite(path) => {
                let config = SqliteConfig {
                    table,
                    ..SqliteConfig::default()
                };
                Ok(SqliteLedger::open_with_config(path, config)?.into())
            }
            #[cfg(feature = "postgres")]
            Self::Postgres(url) => {
                let config = stepwise_store::PostgresConfig { table };
                Ok(stepwise_store::PostgresLedger::connect_with_config(url, config)?.into())
            }
            #[cfg(not(feature = "postgres"))]
            Self::Postgres(_) => {
                let _ = table;
                anyhow::bail!("this build of stepwise has no PostgreSQL support")
            }
        }
    }
}
