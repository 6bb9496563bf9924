use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use console::{style, Term};
use inquire::{Confirm, Password, PasswordDisplayMode, Select, Text};
use serde_json::json;
use stepwise_migrate::{DirectoryProvider, MigrationSource, Migrator};
use stepwise_store::{AnyLedger, TableName};
use tracing::info;

use crate::config::{self, ConnectionTarget, Origin, PgCredentials, Resolved};
use crate::template;

type Result = anyhow::Result<()>;

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    pub dir: PathBuf,
    pub database_url: Option<String>,
    pub table: TableName,
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn open_migrator(settings: &Settings) -> anyhow::Result<Migrator<DirectoryProvider, AnyLedger>> {
    let resolved = config::resolve(settings.database_url.as_deref(), &settings.dir, &process_env)?;
    let target: ConnectionTarget = resolved.url.parse()?;
    info!(origin = %resolved.origin, database = %target.describe(), "using connection");
    let ledger = target
        .open(settings.table.clone())
        .with_context(|| format!("cannot open {}", target.describe()))?;
    let source = MigrationSource::new(DirectoryProvider::new(&settings.dir));
    Ok(Migrator::new(source, ledger))
}

/// `stepwise init`: create the migrations folder and the ledger table.
pub fn init(settings: &Settings) -> Result {
    let dir = &settings.dir;
    if !dir.exists() {
        create_private_dir(dir).with_context(|| format!("cannot create {}", dir.display()))?;
        println!("created migrations folder {}", dir.display());
    }

    let file = config::connection_file(dir);
    if file.exists() {
        bail!(
            "connection information already stored in {}; remove the file to continue",
            file.display()
        );
    }

    let resolved = match config::from_environment(settings.database_url.as_deref(), &process_env)? {
        Some(resolved) => resolved,
        None => prompt_connection()?,
    };
    let target: ConnectionTarget = resolved.url.parse()?;
    let ledger = target
        .open(settings.table.clone())
        .with_context(|| format!("cannot connect to {}", target.describe()))?;

    if resolved.origin == Origin::Prompt {
        let path = config::write_connection_file(dir, &resolved.url)
            .with_context(|| format!("cannot write {}", file.display()))?;
        println!("stored connection string in {}", path.display());
    }

    println!(
        "{} set up migrations table {} on {}",
        style("ok").green().bold(),
        settings.table,
        ledger.backend_name()
    );
    Ok(())
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

fn prompt_connection() -> anyhow::Result<Resolved> {
    if !Term::stdout().is_term() {
        bail!("no database connection configured and stdin is not a terminal to ask for one");
    }
    println!();
    let backend = Select::new("Which database do you want to migrate?", vec!["PostgreSQL", "SQLite"])
        .prompt()?;

    let url = if backend == "SQLite" {
        let path = Text::new("database file").with_default("stepwise.db").prompt()?;
        format!("sqlite:{}", path.trim())
    } else {
        println!("Please type in the PostgreSQL credentials you want to use:");
        let defaults = PgCredentials::default();
        let creds = PgCredentials {
            host: Text::new("host").with_default(&defaults.host).prompt()?,
            port: Text::new("port").with_default(&defaults.port).prompt()?,
            user: Text::new("user").with_default(&defaults.user).prompt()?,
            password: Password::new("password")
                .without_confirmation()
                .with_display_mode(PasswordDisplayMode::Masked)
                .prompt()?,
            database: Text::new("database").with_default(&defaults.database).prompt()?,
        };
        creds.to_url()
    };

    Ok(Resolved {
        url,
        origin: Origin::Prompt,
    })
}

/// `stepwise create <name...>`: new migration in the migrations folder.
pub fn create(settings: &Settings, words: &[String]) -> Result {
    if !settings.dir.is_dir() {
        bail!(
            "migrations folder {} not found; run 'stepwise init' first or pass --dir",
            settings.dir.display()
        );
    }
    let path = template::write_new(&settings.dir, words, Utc::now())?;
    println!("created {}", path.display());
    Ok(())
}

/// `stepwise create-here <name...>`: new migration in the current directory.
pub fn create_here(words: &[String]) -> Result {
    let path = template::write_new(Path::new("."), words, Utc::now())?;
    println!("created {}", path.display());
    Ok(())
}

/// `stepwise up`: apply every pending migration.
pub fn up(settings: &Settings) -> Result {
    let mut migrator = open_migrator(settings)?;
    let report = migrator.up_with(|applied| {
        println!(
            "{} {} (database id: {})",
            style("forward migration:").green(),
            applied.name,
            applied.sequence_id
        );
    })?;

    if report.is_noop() {
        println!(
            "Database already up to date, with {} migrations applied.",
            report.previously_applied
        );
        if let Some(latest) = report.latest {
            println!("Most recent migration is {latest}");
        }
    }
    Ok(())
}

/// `stepwise down`: revert the most recent migration.
pub fn down(settings: &Settings) -> Result {
    let mut migrator = open_migrator(settings)?;
    match migrator.down()? {
        Some(reverted) => println!("{} {}", style("undo:").yellow(), reverted.name),
        None => println!("There are no further migrations that can be reverted."),
    }
    Ok(())
}

/// `stepwise destroy`: revert everything, newest first.
pub fn destroy(settings: &Settings, yes: bool) -> Result {
    let mut migrator = open_migrator(settings)?;
    let applied = migrator.reconcile()?.applied().len();
    if applied == 0 {
        println!("There are no further migrations that can be reverted.");
        return Ok(());
    }

    if !yes {
        if !Term::stdout().is_term() {
            bail!("refusing to revert {applied} migrations without --yes on a non-interactive terminal");
        }
        let confirmed = Confirm::new(&format!(
            "Revert all {applied} applied migrations? This runs every down migration."
        ))
        .with_default(false)
        .prompt()?;
        if !confirmed {
            println!("aborted, nothing was reverted");
            return Ok(());
        }
    }

    let reverted = migrator.destroy_with(|step| {
        println!("{} {}", style("undo:").yellow(), step.name);
    })?;
    println!(
        "{} reverted {} migrations",
        style("ok").green().bold(),
        reverted.len()
    );
    Ok(())
}

/// `stepwise status`: applied and pending migrations.
pub fn status(settings: &Settings, as_json: bool) -> Result {
    let mut migrator = open_migrator(settings)?;
    let backend = migrator.store().backend_name();
    let reconciliation = migrator.reconcile()?;
    let pending: Vec<&str> = reconciliation.pending().iter().map(|d| d.name()).collect();

    if as_json {
        let out = json!({
            "backend": backend,
            "table": settings.table.as_str(),
            "directory": settings.dir.display().to_string(),
            "applied": reconciliation.applied(),
            "pending": pending,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Database: {backend}, table {}", settings.table);
    println!("Migrations: {}", settings.dir.display());
    println!();

    if reconciliation.applied().is_empty() {
        println!("  (nothing applied)");
    } else {
        println!("  {:>6}  {:<24}  {}", "Id", "Applied at", "Name");
        println!("  {}", "-".repeat(60));
        for entry in reconciliation.applied() {
            println!(
                "  {:>6}  {:<24}  {}",
                entry.sequence_id,
                entry.applied_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                entry.name
            );
        }
    }
    println!();

    if pending.is_empty() {
        println!("{}", style("up to date").green());
    } else {
        println!("Pending ({}):", pending.len());
        for name in pending {
            println!("  {} {name}", style("*").yellow());
        }
    }
    Ok(())
}
