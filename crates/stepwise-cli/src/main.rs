use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use console::style;
use stepwise_store::{TableName, DEFAULT_TABLE};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod report;
mod template;

/// stepwise: ordered, reversible SQL migrations.
///
/// Keeps a ledger table of applied migrations and applies or reverts the
/// files in the migrations folder one transaction at a time.
#[derive(Parser)]
#[command(name = "stepwise", version, about, long_about = None)]
struct Cli {
    /// Folder holding the migration files and the stored connection string.
    #[arg(long, global = true, env = "STEPWISE_DIR", default_value = "migrations")]
    dir: PathBuf,

    /// Connection string (postgres://..., sqlite:<path>). Overrides every other source.
    #[arg(long, global = true, env = "STEPWISE_DATABASE_URL")]
    database_url: Option<String>,

    /// Name of the ledger table.
    #[arg(long, global = true, default_value = DEFAULT_TABLE, value_parser = parse_table)]
    table: TableName,

    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migrations folder and the ledger table.
    Init,

    /// Create a new migration file in the migrations folder.
    Create {
        /// Words of the migration name, joined with '-'.
        #[arg(required = true)]
        name: Vec<String>,
    },

    /// Create a new migration file in the current directory.
    CreateHere {
        /// Words of the migration name, joined with '-'.
        #[arg(required = true)]
        name: Vec<String>,
    },

    /// Apply every pending migration.
    Up,

    /// Revert the most recent migration.
    Down,

    /// Revert every applied migration, newest first.
    Destroy {
        /// Do not ask for confirmation.
        #[arg(long)]
        yes: bool,
    },

    /// Show applied and pending migrations.
    Status {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

fn parse_table(name: &str) -> Result<TableName, String> {
    TableName::new(name).map_err(|e| e.to_string())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = commands::Settings {
        dir: cli.dir,
        database_url: cli.database_url,
        table: cli.table,
    };

    let result = match cli.command {
        Commands::Init => commands::init(&settings),
        Commands::Create { name } => commands::create(&settings, &name),
        Commands::CreateHere { name } => commands::create_here(&name),
        Commands::Up => commands::up(&settings),
        Commands::Down => commands::down(&settings),
        Commands::Destroy { yes } => commands::destroy(&settings, yes),
        Commands::Status { json } => commands::status(&settings, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", style("error:").red().bold());
            if let Some(sql) = report::failed_effect(&e) {
                eprintln!("{}\n{sql}", style("failing SQL:").dim());
            }
            if let Some(hint) = report::hint(&e) {
                eprintln!("{} {hint}", style("hint:").cyan());
            }
            ExitCode::from(report::exit_code(&e))
        }
    }
}
