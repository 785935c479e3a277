use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kreisel::commands::{App, Command};
use kreisel::config::Config;
use kreisel_core::db::Database;
use kreisel_core::SystemClock;

#[derive(Parser)]
#[command(name = "kreisel")]
#[command(about = "Borrow, extend, return and review pooled equipment")]
struct Cli {
    /// SQLite database file (overrides KREISEL_DATABASE and the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(config.log_filter());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_database(config: &Config, flag: Option<PathBuf>) -> anyhow::Result<Database> {
    let db = match config.database_path(flag) {
        Some(path) => {
            tracing::debug!("Opening database at {}", path.display());
            Database::open(path)?
        }
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load();
    init_tracing(&config);

    let db = open_database(&config, cli.database)?;
    let app = App::new(db, Arc::new(SystemClock));

    match app.execute(cli.command) {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let error = serde_json::json!({ "error": e.to_string(), "kind": e.kind() });
            eprintln!("{}", serde_json::to_string_pretty(&error)?);
            Ok(ExitCode::FAILURE)
        }
    }
}
