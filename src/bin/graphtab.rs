use std::{
    fs,
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};
use graphtab::{Engine, EngineConfig, GraphError, ResultSet, open_engine, schema};
use rusqlite::Connection;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "graphtab", version, about = "Property graph queries over SQLite")]
struct Cli {
    /// Database file, or `:memory:` for a throwaway graph.
    #[arg(long, default_value = ":memory:")]
    db: PathBuf,

    /// Tracing filter, e.g. `debug` or `graphtab::cypher=trace`.
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one Cypher statement and print its rows.
    Query { text: String },
    /// Run a file of `;`-separated statements and print the last result.
    Script { path: PathBuf },
    /// Print node and edge counts.
    Status,
    /// Upgrade a database written with the legacy edge column names.
    Migrate {
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli.log_level) {
        eprintln!("error: {err}");
        process::exit(2);
    }

    if let Command::Migrate { dry_run } = cli.command {
        process::exit(run_migrate(&cli.db, dry_run));
    }

    let engine = match open_engine(&cli.db, &EngineConfig::default()) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    if let Err(err) = run_command(&engine, &cli.command) {
        eprintln!("command failed: {err}");
        process::exit(1);
    }
}

fn init_logging(level: &str) -> Result<(), GraphError> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| GraphError::invalid_input(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| GraphError::invalid_input("logging already initialized"))
}

fn run_command(engine: &Engine, command: &Command) -> Result<(), GraphError> {
    match command {
        Command::Query { text } => {
            let result = engine.execute(text)?.materialize()?;
            print_result(&result);
            Ok(())
        }
        Command::Script { path } => {
            let script = fs::read_to_string(path)
                .map_err(|e| GraphError::invalid_input(format!("{}: {e}", path.display())))?;
            let result = engine.execute_script(&script)?;
            print_result(&result);
            Ok(())
        }
        Command::Status => {
            let status = engine.status()?;
            let version = status
                .schema_version
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".to_string());
            println!(
                "nodes={} edges={} schema_version={version}",
                status.nodes, status.edges
            );
            Ok(())
        }
        Command::Migrate { .. } => Ok(()),
    }
}

fn print_result(result: &ResultSet) {
    if !result.columns.is_empty() {
        println!("{}", result.columns.join("\t"));
    }
    for row in result.rendered_rows() {
        println!("{}", row.join("\t"));
    }
}

// Opens the file directly: a legacy database fails the engine's schema check.
fn run_migrate(path: &Path, dry_run: bool) -> i32 {
    let conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("{}", GraphError::connection(err.to_string()));
            return 2;
        }
    };
    match schema::migrate_legacy_schema(&conn, dry_run) {
        Ok(report) if report.is_noop() => {
            println!("schema up to date");
            0
        }
        Ok(report) => {
            for sql in &report.statements {
                println!("{sql}");
            }
            if report.dry_run {
                println!("dry run: {} statement(s) pending", report.statements.len());
            } else {
                println!("applied {} statement(s)", report.statements.len());
            }
            0
        }
        Err(err) => {
            eprintln!("migration failed: {err}");
            1
        }
    }
}
