//! `golden-graph` command line entry point.
//!
//! # Responsibility
//! - Resolve settings, initialize logging, and dispatch one subcommand.
//! - Local maintenance subcommands run as the built-in admin identity.

mod api;
mod config;
mod server;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use config::{FileConfig, Overrides, Settings};
use golden_graph_core::{
    default_log_level, init_logging, init_stderr_logging, open_db, Caller, GraphFilter,
    GraphService, Role,
};
use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

const LOCAL_ADMIN: &str = "local-admin";

#[derive(Debug, Parser)]
#[command(name = "golden-graph")]
#[command(version)]
#[command(about = "Knowledge graph of principles linked by shared domains")]
struct Cli {
    #[arg(long, env = "GOLDEN_GRAPH_CONFIG", help = "Path to a TOML config file.")]
    config: Option<PathBuf>,

    #[arg(long, env = "GOLDEN_GRAPH_DB", help = "Path to the SQLite database.")]
    db: Option<PathBuf>,

    #[arg(long, env = "GOLDEN_GRAPH_LOG_LEVEL", help = "trace, debug, info, warn or error.")]
    log_level: Option<String>,

    #[arg(
        long,
        env = "GOLDEN_GRAPH_LOG_DIR",
        help = "Write rotating log files here instead of stderr."
    )]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Serve the HTTP API.")]
    Serve {
        #[arg(long, env = "GOLDEN_GRAPH_LISTEN", help = "Address to bind.")]
        listen: Option<SocketAddr>,
    },
    #[command(about = "Apply pending schema migrations and exit.")]
    Migrate,
    #[command(about = "Re-derive every edge from current domain memberships.")]
    RebuildEdges,
    #[command(about = "Compare stored edges with derived edges; exit 1 on drift.")]
    CheckEdges,
    #[command(about = "Print the graph view with layout as JSON.")]
    Export {
        #[arg(long = "domain", help = "Keep principles in this domain; repeatable.")]
        domain_ids: Vec<Uuid>,
        #[arg(long = "q", help = "Keep principles whose text contains this.")]
        text: Option<String>,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let file = match cli.config.as_deref() {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let listen = match &cli.command {
        Command::Serve { listen } => *listen,
        _ => None,
    };
    let settings = Settings::resolve(
        file,
        Overrides {
            listen,
            db_path: cli.db,
            log_level: cli.log_level,
            log_dir: cli.log_dir,
        },
        default_log_level(),
    )?;

    match settings.log_dir.as_deref() {
        Some(dir) => init_logging(&settings.log_level, dir),
        None => init_stderr_logging(&settings.log_level),
    }
    .map_err(|err| anyhow!("failed to initialize logging: {err}"))?;

    match cli.command {
        Command::Serve { .. } => {
            server::serve(settings)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Migrate => {
            open_db(&settings.db_path)?;
            info!(
                "event=migrate module=cli status=ok db={}",
                settings.db_path.display()
            );
            println!("schema ready: {}", settings.db_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::RebuildEdges => {
            let conn = open_db(&settings.db_path)?;
            let delta = GraphService::new(&conn).rebuild_edges(&local_admin())?;
            println!("{}", serde_json::to_string_pretty(&delta)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckEdges => {
            let conn = open_db(&settings.db_path)?;
            let report = GraphService::new(&conn).check_edges(&local_admin())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_consistent() {
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!(
                    "edge drift: {} violation(s); run `golden-graph rebuild-edges`",
                    report.violation_count()
                );
                Ok(ExitCode::from(1))
            }
        }
        Command::Export { domain_ids, text } => {
            let conn = open_db(&settings.db_path)?;
            let view = GraphService::new(&conn).graph(&GraphFilter { domain_ids, text })?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn local_admin() -> Caller {
    Caller::authenticated(LOCAL_ADMIN, Role::Admin)
}
