//! codex-mem: durable project memory with full-text search, timelines and
//! report-only retention.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use codex_mem::config::Settings;
use codex_mem::db::{parse_iso_ms, MemoryDB, OpenOptions};
use codex_mem::error::MemError;
use codex_mem::ingest::{self, IngestRequest};
use codex_mem::policy::SecretGuard;
use codex_mem::retention::{self, RetentionRequest};
use codex_mem::{api, AppState, SharedDB};

#[derive(Parser)]
#[command(name = "codex-mem", version, about = "Project memory store with full-text search")]
struct Cli {
    /// SQLite database path (overrides MEMORY_DB_PATH)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Port to listen on (overrides MEMORY_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Apply pending schema migrations and print the ledger
    Migrate,
    /// Import documents as entries, skipping unchanged content
    Ingest {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        entry_type: Option<String>,
        /// Directory the sources are relative to
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Source files; defaults to the standard docs set
        sources: Vec<String>,
    },
    /// Report entries eligible for deletion without deleting anything
    RetentionDryRun {
        #[arg(long)]
        max_age_days: Option<i64>,
        #[arg(long)]
        max_entries_per_project: Option<i64>,
        #[arg(long)]
        project: Option<String>,
        /// Reference time (RFC 3339), defaults to now
        #[arg(long)]
        now: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env();
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    if let Err(e) = run(cli.command, settings).await {
        error!(code = e.code(), "{e}");
        std::process::exit(1);
    }
}

fn open_store(settings: &Settings) -> Result<MemoryDB, MemError> {
    let db = MemoryDB::open_with(
        &settings.db_path,
        OpenOptions {
            busy_timeout: settings.busy_timeout,
            pool_size: None,
        },
    )?;
    Ok(if settings.policy_enabled {
        db.with_guard(Arc::new(SecretGuard))
    } else {
        db
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), MemError> {
    let s = serde_json::to_string_pretty(value).map_err(|e| MemError::Internal(e.to_string()))?;
    println!("{s}");
    Ok(())
}

async fn run(command: Command, settings: Settings) -> Result<(), MemError> {
    let db = open_store(&settings)?;

    match command {
        Command::Serve { port } => serve(db, settings, port).await,
        Command::Migrate => {
            print_json(&serde_json::json!({ "applied": db.applied_migrations()? }))?;
            db.close()
        }
        Command::Ingest {
            project,
            entry_type,
            root,
            sources,
        } => {
            let mut req = IngestRequest::new(root, project.unwrap_or(settings.project));
            if !sources.is_empty() {
                req = req.sources(sources);
            }
            if let Some(t) = entry_type {
                req = req.entry_type(t);
            }
            print_json(&ingest::ingest(&db, &req)?)?;
            db.close()
        }
        Command::RetentionDryRun {
            max_age_days,
            max_entries_per_project,
            project,
            now,
        } => {
            let req = RetentionRequest {
                now_ms: now.as_deref().map(parse_iso_ms).transpose()?,
                max_age_days,
                max_entries_per_project,
                project,
            };
            print_json(&retention::dry_run(&db, &req)?)?;
            db.close()
        }
    }
}

async fn serve(db: MemoryDB, settings: Settings, port: Option<u16>) -> Result<(), MemError> {
    let port = port.unwrap_or(settings.port);
    let shared: SharedDB = Arc::new(db);
    let state = AppState {
        db: shared.clone(),
        api_key: settings.api_key.clone(),
        root_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        default_project: settings.project.clone(),
        started_at: std::time::Instant::now(),
    };
    let app = api::router(state);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port,
        db = %settings.db_path,
        project = %settings.project,
        auth = if settings.api_key.is_some() { "enabled" } else { "disabled" },
        policy = if settings.policy_enabled { "enabled" } else { "disabled" },
        "codex-mem starting"
    );

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MemError::Internal(format!("bind {addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MemError::Internal(format!("server: {e}")))?;

    match Arc::try_unwrap(shared) {
        Ok(db) => db.close(),
        Err(_) => {
            warn!("store still referenced at shutdown, skipping checkpoint");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutting down");
}
