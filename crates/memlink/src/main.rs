//! # memlink
//!
//! Command-line front end for the session store: create sessions, register
//! memory session ids, record observations, and inspect what is stored.

#![deny(unsafe_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use memlink_core::logging::init_subscriber;
use memlink_settings::MemlinkSettings;
use memlink_store::{
    ConnectionConfig, ListSessionsOptions, NewObservation, SessionDbId, SessionRow,
    SessionStatus, SessionStore,
};
use tracing::debug;

/// memlink session store.
#[derive(Parser, Debug)]
#[command(
    name = "memlink",
    version,
    about = "Session store with link-once memory session registration"
)]
struct Cli {
    /// Path to the `SQLite` database (overrides settings).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Log level or filter directive (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply migrations and print the schema version.
    Init,
    /// Create a session, or print the id of the existing one.
    Create {
        /// Originating system's session id.
        content_session_id: String,
        /// Project name.
        #[arg(long)]
        project: String,
        /// First user prompt.
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Bind a memory session id to a session (at most once).
    Register {
        /// Session primary key.
        session_id: SessionDbId,
        /// Memory session id to bind.
        memory_session_id: String,
    },
    /// Show one session.
    Show {
        /// Session primary key.
        session_id: SessionDbId,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// List sessions, newest first.
    List {
        /// Only sessions for this project.
        #[arg(long)]
        project: Option<String>,
        /// Only sessions in this status (`active`, `completed`, `failed`).
        #[arg(long, value_parser = parse_status)]
        status: Option<SessionStatus>,
        /// Maximum number of sessions.
        #[arg(long, default_value_t = 20)]
        limit: i64,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Mark an active session completed (or failed).
    End {
        /// Session primary key.
        session_id: SessionDbId,
        /// Mark the session failed instead of completed.
        #[arg(long)]
        failed: bool,
    },
    /// Store an observation under a registered memory session id.
    Observe {
        /// Registered memory session id.
        memory_session_id: String,
        /// Observation kind.
        #[arg(long)]
        kind: String,
        /// Observation body.
        #[arg(long)]
        text: String,
        /// Short title.
        #[arg(long)]
        title: Option<String>,
        /// Project (defaults to the session's project).
        #[arg(long, default_value = "")]
        project: String,
    },
}

fn parse_status(val: &str) -> std::result::Result<SessionStatus, String> {
    SessionStatus::parse(val)
        .ok_or_else(|| format!("unknown status '{val}' (expected active, completed or failed)"))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

/// Fold CLI overrides into loaded settings.
fn apply_cli_overrides(settings: &mut MemlinkSettings, cli: &Cli) {
    if let Some(ref path) = cli.db_path {
        settings.database.path = path.to_string_lossy().into_owned();
    }
    if let Some(ref level) = cli.log_level {
        settings.logging.level.clone_from(level);
    }
}

fn open_store(settings: &MemlinkSettings) -> Result<SessionStore> {
    let db_path = PathBuf::from(&settings.database.path);
    ensure_parent_dir(&db_path)?;
    SessionStore::open(
        &settings.database.path,
        &ConnectionConfig::from(&settings.database),
    )
    .with_context(|| format!("Failed to open database: {}", db_path.display()))
}

fn write_session(out: &mut impl Write, row: &SessionRow) -> Result<()> {
    writeln!(out, "id:                 {}", row.id)?;
    writeln!(out, "content_session_id: {}", row.content_session_id)?;
    writeln!(
        out,
        "memory_session_id:  {}",
        row.memory_session_id.as_deref().unwrap_or("-")
    )?;
    writeln!(out, "project:            {}", row.project)?;
    writeln!(out, "status:             {}", row.status)?;
    writeln!(out, "prompt_counter:     {}", row.prompt_counter)?;
    writeln!(out, "started_at:         {}", row.started_at)?;
    if let Some(ref completed) = row.completed_at {
        writeln!(out, "completed_at:       {completed}")?;
    }
    Ok(())
}

/// Run one command against an open store, writing results to `out`.
fn execute(command: Command, store: &SessionStore, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Init => {
            writeln!(out, "schema version {}", store.schema_version()?)?;
        }
        Command::Create {
            content_session_id,
            project,
            prompt,
        } => {
            let id = store.create_sdk_session(&content_session_id, &project, prompt.as_deref())?;
            writeln!(out, "{id}")?;
        }
        Command::Register {
            session_id,
            memory_session_id,
        } => {
            let registered =
                store.ensure_memory_session_id_registered(session_id, &memory_session_id)?;
            if registered {
                writeln!(out, "registered")?;
            } else {
                writeln!(out, "already registered")?;
            }
        }
        Command::Show { session_id, json } => {
            let Some(row) = store.get_session_by_id(session_id)? else {
                bail!("session {session_id} does not exist");
            };
            let observations = match row.memory_session_id {
                Some(ref mem_id) => store.count_observations(mem_id)?,
                None => 0,
            };
            if json {
                let mut value = serde_json::to_value(&row)?;
                value["observations"] = observations.into();
                writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
            } else {
                write_session(out, &row)?;
                writeln!(out, "observations:       {observations}")?;
            }
        }
        Command::List {
            project,
            status,
            limit,
            json,
        } => {
            let rows = store.list_recent_sessions(&ListSessionsOptions {
                project: project.as_deref(),
                status,
                limit: Some(limit),
            })?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
            } else {
                for row in &rows {
                    writeln!(
                        out,
                        "{}\t{}\t{}\t{}\t{}",
                        row.id,
                        row.status,
                        row.project,
                        row.content_session_id,
                        row.memory_session_id.as_deref().unwrap_or("-"),
                    )?;
                }
            }
        }
        Command::End { session_id, failed } => {
            let changed = if failed {
                store.fail_session(session_id)?
            } else {
                store.complete_session(session_id)?
            };
            if changed {
                writeln!(out, "{}", if failed { "failed" } else { "completed" })?;
            } else {
                writeln!(out, "session {session_id} is not active")?;
            }
        }
        Command::Observe {
            memory_session_id,
            kind,
            text,
            title,
            project,
        } => {
            let id = store.store_observation(
                &memory_session_id,
                &NewObservation {
                    project: &project,
                    kind: &kind,
                    title: title.as_deref(),
                    text: &text,
                },
            )?;
            writeln!(out, "{id}")?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = memlink_settings::load_settings().context("Failed to load settings")?;
    apply_cli_overrides(&mut settings, &cli);
    init_subscriber(&settings.logging.level, settings.logging.format);
    debug!(db_path = %settings.database.path, "starting memlink");

    let store = open_store(&settings)?;
    let mut stdout = std::io::stdout().lock();
    let result = execute(cli.command, &store, &mut stdout);
    store.close();
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
