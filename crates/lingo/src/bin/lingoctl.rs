//! Admin tool for inspecting the translation store.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use lingo::config::load_or_default;
use lingo::model::TranslationStatus;
use lingo::stream::{failure_message, replay_completed, StreamEvent, NOT_FOUND_MESSAGE};
use lingo::{LingoError, TranslationStore};

#[derive(Parser)]
#[command(name = "lingoctl", version, about = "Inspect and manage lingo translation jobs")]
struct Cli {
    /// Config file. Defaults to ~/.lingo/config.json when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List jobs, newest first
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Show one job with its paragraphs and segments
    Show { id: String },
    /// Show status and counts for one job
    Status { id: String },
    /// List jobs a worker may claim right now
    Restartable,
    /// Delete a job and everything it owns
    Delete { id: String },
    /// Print the replay of a finished job as SSE frames
    Replay { id: String },
}

#[derive(Serialize)]
struct ListOutput<T> {
    items: Vec<T>,
    total: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, LingoError> {
    let config = load_or_default(cli.config.as_deref())?;
    lingo::logging::init(&config.log)?;
    let store = config.open_store()?;

    match cli.command {
        Command::List {
            status,
            limit,
            offset,
        } => {
            let (items, total) = store.list(limit, offset, status.as_deref())?;
            print_json(&ListOutput { items, total })
        }
        Command::Show { id } => print_json(&store.get(&id)?),
        Command::Status { id } => print_json(&store.status(&id)?),
        Command::Restartable => print_json(&store.list_restartable_translation_ids()?),
        Command::Delete { id } => {
            store.delete(&id)?;
            println!("deleted {}", id);
            Ok(ExitCode::SUCCESS)
        }
        Command::Replay { id } => replay(&store, &id),
    }
}

fn replay(store: &TranslationStore, id: &str) -> Result<ExitCode, LingoError> {
    let translation = match store.get(id) {
        Ok(t) => t,
        Err(e) if e.is_not_found() => {
            print!("{}", StreamEvent::error(NOT_FOUND_MESSAGE).to_sse_frame());
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    let events = match translation.status {
        TranslationStatus::Completed => replay_completed(&translation),
        TranslationStatus::Failed => {
            vec![StreamEvent::error(failure_message(translation.error_message))]
        }
        other => {
            eprintln!("translation {} is {}; nothing to replay yet", id, other.as_str());
            return Ok(ExitCode::FAILURE);
        }
    };

    for event in &events {
        print!("{}", event.to_sse_frame());
    }
    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<ExitCode, LingoError> {
    match serde_json::to_string_pretty(value) {
        Ok(out) => {
            println!("{}", out);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("error: failed to encode output: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
