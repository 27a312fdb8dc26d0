//! `tt` - thin command-line adapter over [`tasktree::intent::process_intent`].
//!
//! This binary is deliberately minimal: it resolves a store root, builds a
//! single JSON request object, and prints the JSON response. It performs no
//! business logic of its own - every mutation and every invariant lives in
//! the library behind [`tasktree::intent`].

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tasktree::intent::process_intent;
use tasktree::manager::Manager;

/// A file-backed, revision-versioned hierarchical task tracker.
#[derive(Parser, Debug)]
#[command(name = "tt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store root directory (defaults to $TASKTREE_STORE or the current directory)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a raw intent request as a JSON object.
    ///
    /// The object must carry an `"intent"` field naming one of the
    /// supported intents (create, note, patch, done, radar, ...). The full
    /// set of intents and their parameters is documented in the library's
    /// `intent` module.
    Send {
        /// JSON request, e.g. '{"intent":"create","kind":"task","title":"Ship it"}'.
        /// Reads from stdin when omitted.
        json: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let store_root = cli
        .store
        .or_else(|| std::env::var_os("TASKTREE_STORE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    let manager = Manager::open(store_root)?;

    match cli.command {
        Command::Send { json } => {
            let raw = match json {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let request: serde_json::Value = serde_json::from_str(&raw)?;
            let response = process_intent(&manager, request);
            println!("{}", serde_json::to_string_pretty(&response)?);
            let success = response.get("success").and_then(serde_json::Value::as_bool).unwrap_or(false);
            Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}
