//! # datalyst CLI
//!
//! Command-line interface for the datalyst analyst core. It loads a data
//! file, derives a prompt-ready context, and answers questions about the
//! data through the configured model backend.
//!
//! ## Usage
//!
//! ```bash
//! datalyst --config ./config/datalyst.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `datalyst inspect <file>` | Ingest a file and print metadata + context |
//! | `datalyst ask <file> "<question>"` | Load a file and ask one question |
//! | `datalyst chat <file>` | Interactive Q&A session over one file |
//! | `datalyst backends` | Show backend endpoints and their health |
//! | `datalyst serve` | Start the HTTP API for UI front ends |
//!
//! ## Examples
//!
//! ```bash
//! # What does this spreadsheet contain?
//! datalyst inspect sales.xlsx
//!
//! # One-shot question against the local model
//! datalyst ask sales.csv "which region is growing fastest?"
//!
//! # Use the hosted backend instead
//! DATALYST_BACKEND=cloud TOGETHER_API_KEY=... datalyst chat report.pdf
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use datalyst::agent::Analyst;
use datalyst::{config, server, status};

/// datalyst — a conversational data analyst over local or hosted language
/// models.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; a missing file means built-in defaults. See
/// `config/datalyst.example.toml` for the full set of options.
#[derive(Parser)]
#[command(
    name = "datalyst",
    about = "Load a data file, build a bounded context, and ask questions over a local or hosted model backend",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when the file
    /// does not exist.
    #[arg(long, global = true, default_value = "./config/datalyst.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest a file and print its metadata and derived context.
    ///
    /// Runs the full ingestion pipeline (format detection, parsing, context
    /// building) without contacting any backend. Useful for checking what
    /// the model will be told about a file.
    Inspect {
        /// Path to the file to inspect.
        file: PathBuf,
    },

    /// Load a file and ask a single question.
    Ask {
        /// Path to the data file.
        file: PathBuf,

        /// The question to ask about the data.
        question: String,
    },

    /// Interactive chat over one loaded file.
    ///
    /// Reads questions from stdin until EOF or `exit`. `reset` clears the
    /// conversation without reloading the file.
    Chat {
        /// Path to the data file.
        file: PathBuf,
    },

    /// Show the configured backends and their health.
    Backends,

    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind` and serves the session endpoints consumed
    /// by UI front ends.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Inspect { file } => {
            let mut analyst = analyst_for_inspection(&cfg)?;
            let bytes = read_file(&file)?;
            let loaded = analyst
                .load_bytes(&file_name(&file), &bytes)
                .map_err(|e| anyhow::anyhow!("{} [{}]", e, e.code()))?;

            println!("file:    {}", loaded.source.name);
            println!("format:  {}", loaded.source.kind.as_str());
            println!("size:    {} bytes", loaded.source.size);
            println!("sha256:  {}", loaded.source.sha256);
            if let Some(ds) = loaded.dataset() {
                println!("payload: table ({} rows x {} columns)", ds.rows, ds.columns.len());
            } else if let Some(text) = loaded.extracted_text() {
                println!("payload: text ({} chars)", text.chars().count());
            }
            println!();
            println!("metadata:");
            for (key, value) in &loaded.metadata {
                println!("  {}: {}", key, value);
            }
            println!();
            println!("context ({} chars):", loaded.context.len());
            println!("{}", loaded.context);
        }
        Commands::Ask { file, question } => {
            let mut analyst = Analyst::new(&cfg)?;
            let bytes = read_file(&file)?;
            analyst
                .load_bytes(&file_name(&file), &bytes)
                .map_err(|e| anyhow::anyhow!("{} [{}]", e, e.code()))?;
            let answer = analyst.ask(&question).await?;
            println!("{}", answer);
        }
        Commands::Chat { file } => {
            let mut analyst = Analyst::new(&cfg)?;
            let bytes = read_file(&file)?;
            let loaded = analyst
                .load_bytes(&file_name(&file), &bytes)
                .map_err(|e| anyhow::anyhow!("{} [{}]", e, e.code()))?;
            println!(
                "loaded {} ({}); 'reset' clears the conversation, 'exit' quits",
                loaded.source.name,
                loaded.source.kind.as_str()
            );
            run_chat_loop(&mut analyst).await?;
        }
        Commands::Backends => {
            status::list_backends(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

/// The inspect command never talks to a backend, so backend construction
/// must not be able to fail it (e.g. cloud kind with no credential);
/// fall back to the local gateway for offline inspection.
fn analyst_for_inspection(cfg: &config::Config) -> anyhow::Result<Analyst> {
    match Analyst::new(cfg) {
        Ok(analyst) => Ok(analyst),
        Err(_) => {
            let mut local_cfg = cfg.clone();
            local_cfg.backend.kind = config::BackendKind::Local;
            Analyst::new(&local_cfg).map_err(|e| anyhow::anyhow!("backend init: {}", e))
        }
    }
}

fn read_file(path: &PathBuf) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

fn file_name(path: &PathBuf) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn run_chat_loop(analyst: &mut Analyst) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        match question {
            "" => continue,
            "exit" | "quit" => break,
            "reset" => {
                analyst.reset_conversation();
                println!("conversation cleared");
                continue;
            }
            _ => {}
        }
        match analyst.ask(question).await {
            Ok(answer) => println!("{}\n", answer),
            Err(e) => eprintln!("error: {}\n", e),
        }
    }
    Ok(())
}
