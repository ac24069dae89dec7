//! # Bugscout CLI (`bugscout`)
//!
//! The `bugscout` binary is the interface to the indexing and diagnosis
//! pipeline. All commands operate on a project root (the current directory
//! by default) and keep their state under `.bugscout/` inside it.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bugscout init` | Write a default `bugscout.toml` and create the index database |
//! | `bugscout scan` | Walk the project and report what would be indexed |
//! | `bugscout index` | Sync the vector index with the working tree (`--force` re-embeds everything) |
//! | `bugscout status` | Show index freshness against the working tree |
//! | `bugscout analyze "<bug>"` | One-shot diagnosis of a bug description |
//! | `bugscout session` | Interactive diagnosis session |
//! | `bugscout clean` | Delete all local index state |
//!
//! ## Examples
//!
//! ```bash
//! bugscout init
//! bugscout index
//! bugscout analyze "login endpoint returns 500 after deploy"
//! bugscout session
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use bugscout::analyze::analyze;
use bugscout::config::{self, Config};
use bugscout::db;
use bugscout::embedding::create_embedder;
use bugscout::indexer::sync_index;
use bugscout::llm::create_generator;
use bugscout::manifest::IndexLock;
use bugscout::memory::MEMORY_COLLECTION;
use bugscout::progress::ProgressMode;
use bugscout::scanner::scan_project;
use bugscout::session::Session;
use bugscout::status::project_status;
use bugscout::vector_store::SqliteVectorStore;

/// Bugscout — a local-first debugging assistant.
///
/// Indexes your project's source incrementally and answers bug reports with
/// citations into the code it retrieved.
#[derive(Parser)]
#[command(
    name = "bugscout",
    about = "Bugscout — incremental code indexing and grounded bug diagnosis",
    version
)]
struct Cli {
    /// Project root to operate on.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default `bugscout.toml` and create the index database.
    ///
    /// Idempotent: an existing config file is left untouched.
    Init {
        /// LLM model to record in the generated config.
        #[arg(long)]
        model: Option<String>,
    },

    /// Walk the project and report what would be indexed.
    ///
    /// Reads nothing but the tree; prints per-file paths with `--verbose`.
    Scan {
        /// Print every matched file path.
        #[arg(long)]
        verbose: bool,
    },

    /// Sync the vector index with the working tree.
    ///
    /// Only files whose content hash changed are re-embedded. Deleted files
    /// have their chunks purged. A chunking or embedding config change
    /// forces a full re-index automatically.
    Index {
        /// Re-embed every file regardless of hash equality.
        #[arg(long)]
        force: bool,
    },

    /// Show index freshness against the working tree.
    Status,

    /// One-shot diagnosis of a bug description.
    ///
    /// Runs the enabled evidence tools, generates a grounded answer, and
    /// prints it with citations and a confidence score.
    Analyze {
        /// The bug description or question.
        query: String,
    },

    /// Interactive diagnosis session.
    ///
    /// Streams answers token by token. Ctrl-C or `exit` ends the session;
    /// an interrupted answer is discarded, not remembered.
    Session {
        /// Bug description to open the session with.
        description: Option<String>,
    },

    /// Delete all local index state (`.bugscout/`).
    ///
    /// The config file is kept. Run `bugscout index` afterwards to rebuild.
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.root.canonicalize().unwrap_or(cli.root.clone());

    match cli.command {
        Commands::Init { model } => {
            let created = config::create_default_config(&root, model.as_deref())?;
            if created {
                println!("Created {}", config::CONFIG_FILE);
            } else {
                println!("{} already exists, leaving it untouched", config::CONFIG_FILE);
            }
            // Validates the config and creates the database eagerly so the
            // first `index` run fails fast on misconfiguration.
            let _config = config::load_config(&root)?;
            let pool = db::connect(&Config::state_dir(&root)).await?;
            pool.close().await;
            println!("Index database ready under {}/", config::STATE_DIR);
        }

        Commands::Scan { verbose } => {
            let config = config::load_config(&root)?;
            let scan = scan_project(&root, &config)?;
            if verbose {
                for file in &scan.files {
                    println!("{}", file.path);
                }
            }
            println!("scan");
            println!("  files matched: {}", scan.files.len());
            let total_bytes: u64 = scan.files.iter().map(|f| f.size_bytes).sum();
            println!("  total size: {} bytes", total_bytes);
            report_warnings(&scan.warnings);
        }

        Commands::Index { force } => {
            let config = config::load_config(&root)?;
            let pool = db::connect(&Config::state_dir(&root)).await?;
            let store = SqliteVectorStore::new(pool.clone(), "code");
            let embedder = create_embedder(&config.embedding)?;
            let progress = ProgressMode::default_for_tty().reporter();

            let stats = sync_index(
                &root,
                &config,
                &store,
                embedder.as_ref(),
                force,
                progress.as_ref(),
            )
            .await?;

            println!("index");
            if stats.up_to_date {
                println!("  already up to date ({} files tracked)", stats.scanned);
            } else {
                println!("  files scanned: {}", stats.scanned);
                println!("  added: {}  modified: {}  removed: {}",
                    stats.added, stats.modified, stats.removed);
                println!("  chunks embedded: {}", stats.chunks_embedded);
                println!("  chunks deleted: {}", stats.chunks_deleted);
            }
            report_warnings(&stats.warnings);
            pool.close().await;
        }

        Commands::Status => {
            let config = config::load_config(&root)?;
            let report = project_status(&root, &config)?;
            println!("status");
            println!("  tracked files: {}", report.tracked_files);
            println!("  indexed chunks: {}", report.total_chunks);
            match report.indexed_at {
                Some(ts) => println!("  last indexed: {}", format_timestamp(ts)),
                None => println!("  last indexed: never"),
            }
            if !report.config_current {
                println!("  config changed since last index (next index will be full)");
            }
            if report.is_fresh() {
                println!("  index is up to date");
            } else {
                println!(
                    "  pending: {} added, {} modified, {} removed",
                    report.pending_added, report.pending_modified, report.pending_removed
                );
                println!("  run `bugscout index` to update");
            }
        }

        Commands::Analyze { query } => {
            let config = config::load_config(&root)?;
            let pool = db::connect(&Config::state_dir(&root)).await?;
            let store = SqliteVectorStore::new(pool.clone(), "code");
            let embedder = create_embedder(&config.embedding)?;
            let generator = create_generator(&config.llm)?;

            let report = analyze(
                &query,
                &root,
                &config,
                &store,
                embedder.as_ref(),
                generator.as_ref(),
            )
            .await?;

            println!("{}", report.answer.trim());
            if !report.citations.is_empty() {
                println!("\nSources:");
                for citation in &report.citations {
                    println!("  {}", citation);
                }
            }
            println!("\nConfidence: {:.2}", report.confidence);
            pool.close().await;
        }

        Commands::Session { description } => {
            let config = config::load_config(&root)?;
            // Hold the index lock so a concurrent `index` cannot swap chunks
            // out from under the session.
            let _lock = IndexLock::acquire(&Config::state_dir(&root))?;
            let pool = db::connect(&Config::state_dir(&root)).await?;
            let code_store = SqliteVectorStore::new(pool.clone(), "code");
            let memory_store = SqliteVectorStore::new(pool.clone(), MEMORY_COLLECTION);
            let embedder = create_embedder(&config.embedding)?;
            let generator = create_generator(&config.llm)?;

            let mut session = Session::new(
                root.clone(),
                &config,
                &code_store,
                &memory_store,
                embedder.as_ref(),
                generator.as_ref(),
            );

            println!("bugscout session — describe the bug, `exit` to quit");
            if let Some(description) = description {
                println!("> {}", description);
                run_session_turn(&mut session, &description).await?;
            }

            let stdin = std::io::stdin();
            loop {
                print!("> ");
                std::io::stdout().flush()?;
                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let message = line.trim();
                if message.is_empty() {
                    continue;
                }
                if message == "exit" || message == "quit" {
                    break;
                }
                run_session_turn(&mut session, message).await?;
            }
            pool.close().await;
        }

        Commands::Clean => {
            let state_dir = Config::state_dir(&root);
            if state_dir.exists() {
                std::fs::remove_dir_all(&state_dir)?;
                println!("Removed {}", state_dir.display());
            } else {
                println!("Nothing to clean");
            }
        }
    }

    Ok(())
}

/// Run one session turn: stream the answer to stdout and commit it only if
/// the stream finished cleanly. Failures print to stderr and discard the
/// partial answer.
async fn run_session_turn(session: &mut Session<'_>, message: &str) -> Result<()> {
    let (pending, mut stream) = match session.begin_turn(message).await {
        Ok(turn) => turn,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return Ok(());
        }
    };

    let mut answer = String::new();
    while let Some(token) = stream.next_token().await {
        match token {
            Ok(token) => {
                print!("{}", token);
                std::io::stdout().flush()?;
                answer.push_str(&token);
            }
            Err(e) => {
                eprintln!("\nerror: {:#}", e);
                return Ok(());
            }
        }
    }
    println!();

    if !pending.citations.is_empty() {
        println!("\nSources:");
        for citation in &pending.citations {
            println!("  {}", citation);
        }
    }
    session.commit_turn(pending, answer).await
}

fn report_warnings(warnings: &[bugscout::error::ScanWarning]) {
    if warnings.is_empty() {
        return;
    }
    eprintln!("  {} file(s) skipped:", warnings.len());
    for warning in warnings {
        eprintln!("    {}", warning);
    }
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
