//! # PDF Chat CLI (`pdfchat`)
//!
//! Terminal front end for the document chat pipeline: upload PDFs, ask
//! questions with streamed answers and citations, and inspect the workspace.
//!
//! ## Usage
//!
//! ```bash
//! pdfchat --config ./config/pdfchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfchat models` | List providers and their chat models |
//! | `pdfchat ingest <files>` | Index PDFs and print the executive snapshot |
//! | `pdfchat ask "<question>"` | Answer one question |
//! | `pdfchat chat [files]` | Interactive session |
//! | `pdfchat stats` | Show the persisted corpus for the selected provider |
//!
//! ## Examples
//!
//! ```bash
//! # Index into the on-disk corpus, then query it later
//! pdfchat --backend persistent ingest q1.pdf q2.pdf
//! pdfchat --backend persistent --mode full ask "How did revenue change?"
//!
//! # One-off session with Gemini
//! pdfchat --provider gemini --model gemini-1.5-pro chat paper.pdf
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use pdf_chat::config::{load_config, Config};
use pdf_chat::export::export_history;
use pdf_chat::extract::FileOutcome;
use pdf_chat::index::load_corpus;
use pdf_chat::ingest::{Pipeline, UploadReport};
use pdf_chat::orchestrator::{self, QuickAction, TurnOutcome};
use pdf_chat::provider::{Backend, Provider};
use pdf_chat::session::{DocSummary, SessionState, WorkspaceMode};
use pdf_chat::stats::{render_analytics, WorkspaceStats};

/// PDF Chat: ask questions about your PDF documents.
///
/// Provider, model, and backend flags override the configuration file.
#[derive(Parser)]
#[command(
    name = "pdfchat",
    about = "Retrieval-augmented chat over PDF documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./config/pdfchat.toml")]
    config: PathBuf,

    /// LLM provider: groq or gemini.
    #[arg(long, global = true)]
    provider: Option<Provider>,

    /// Chat model; must belong to the provider's catalog.
    #[arg(long, global = true)]
    model: Option<String>,

    /// API key; overrides GROQ_API_KEY / GOOGLE_API_KEY.
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Vector backend: ephemeral or persistent.
    #[arg(long, global = true)]
    backend: Option<Backend>,

    /// Workspace mode: active (latest upload) or full (all uploads).
    #[arg(long, global = true, default_value = "active")]
    mode: WorkspaceMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List providers, their chat models, and key variables.
    Models,

    /// Index PDFs and print the executive snapshot.
    ///
    /// With the persistent backend the corpus is extended on disk and can
    /// be queried by later runs.
    Ingest {
        /// PDF files to upload as one batch.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Answer a single question.
    Ask {
        /// The question.
        question: String,

        /// PDFs to index first (otherwise the persisted corpus is used).
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,

        /// Print the retrieved chunks after the answer.
        #[arg(long)]
        dev: bool,
    },

    /// Interactive chat session. Type /help inside for commands.
    Chat {
        /// PDFs to index before the first question.
        files: Vec<PathBuf>,

        /// Summarize the documents with 3 key takeaways after each upload.
        #[arg(long)]
        auto_summary: bool,
    },

    /// Show the corpus persisted for the selected provider.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Models = cli.command {
        print_models();
        return Ok(());
    }

    let config = resolve_config(&cli)?;
    let mut session = SessionState::new();
    session.set_workspace_mode(cli.mode);

    // Stats only reads what is stored, so it needs no key.
    if let Commands::Stats = cli.command {
        let stored = load_corpus(
            config.index.backend,
            &config.index.data_dir,
            config.llm.provider,
        )
        .await?;
        if let Some(corpus) = stored {
            session.set_corpus(corpus);
        }
        match WorkspaceStats::collect(&session) {
            Some(stats) => print!("{}", stats.render()),
            None => println!("Knowledge base empty."),
        }
        return Ok(());
    }

    let pipeline = Pipeline::from_config(&config, cli.api_key.as_deref())?;

    match cli.command {
        Commands::Models | Commands::Stats => {}
        Commands::Ingest { files } => {
            pipeline.restore(&mut session).await?;
            let report = upload(&pipeline, &mut session, &files).await?;
            print_snapshot(&report.summary);
        }
        Commands::Ask {
            question,
            files,
            dev,
        } => {
            pipeline.restore(&mut session).await?;
            if !files.is_empty() {
                upload(&pipeline, &mut session, &files).await?;
            }
            if !session.is_ready() {
                bail!("no documents indexed; pass --file or ingest with --backend persistent first");
            }
            session.set_dev_mode(dev);
            let outcome = orchestrator::ask(&mut session, pipeline.rag(), &question, print_fragment).await;
            finish_turn(&outcome);
            if let Some(e) = outcome.error {
                return Err(e.into());
            }
        }
        Commands::Chat {
            files,
            auto_summary,
        } => {
            pipeline.restore(&mut session).await?;
            if !files.is_empty() {
                let report = upload(&pipeline, &mut session, &files).await?;
                print_snapshot(&report.summary);
                if auto_summary {
                    session.request_auto_summary();
                }
            }
            run_chat(&pipeline, &mut session, &config, auto_summary).await?;
        }
    }

    Ok(())
}

/// Load the config file and apply command-line overrides.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = load_config(&cli.config)?;
    if let Some(provider) = cli.provider {
        if provider != config.llm.provider {
            config.llm.provider = provider;
            config.llm.model = None;
        }
    }
    if let Some(model) = &cli.model {
        config.llm.model = Some(model.clone());
    }
    if let Some(backend) = cli.backend {
        config.index.backend = backend;
    }
    config.validate()?;
    Ok(config)
}

fn print_models() {
    for provider in Provider::ALL {
        let info = provider.info();
        println!("{} (key: {}, {})", info.display_name, info.api_key_env, info.playground);
        for model in info.models {
            println!("  {}", model);
        }
    }
}

async fn upload(
    pipeline: &Pipeline,
    session: &mut SessionState,
    paths: &[PathBuf],
) -> Result<UploadReport> {
    eprintln!("Analyzing {} document(s)...", paths.len());
    let report = pipeline.upload_paths(session, paths).await?;

    for outcome in &report.files {
        match outcome {
            FileOutcome::Extracted { name, pages } => eprintln!("  ✔ {} ({} pages)", name, pages),
            FileOutcome::Failed(e) => eprintln!("  ✘ {}", e),
        }
    }
    eprintln!(
        "Indexed {} chunks as upload #{} ({} total, {} backend)",
        report.chunks,
        report.batch + 1,
        report.total_chunks,
        pipeline.backend_kind()
    );
    Ok(report)
}

fn print_fragment(fragment: &str) {
    print!("{}", fragment);
    let _ = std::io::stdout().flush();
}

fn print_snapshot(summary: &DocSummary) {
    match summary {
        DocSummary::Ready(text) => {
            println!("Executive Snapshot");
            println!("==================");
            println!("{}", text.trim());
            println!();
        }
        DocSummary::Failed(message) => eprintln!("Summary unavailable: {}", message),
    }
}

fn finish_turn(outcome: &TurnOutcome) {
    println!();
    if let Some(e) = &outcome.error {
        eprintln!("Error: {}", e);
    }
    if !outcome.citations.is_empty() {
        println!("Sources: {}", outcome.citations);
    }
    eprintln!("({:.2}s)", outcome.latency_seconds);

    if let Some(chunks) = &outcome.retrieved {
        eprintln!();
        eprintln!("Retrieved context chunks:");
        for (i, chunk) in chunks.iter().enumerate() {
            eprintln!("--- Chunk {} (Source: {} | Page: {}) ---", i + 1, chunk.source, chunk.page);
            eprintln!("{}", chunk.text);
        }
    }
}

const CHAT_HELP: &str = "\
Commands:
  /help                 show this help
  /upload <files...>    index more PDFs as a new batch
  /mode [active|full]   show or switch the workspace mode
  /summary              show the executive snapshot
  /stats                workspace insights
  /analytics            performance analytics
  /dev                  toggle developer insights
  /new                  new chat (keeps documents)
  /reset                full reset
  /export [dir]         write chat history as CSV
  /quit                 leave
Quick actions: /summary-all /ideas /actions /risks /extract /brief";

async fn run_chat(
    pipeline: &Pipeline,
    session: &mut SessionState,
    config: &Config,
    auto_summary: bool,
) -> Result<()> {
    eprintln!(
        "{} | {} | context: {} ({})",
        pipeline.rag().model_label(),
        config.index.backend,
        session.active_label(),
        session.workspace_mode()
    );
    eprintln!("Type a question, or /help.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if session.is_ready() {
            if let Some(outcome) =
                orchestrator::run_pending_auto_summary(session, pipeline.rag(), print_fragment)
                    .await
            {
                finish_turn(&outcome);
            }
        }

        eprint!("> ");
        let _ = std::io::stderr().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let mut parts = command.split_whitespace();
            let name = parts.next().unwrap_or_default();
            let args: Vec<&str> = parts.collect();
            match name {
                "quit" | "exit" => break,
                "help" => eprintln!("{}", CHAT_HELP),
                "upload" => {
                    let paths: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
                    match upload(pipeline, session, &paths).await {
                        Ok(report) => {
                            print_snapshot(&report.summary);
                            if auto_summary {
                                session.request_auto_summary();
                            }
                        }
                        Err(e) => eprintln!("Error: {:#}", e),
                    }
                }
                "mode" => {
                    if let Some(arg) = args.first() {
                        match arg.parse::<WorkspaceMode>() {
                            Ok(mode) => session.set_workspace_mode(mode),
                            Err(e) => eprintln!("{}", e),
                        }
                    }
                    eprintln!("Mode: {}", session.workspace_mode());
                }
                "summary" => match session.doc_summary() {
                    Some(summary) => print_snapshot(summary),
                    None => eprintln!("No snapshot yet."),
                },
                "stats" => match WorkspaceStats::collect(session) {
                    Some(stats) => print!("{}", stats.render()),
                    None => eprintln!("Knowledge base empty."),
                },
                "analytics" => print!("{}", render_analytics(session)),
                "dev" => {
                    session.set_dev_mode(!session.dev_mode());
                    eprintln!(
                        "Developer insights {}",
                        if session.dev_mode() { "on" } else { "off" }
                    );
                }
                "new" => {
                    session.new_chat();
                    eprintln!("Started a new chat.");
                }
                "reset" => {
                    session.reset();
                    eprintln!("Session reset.");
                }
                "export" => {
                    let dir = args.first().map(Path::new).unwrap_or(Path::new("."));
                    if session.history().is_empty() {
                        eprintln!("Nothing to export.");
                    } else {
                        match export_history(session.history(), dir) {
                            Ok(path) => eprintln!("Wrote {}", path.display()),
                            Err(e) => eprintln!("Error: {:#}", e),
                        }
                    }
                }
                other => {
                    let action = match other {
                        "summary-all" => Ok(QuickAction::Summary),
                        name => name.parse::<QuickAction>(),
                    };
                    match action {
                        Ok(action) if session.is_ready() => {
                            let outcome = orchestrator::run_quick_action(
                                session,
                                pipeline.rag(),
                                action,
                                print_fragment,
                            )
                            .await;
                            finish_turn(&outcome);
                        }
                        Ok(_) => eprintln!("Upload documents first (/upload <files>)."),
                        Err(_) => eprintln!("Unknown command /{}; try /help", other),
                    }
                }
            }
            continue;
        }

        if !session.is_ready() {
            eprintln!("Upload documents first (/upload <files>).");
            continue;
        }
        let outcome = orchestrator::ask(session, pipeline.rag(), line, print_fragment).await;
        finish_turn(&outcome);
    }

    Ok(())
}
