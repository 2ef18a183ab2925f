//! # Proposal Flow CLI (`pflow`)
//!
//! Drives the proposal workflow for one document from the command line.
//! Every command resumes from the artifact cache, so re-running a step never
//! repeats a generation the service already produced.
//!
//! ## Usage
//!
//! ```bash
//! pflow --config ./config/pflow.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pflow status <doc>` | Single processing-status request |
//! | `pflow watch <doc>` | Poll until processing finishes |
//! | `pflow scope <doc>` | Extract, confirm or reject the scope |
//! | `pflow topics <doc> -t <tpl>` | Generate or show the topic outline |
//! | `pflow generate <doc> -t <tpl>` | Generate content for one or all topics |
//! | `pflow chat <doc> -t <tpl> <msg>` | Ask a question about the document |
//! | `pflow save <doc> -t <tpl>` | Save edited content |
//! | `pflow export <doc> -t <tpl>` | Export the proposal as Markdown |
//! | `pflow snapshot <doc>` | Print the workflow state as JSON |
//! | `pflow forget <doc>` | Drop every cached artifact for a document |
//!
//! ## Examples
//!
//! ```bash
//! pflow watch sotr.pdf
//! pflow scope sotr.pdf --confirm --pages 3,4
//! pflow topics sotr.pdf -t frigate
//! pflow generate sotr.pdf -t frigate --all
//! pflow export sotr.pdf -t frigate --output proposal.md
//! ```

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use proposal_flow::config;
use proposal_flow::editor::SaveOutcome;
use proposal_flow::engine::WorkflowEngine;
use proposal_flow::export;
use proposal_flow::gateway::Gateway;
use proposal_flow::http_gateway::HttpGateway;
use proposal_flow::logging;
use proposal_flow::models::{DocumentId, ProcessingStage, ProcessingStatus, TemplateId, TopicKey};
use proposal_flow::poller::PollUpdate;
use proposal_flow::progress::ProgressMode;
use proposal_flow::session::{DocumentSession, ExtractOutcome};
use proposal_flow::sqlite_cache::SqliteCache;
use proposal_flow::stage::Stage;

/// Proposal Flow CLI: drive document analysis and proposal generation
/// against the remote service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without one, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "pflow",
    about = "Proposal Flow: resumable document-to-proposal workflow client",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pflow.toml")]
    config: PathBuf,

    /// Raise log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current processing status once.
    Status { document: String },

    /// Poll processing status until the document is processed or failed.
    Watch { document: String },

    /// Extract the scope, or confirm / reject it.
    ///
    /// Without flags, extracts the scope if none exists and prints it.
    Scope {
        document: String,

        /// Confirm the scope (with its source pages unless --pages is given).
        #[arg(long)]
        confirm: bool,

        /// Manual page selection for confirmation, e.g. `3,4,7`.
        #[arg(long, value_delimiter = ',')]
        pages: Option<Vec<u32>>,

        /// Ask the service to extract again instead of reusing its cache.
        #[arg(long)]
        no_cache: bool,

        /// Discard the unconfirmed scope.
        #[arg(long, conflicts_with_all = ["confirm", "pages"])]
        reject: bool,
    },

    /// Generate the topic outline, or show it if already generated.
    Topics {
        document: String,

        #[arg(short, long)]
        template: String,

        /// Replace the existing outline.
        #[arg(long)]
        regenerate: bool,
    },

    /// Generate content for one topic or for all of them.
    #[command(group(ArgGroup::new("target").required(true).args(["topic", "all"])))]
    Generate {
        document: String,

        #[arg(short, long)]
        template: String,

        /// Topic text, as shown by `pflow topics`.
        #[arg(long)]
        topic: Option<String>,

        /// Generate every topic that has no content yet.
        #[arg(long)]
        all: bool,

        /// Batch progress on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressArg,
    },

    /// Ask a question about the document.
    Chat {
        document: String,

        #[arg(short, long)]
        template: String,

        #[arg(required_unless_present = "clear")]
        message: Option<String>,

        /// Clear the transcript instead.
        #[arg(long, conflicts_with = "message")]
        clear: bool,
    },

    /// Replace a topic's content with a file and save it, or save everything.
    #[command(group(ArgGroup::new("target").required(true).args(["topic", "all"])))]
    Save {
        document: String,

        #[arg(short, long)]
        template: String,

        #[arg(long, requires = "file")]
        topic: Option<String>,

        /// File holding the edited content.
        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long)]
        all: bool,
    },

    /// Export the proposal as Markdown (stdout unless --output is given).
    Export {
        document: String,

        #[arg(short, long)]
        template: String,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the workflow state as JSON.
    Snapshot {
        document: String,

        #[arg(short, long)]
        template: Option<String>,
    },

    /// Drop every cached artifact for a document.
    Forget { document: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Auto,
    Human,
    Json,
    Off,
}

impl ProgressArg {
    fn mode(self) -> ProgressMode {
        match self {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
            ProgressArg::Off => ProgressMode::Off,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_or_default(&cli.config)?;
    let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(&cfg.service)?);

    if let Commands::Status { document } = &cli.command {
        let status = gateway.get_status(&DocumentId::new(document.as_str())).await?;
        print_json(&status)?;
        return Ok(());
    }

    let cache = Arc::new(SqliteCache::open(&cfg).await?);
    let mut engine = WorkflowEngine::new(gateway, cache.clone()).with_config(&cfg);
    let result = run(&mut engine, cli.command).await;
    engine.close();
    cache.close().await;
    result
}

async fn run(engine: &mut WorkflowEngine, command: Commands) -> Result<()> {
    match command {
        Commands::Status { .. } => {}
        Commands::Watch { document } => {
            let session = open(engine, &document, None).await?;
            let status = wait_processed(&session).await?;
            print_json(&status)?;
        }
        Commands::Scope {
            document,
            confirm,
            pages,
            no_cache,
            reject,
        } => {
            let session = open(engine, &document, None).await?;
            wait_processed(&session).await?;

            if reject {
                session.reject_scope().await?;
                eprintln!("Scope rejected.");
                return Ok(());
            }
            if session.stage() == Stage::ScopePending {
                match session.extract_scope(!no_cache).await? {
                    ExtractOutcome::Extracted(_) => eprintln!("Scope extracted."),
                    ExtractOutcome::AlreadyExtracted(_) => {}
                }
                if confirm || pages.is_some() {
                    session.confirm_scope(pages).await?;
                    eprintln!("Scope confirmed.");
                }
            } else if confirm || pages.is_some() {
                eprintln!("Scope already confirmed.");
            }
            print_json(&session.scope())?;
        }
        Commands::Topics {
            document,
            template,
            regenerate,
        } => {
            let session = open(engine, &document, Some(template.as_str())).await?;
            wait_processed(&session).await?;
            require_stage(&session, Stage::ScopeConfirmed, &document)?;
            session.generate_topics(regenerate).await?;
            print_json(&session.topic_statuses())?;
        }
        Commands::Generate {
            document,
            template,
            topic,
            all,
            progress,
        } => {
            let session = open(engine, &document, Some(template.as_str())).await?;
            wait_processed(&session).await?;
            require_stage(&session, Stage::TopicsReady, &document)?;

            if all {
                let reporter = progress.mode().reporter();
                let report = session.generate_all(reporter.as_ref()).await?;
                println!(
                    "{} topics: {} generated, {} already done, {} failed",
                    report.total,
                    report.succeeded,
                    report.skipped,
                    report.failed.len()
                );
                if !report.is_complete() {
                    for (key, err) in &report.failed {
                        eprintln!("  {}: {}", key, err);
                    }
                    bail!("{} topics failed", report.failed.len());
                }
            } else if let Some(topic) = topic {
                let content = session.generate_content(&TopicKey::new(topic)).await?;
                println!("{}", content);
            }
        }
        Commands::Chat {
            document,
            template,
            message,
            clear,
        } => {
            let session = open(engine, &document, Some(template.as_str())).await?;
            wait_processed(&session).await?;
            if clear {
                session.clear_chat().await?;
                eprintln!("Transcript cleared.");
            } else if let Some(message) = message {
                require_stage(&session, Stage::TopicsReady, &document)?;
                let reply = session.send_chat(&message).await?;
                println!("{}", reply);
            }
        }
        Commands::Save {
            document,
            template,
            topic,
            file,
            all,
        } => {
            let session = open(engine, &document, Some(template.as_str())).await?;
            wait_processed(&session).await?;
            require_stage(&session, Stage::TopicsReady, &document)?;

            if all {
                let report = session.save_all().await?;
                println!(
                    "{} saved, {} cache only, {} failed",
                    report.persisted.len(),
                    report.cache_only.len(),
                    report.failed.len()
                );
                if !report.failed.is_empty() {
                    for (key, err) in &report.failed {
                        eprintln!("  {}: {}", key, err);
                    }
                    bail!("{} saves failed", report.failed.len());
                }
            } else if let (Some(topic), Some(file)) = (topic, file) {
                let text = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                session.open_draft(&TopicKey::new(topic))?;
                session.update_draft(text)?;
                match session.save_draft().await? {
                    SaveOutcome::Persisted => println!("Saved."),
                    SaveOutcome::CacheOnly(missing) => println!("{}", missing),
                }
            }
        }
        Commands::Export {
            document,
            template,
            output,
        } => {
            let session = open(engine, &document, Some(template.as_str())).await?;
            wait_processed(&session).await?;
            require_stage(&session, Stage::TopicsReady, &document)?;
            export::run_export(&session, output.as_deref())?;
        }
        Commands::Snapshot { document, template } => {
            let session = open(engine, &document, template.as_deref()).await?;
            if let Some(PollUpdate::Status(status)) = session.watch_status().next().await {
                session.apply_status(status)?;
            }
            print_json(&session.snapshot())?;
        }
        Commands::Forget { document } => {
            let removed = engine.forget_document(&DocumentId::new(document)).await?;
            println!("Removed {} cached artifacts.", removed);
        }
    }
    Ok(())
}

async fn open(
    engine: &mut WorkflowEngine,
    document: &str,
    template: Option<&str>,
) -> Result<DocumentSession> {
    let session = engine
        .select_document(DocumentId::new(document), template.map(TemplateId::new))
        .await?;
    Ok(session)
}

/// Polls until the document is processed, echoing progress to stderr.
async fn wait_processed(session: &DocumentSession) -> Result<ProcessingStatus> {
    let status = session
        .await_processed(|update| match update {
            PollUpdate::Status(s) if !s.stage.is_terminal() => {
                let pct = s.progress.map(|p| format!(" {}%", p)).unwrap_or_default();
                eprintln!("{:?}{}  {}", s.stage, pct, s.message);
            }
            PollUpdate::TransportFailure { consecutive, error } => {
                eprintln!("status request failed ({}): {}", consecutive, error);
            }
            PollUpdate::Status(_) => {}
        })
        .await?;
    if status.stage == ProcessingStage::Error {
        bail!("processing failed: {}", status.message);
    }
    Ok(status)
}

fn require_stage(session: &DocumentSession, needed: Stage, document: &str) -> Result<()> {
    let stage = session.stage();
    if stage >= needed {
        return Ok(());
    }
    let hint = match stage {
        Stage::ScopePending => format!("pflow scope {} --confirm", document),
        _ => format!("pflow topics {} -t <template>", document),
    };
    bail!("document is at stage {}; run `{}` first", stage, hint)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
