//! # deskbot-cli
//!
//! Command-line interface for Deskbot.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deskbot_core::Config;
use deskbot_providers::ProviderRegistry;
use deskbot_session::{ManagerConfig, SessionManager};
use deskbot_storage::{
    CouchTranscriptStore, MemorySessionIndex, MemoryTranscriptStore, PgSessionIndex, SessionIndex,
    TranscriptStore,
};

mod commands;
mod repl;

/// Application context containing shared state.
pub struct AppContext {
    pub transcript: Arc<dyn TranscriptStore>,
    pub index: Arc<dyn SessionIndex>,
    pub manager: Arc<SessionManager>,
}

/// Deskbot - conversational support agent
#[derive(Parser)]
#[command(name = "deskbot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Initial prompt to send (starts interactive mode after)
    #[arg(value_name = "PROMPT")]
    prompt: Option<String>,

    /// Print mode - send one prompt, print the response, exit
    #[arg(short, long)]
    print: bool,

    /// Resume a specific session by id (defaults to a new session)
    #[arg(short, long, value_name = "SESSION_ID")]
    session: Option<String>,

    /// Provider to use (anthropic, openai)
    #[arg(long)]
    provider: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Session management
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// List recent sessions
    List {
        /// Maximum sessions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show session details and recent transcript
    Show {
        /// Session id
        id: String,
        /// Number of transcript turns to display
        #[arg(short, long, default_value = "20")]
        turns: usize,
    },
    /// Close a session; closed sessions accept no further turns
    Close {
        /// Session id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration; missing required values are startup-fatal.
    let mut config = Config::load_validated()?;
    if let Some(ref provider) = cli.provider {
        config.general.provider = provider.clone();
    }

    tracing::debug!(
        provider = %config.general.provider,
        transcript = %config.transcript.backend,
        index = %config.index.backend,
        "starting deskbot"
    );

    // Initialize provider registry and verify the selected provider resolves.
    let registry = Arc::new(ProviderRegistry::from_config(&config));
    registry.resolve(&config.general.provider).map_err(|e| {
        anyhow::anyhow!(
            "{e}. Set ANTHROPIC_API_KEY / OPENAI_API_KEY or configure providers.* in deskbot.toml"
        )
    })?;

    // Connect the two stores.
    let transcript = build_transcript_store(&config).await?;
    let index = build_session_index(&config).await?;

    let manager = Arc::new(SessionManager::new(
        transcript.clone(),
        index.clone(),
        registry,
        ManagerConfig {
            provider: config.general.provider.clone(),
            context_window: config.general.context_window,
            system_prompt: config.general.system_prompt.clone(),
            ack_retry: Default::default(),
        },
    ));

    let ctx = Arc::new(AppContext {
        transcript,
        index,
        manager,
    });

    match cli.command {
        Some(Commands::Session { action }) => {
            commands::session::handle(action, &ctx).await?;
        }
        Some(Commands::Version) => {
            println!("deskbot {}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            let session_id = cli
                .session
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            if cli.print {
                // Print mode - single response then exit
                let Some(ref prompt) = cli.prompt else {
                    anyhow::bail!("print mode requires a prompt");
                };
                let reply = ctx.manager.handle_turn(&session_id, prompt).await?;
                println!("{}", reply.content);
            } else {
                repl::run(ctx, session_id, cli.prompt).await?;
            }
        }
    }

    Ok(())
}

/// Build the configured transcript store.
async fn build_transcript_store(config: &Config) -> anyhow::Result<Arc<dyn TranscriptStore>> {
    match config.transcript.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryTranscriptStore::new())),
        _ => {
            let url = config.transcript.require_url()?;
            let mut store = CouchTranscriptStore::new(url, &config.transcript.database);
            if let (Some(user), Some(pass)) =
                (&config.transcript.username, &config.transcript.password)
            {
                store = store.with_credentials(user, pass);
            }
            store.ensure_database().await?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the configured session index.
async fn build_session_index(config: &Config) -> anyhow::Result<Arc<dyn SessionIndex>> {
    match config.index.backend.as_str() {
        "memory" => Ok(Arc::new(MemorySessionIndex::new())),
        _ => {
            let url = config.index.require_url()?;
            let index = PgSessionIndex::connect(url).await?;
            Ok(Arc::new(index))
        }
    }
}
