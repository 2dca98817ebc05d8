#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use sagechat::auth::HmacTokenAuthenticator;
use sagechat::retrieval::{self, Retrieval as _, SqliteKnowledgeBase};
use sagechat::sessions::{create_session_store, SessionStore as _};
use sagechat::{Config, KnowledgeBaseCommands, SessionCommands};

const INGEST_CHUNK_CHARS: usize = 1200;

/// `SageChat` - streaming knowledge-base chat server.
#[derive(Parser, Debug)]
#[command(name = "sagechat")]
#[command(version)]
#[command(about = "Streaming knowledge-base chat over WebSockets.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the chat gateway
    #[command(long_about = "\
Start the chat gateway.

Serves the WebSocket chat endpoint at /chat/ws/{token} plus a small
/api surface for health and knowledge-base status.

Examples:
  sagechat serve                  # bind from config
  sagechat serve --port 8080      # override the port")]
    Serve {
        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Show configuration and knowledge-base status
    Status,

    /// Mint a signed access token for a user
    Token {
        /// User id the token authenticates
        user: String,

        /// Token lifetime in seconds (overrides config)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Manage chat sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Manage the knowledge base
    Kb {
        #[command(subcommand)]
        command: KnowledgeBaseCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("SAGECHAT_CONFIG_DIR", config_dir);
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let mut config = Config::load_or_init().await?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Serve { port, host } => {
            let port = port.unwrap_or(config.server.port);
            let host = host.unwrap_or_else(|| config.server.host.clone());
            info!("Starting gateway on {host}:{port}");
            sagechat::gateway::run_gateway(&host, port, config).await
        }

        Commands::Status => {
            println!("SageChat Status");
            println!();
            println!("Version:     {}", env!("CARGO_PKG_VERSION"));
            println!("Workspace:   {}", config.workspace_dir.display());
            println!("Config:      {}", config.config_path.display());
            println!();
            println!("Provider:    {}", config.provider.base_url);
            println!("Model:       {}", config.provider.model);
            println!(
                "API key:     {}",
                if config.provider.api_key.is_some() {
                    "configured"
                } else {
                    "missing"
                }
            );
            println!();
            let kb = SqliteKnowledgeBase::new(&config.database_path())?;
            let status = kb.status().await?;
            println!("Knowledge base: {}", config.chat.knowledge_base_key);
            println!("  Chunks:       {}", status.total_chunks);
            println!("  Documents:    {}", status.total_documents);
            Ok(())
        }

        Commands::Token { user, ttl } => {
            if config.auth.secret.is_none() {
                println!(
                    "Warning: auth.secret is not configured; this token only works \
                     against a server started with the same random secret."
                );
            }
            if let Some(ttl) = ttl {
                config.auth.token_ttl_secs = ttl;
            }
            let auth = HmacTokenAuthenticator::from_config(&config.auth);
            let token = auth.mint(&user)?;
            println!("{token}");
            Ok(())
        }

        Commands::Session { command } => run_session_command(&config, command).await,

        Commands::Kb { command } => run_kb_command(&config, command).await,
    }
}

async fn run_session_command(config: &Config, command: SessionCommands) -> Result<()> {
    let store = create_session_store(&config.database_path())?;

    match command {
        SessionCommands::List { user, limit } => {
            let sessions = store.list_for_user(&user).await?;
            if sessions.is_empty() {
                println!("No sessions for user '{user}'");
                return Ok(());
            }
            for session in sessions.iter().take(limit) {
                println!(
                    "{}  {}  {}",
                    session.session_id,
                    session.created_at.format("%Y-%m-%d %H:%M:%S"),
                    session.name.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }

        SessionCommands::Delete {
            session_id,
            user,
            yes,
        } => {
            if !yes && !confirm(&format!("Delete session {session_id}?"))? {
                println!("Aborted.");
                return Ok(());
            }
            if store.delete(&session_id, &user).await? {
                println!("Deleted session {session_id}");
            } else {
                println!("No session {session_id} owned by '{user}'");
            }
            Ok(())
        }
    }
}

async fn run_kb_command(config: &Config, command: KnowledgeBaseCommands) -> Result<()> {
    let kb = SqliteKnowledgeBase::new(&config.database_path())?;

    match command {
        KnowledgeBaseCommands::Status => {
            let status = kb.status().await?;
            println!("Knowledge base: {}", config.chat.knowledge_base_key);
            println!("  Chunks:       {}", status.total_chunks);
            println!("  Documents:    {}", status.total_documents);
            Ok(())
        }

        KnowledgeBaseCommands::Ingest { path, document } => {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {path}"))?;
            let document = document.unwrap_or_else(|| {
                std::path::Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone())
            });
            let chunks = retrieval::chunk_text(&contents, INGEST_CHUNK_CHARS);
            if chunks.is_empty() {
                bail!("{path} contains no ingestable text");
            }
            let stored = kb.ingest(&document, &chunks)?;
            println!("Ingested {stored} chunks from {path} as '{document}'");
            Ok(())
        }

        KnowledgeBaseCommands::Remove { document } => {
            let removed = kb.remove_document(&document)?;
            println!("Removed {removed} chunks of '{document}'");
            Ok(())
        }
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
