use clap::{Parser, Subcommand};
use colloquy::{CancellationToken, ExportFormat};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use colloquy_cli::{
    config::Config,
    handlers::{
        conversations,
        stream::{self, SendArgs},
    },
    state::AppState,
};

#[derive(Parser)]
#[command(name = "colloquy")]
#[command(about = "Stream conversations with an LLM and keep them on disk", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored conversations
    List,

    /// Send a message and stream the reply
    Send {
        /// Continue this conversation instead of starting a new one
        #[arg(short, long)]
        conversation: Option<String>,

        /// Model to use (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,

        /// Ask the model to reason, where it supports it
        #[arg(long)]
        reasoning: bool,

        /// Attach a file (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        text: String,
    },

    /// Replace an assistant reply with a fresh one
    Regenerate {
        conversation: String,
        message: String,

        #[arg(short, long)]
        model: Option<String>,
    },

    /// Export a conversation to the data directory
    Export {
        conversation: String,

        /// json, markdown or txt
        #[arg(short, long, default_value = "markdown")]
        format: ExportFormat,
    },

    /// Delete a conversation and its attachments
    Delete { conversation: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    init_logging(&config);

    tracing::debug!(model = %config.llm.model, "Configuration loaded");
    let state = AppState::from_config(config).await?;

    let autosave_shutdown = CancellationToken::new();
    let autosave = state.spawn_autosave(autosave_shutdown.clone());

    let outcome = run(&state, cli.command).await;

    autosave_shutdown.cancel();
    if let Err(e) = autosave.await {
        tracing::warn!("Autosave task failed: {}", e);
    }

    // flush whatever the command left dirty, even when it failed
    let report = state.session.shutdown().await;
    outcome?;
    if !report.is_clean() {
        anyhow::bail!("{} conversation(s) could not be saved", report.failed.len());
    }
    Ok(())
}

async fn run(state: &AppState, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::List => conversations::list(state, &mut std::io::stdout()),
        Commands::Send {
            conversation,
            model,
            reasoning,
            files,
            text,
        } => {
            let args = SendArgs {
                conversation,
                model,
                reasoning,
                files,
                text,
            };
            stream::send(state, args).await
        }
        Commands::Regenerate {
            conversation,
            message,
            model,
        } => stream::regenerate(state, &conversation, &message, model).await,
        Commands::Export {
            conversation,
            format,
        } => conversations::export(state, &conversation, format, &mut std::io::stdout()).await,
        Commands::Delete { conversation } => conversations::delete(state, &conversation).await,
    }
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}
