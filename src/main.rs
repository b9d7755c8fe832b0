//! Notebridge - stdio agent bridge with permission-gated document tools
//!
//! Command-line host: chat with an agent process over the bridge while it
//! works on a folder of notes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notebridge::{
    bridge::{locator::LocateSpec, BridgeEvent, Launch, PathLocator},
    config::NotebridgeConfig,
    tools::{FsStore, ToolDispatcher},
    AgentMessage, BridgeManager, Completion,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "notebridge")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Stdio agent bridge with permission-gated document tools")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "NOTEBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with an agent that can use the document tools on a vault
    Chat {
        /// Agent id for the session
        #[arg(short, long, default_value = "default")]
        agent: String,

        /// Folder of notes the tools operate on
        #[arg(long)]
        vault: PathBuf,

        /// Allow mutating tools from the start
        #[arg(long)]
        approve: bool,
    },

    /// Show where the agent runtime and entry script were found
    Locate,

    /// Print the tool definitions as JSON
    Tools,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the conversation
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("notebridge={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => NotebridgeConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => NotebridgeConfig::default(),
    };

    match cli.command {
        Commands::Chat {
            agent,
            vault,
            approve,
        } => {
            run_chat(config, agent, vault, approve).await?;
        }
        Commands::Locate => {
            run_locate(&config);
        }
        Commands::Tools => {
            show_tools()?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn run_chat(mut config: NotebridgeConfig, agent: String, vault: PathBuf, approve: bool) -> Result<()> {
    if !vault.is_dir() {
        anyhow::bail!("vault {} is not a folder", vault.display());
    }
    config.tools.approved |= approve;

    let store = Arc::new(FsStore::with_trash_dir(&vault, &config.tools.trash_dir));
    let (dispatcher, approval) = ToolDispatcher::with_builtins(store, &config.tools)?;
    let manager = BridgeManager::new(config, Some(Arc::new(dispatcher)));

    let mut events = manager.subscribe();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BridgeEvent::Error { agent_id, message } => {
                    eprintln!("[{}] error: {}", agent_id, message);
                }
                BridgeEvent::Closed {
                    agent_id,
                    expected: false,
                    exit_code,
                } => {
                    eprintln!("[{}] agent exited unexpectedly ({:?})", agent_id, exit_code);
                }
                _ => {}
            }
        }
    });

    manager.connect(&agent).await?;
    tracing::info!(agent_id = %agent, vault = %vault.display(), "Connected. Type /approve, /revoke, or /quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/approve" => {
                approval.grant();
                println!("mutating tools approved");
                continue;
            }
            "/revoke" => {
                approval.revoke();
                println!("mutating tools need approval");
                continue;
            }
            _ => {}
        }

        if !manager.is_connected(&agent).await {
            manager.connect(&agent).await?;
        }

        // Ctrl+C abandons the current exchange, not the session
        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let exchange = manager
            .send_streaming(&agent, line, None, print_message, Some(cancel))
            .await;
        interrupt.abort();

        match exchange {
            Ok(exchange) => match exchange.completion {
                Completion::Assistant | Completion::Sentinel => {}
                Completion::IdleTimeout => eprintln!("(agent went quiet)"),
                Completion::Cancelled => eprintln!("(cancelled)"),
                Completion::Closed(reason) => eprintln!("(session closed: {})", reason),
            },
            Err(e) => eprintln!("error: {}", e),
        }
    }

    manager.shutdown().await;
    event_task.abort();
    Ok(())
}

fn print_message(message: &AgentMessage) {
    match message {
        AgentMessage::AssistantMessage { content } => {
            println!("{}", content.as_deref().unwrap_or(""));
        }
        AgentMessage::InternalMonologue { content } => {
            if let Some(content) = content {
                eprintln!("  … {}", content);
            }
        }
        AgentMessage::FunctionCall { function_call } => {
            eprintln!("  → {}", function_call.name);
        }
        AgentMessage::FunctionReturn { function_return } => {
            eprintln!(
                "  ← {}",
                function_return.status.as_deref().unwrap_or("returned")
            );
        }
        AgentMessage::UserMessage { .. } => {}
    }
}

fn run_locate(config: &NotebridgeConfig) {
    let locator = PathLocator::for_host(LocateSpec::from(&config.agent));

    println!("Agent discovery");
    println!();
    match locator.locate_runtime() {
        Some(path) => println!("  ✓ runtime: {}", path.display()),
        None => println!("  ✗ runtime '{}' not found", config.agent.runtime),
    }
    match locator.locate_entrypoint() {
        Some(path) => println!("  ✓ entrypoint: {}", path.display()),
        None => println!(
            "  ✗ entrypoint {}/{} not found",
            config.agent.package, config.agent.entry_script
        ),
    }

    let launch_locator = (!config.agent.disable_discovery).then_some(&locator);
    println!();
    println!("Launch command: {}", Launch::resolve(&config.agent, launch_locator).describe());
}

fn show_tools() -> Result<()> {
    let registry = notebridge::ToolRegistry::new();
    notebridge::tools::builtin::register_all(&registry)?;
    println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
    Ok(())
}

fn show_config(config: Option<&NotebridgeConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
