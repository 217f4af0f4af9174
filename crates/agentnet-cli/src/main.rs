use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use agentnet_core::agent::DEFAULT_REACT_SYSTEM_PROMPT;
use agentnet_core::{
    AgentNet, AgentSettings, Capability, ChatAgent, CurrentTimeTool, LlmProvider, Message,
    OpenAiProvider, RouterKind, ToolHandler,
};

mod config;

use config::{NetConfig, NodeConfig};

#[derive(Parser)]
#[command(name = "agentnet")]
#[command(version)]
#[command(about = "agentnet: a directed graph of cooperating LLM agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,

    /// Build the configured network, seed it and let the agents talk
    Run {
        /// Text handed to the entry node
        #[arg(short, long)]
        seed: String,

        /// Node that receives the seed (defaults to the first configured node)
        #[arg(short, long)]
        entry: Option<String>,

        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Chat with a single configured agent
    Chat {
        /// Node whose persona to use (defaults to the first configured node)
        #[arg(short, long)]
        node: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Run {
            seed,
            entry,
            duration,
        } => cmd_run(&cli.config, &seed, entry, duration).await,
        Commands::Chat { node } => cmd_chat(&cli.config, node).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("agentnet initialized at {}", config_dir.display());
    println!(
        "Edit {} to describe your nodes and edges, and export AGENTNET_API_KEY.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = NetConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

fn build_provider(cfg: &NetConfig) -> Result<Arc<dyn LlmProvider>> {
    if cfg.agent.api_key.is_empty() {
        bail!("missing API key; set AGENTNET_API_KEY or agent.api_key in the config");
    }
    let provider = OpenAiProvider::new(
        cfg.agent.api_key.clone(),
        cfg.agent.model.clone(),
        cfg.agent.base_url.clone(),
    )?;
    Ok(Arc::new(provider))
}

fn build_agent(cfg: &NetConfig, node: &NodeConfig, provider: Arc<dyn LlmProvider>) -> ChatAgent {
    let (agent, default_prompt) = if cfg.agent.react.enabled {
        (ChatAgent::react(provider), DEFAULT_REACT_SYSTEM_PROMPT)
    } else {
        (ChatAgent::new(provider), cfg.agent.system_prompt.as_str())
    };
    let system_prompt = node
        .system_prompt
        .clone()
        .unwrap_or_else(|| default_prompt.to_string());

    agent
        .with_name(node.display_name())
        .with_description(node.description.clone())
        .with_system_prompt(system_prompt)
        .with_settings(AgentSettings {
            temperature: cfg.agent.temperature,
            max_circle: cfg.agent.max_circle,
            allow_tools: cfg.agent.allow_tools,
        })
        .with_tool(Arc::new(CurrentTimeTool))
}

/// Guidance telling a node who it can talk to
fn network_usage(cfg: &NetConfig, node: &NodeConfig) -> String {
    let mut peers: Vec<&str> = Vec::new();
    for edge in &cfg.edges {
        if edge.from == node.id {
            peers.push(&edge.to);
        }
        if edge.bidirectional && edge.to == node.id {
            peers.push(&edge.from);
        }
    }
    peers.sort_unstable();
    peers.dedup();

    let peers = if peers.is_empty() {
        "nobody".to_string()
    } else {
        peers.join(", ")
    };
    let delivery = match cfg.network.router {
        RouterKind::Smart => {
            "Your reply goes back to whoever messaged you, or to every node you can reach \
             when the message came from outside the network. \
             Use the send tool to address other nodes explicitly."
        }
        RouterKind::Default => {
            "Your reply is forwarded to every node you can reach. \
             Use the send tool to address specific nodes instead."
        }
    };
    format!(
        "You are node \"{}\" in a network of agents and can reach: {}. \
         Incoming text is prefixed with [Message from <id>]. {}",
        node.id, peers, delivery
    )
}

/// Prints every reply of the wrapped capability as it is produced
struct Transcript {
    node_id: String,
    inner: Arc<ChatAgent>,
}

#[async_trait]
impl Capability for Transcript {
    async fn invoke(&self, cancel: &CancellationToken, text: &str) -> Result<String> {
        let reply = self.inner.invoke(cancel, text).await?;
        if !reply.trim().is_empty() {
            println!("[{}] {}", self.node_id, reply);
        }
        Ok(reply)
    }

    fn register_action(&self, action: Arc<dyn ToolHandler>) {
        self.inner.register_action(action);
    }
}

async fn build_network(cfg: &NetConfig) -> Result<AgentNet> {
    let provider = build_provider(cfg)?;
    let net = AgentNet::with_mailbox_capacity(cfg.network.mailbox_capacity);
    net.set_shared_router(cfg.network.router.policy()).await;

    for node in &cfg.nodes {
        let agent = build_agent(cfg, node, provider.clone());
        agent.add_tool_usage(&network_usage(cfg, node));
        let capability = Arc::new(Transcript {
            node_id: node.id.clone(),
            inner: Arc::new(agent),
        });
        net.add_node(&node.id, capability)
            .await
            .with_context(|| format!("Failed to add node {}", node.id))?;
    }

    for edge in &cfg.edges {
        net.add_edge(&edge.from, &edge.to)
            .await
            .with_context(|| format!("Failed to add edge {} -> {}", edge.from, edge.to))?;
        if edge.bidirectional {
            net.add_edge(&edge.to, &edge.from)
                .await
                .with_context(|| format!("Failed to add edge {} -> {}", edge.to, edge.from))?;
        }
    }

    info!(
        "Built network: {} node(s), {} edge(s), router {}",
        net.node_count().await,
        net.edges().await.len(),
        cfg.network.router
    );
    Ok(net)
}

async fn cmd_run(
    config_path: &Option<PathBuf>,
    seed: &str,
    entry: Option<String>,
    duration: Option<u64>,
) -> Result<()> {
    let cfg = NetConfig::load(config_path)?;
    let entry = match entry {
        Some(id) => id,
        None => cfg
            .entry_node()
            .map(|n| n.id.clone())
            .context("No nodes configured")?,
    };
    if cfg.node(&entry).is_none() {
        bail!("Entry node {:?} is not configured", entry);
    }

    let net = build_network(&cfg).await?;
    let cancel = CancellationToken::new();
    net.start(&cancel).await;

    net.inject(&entry, "", vec![Message::user(seed)])
        .await
        .with_context(|| format!("Failed to seed node {}", entry))?;
    info!("Seeded node {}", entry);

    match duration {
        Some(secs) => {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received Ctrl+C");
                }
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("Run time of {}s elapsed", secs);
                }
            }
        }
        None => {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C");
        }
    }

    cancel.cancel();
    net.stop().await;
    Ok(())
}

async fn cmd_chat(config_path: &Option<PathBuf>, node: Option<String>) -> Result<()> {
    let cfg = NetConfig::load(config_path)?;
    let node_cfg = match &node {
        Some(id) => cfg
            .node(id)
            .with_context(|| format!("Node {:?} is not configured", id))?,
        None => cfg.entry_node().context("No nodes configured")?,
    };
    let agent = build_agent(&cfg, node_cfg, build_provider(&cfg)?);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    println!(
        "Chatting with {}. Type 'exit' to quit.",
        node_cfg.display_name()
    );
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "exit" || text == "quit" {
            break;
        }

        match agent.invoke(&cancel, text).await {
            Ok(reply) => {
                println!("Agent> {}", reply);
                agent.add_memory(&reply);
            }
            Err(e) if cancel.is_cancelled() => {
                info!("Interrupted: {:#}", e);
                break;
            }
            Err(e) => error!("Agent error: {:#}", e),
        }
    }

    println!();
    Ok(())
}
