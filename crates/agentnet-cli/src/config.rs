use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use agentnet_core::RouterKind;
use agentnet_core::agent::{DEFAULT_MAX_CIRCLE, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE};
use agentnet_core::mailbox::DEFAULT_MAILBOX_CAPACITY;
use agentnet_core::providers::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_circle")]
    pub max_circle: usize,
    #[serde(default = "default_allow_tools")]
    pub allow_tools: bool,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub react: ReactConfig,
}

/// `[agent.react]`: build ReAct-style agents instead of plain chat agents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReactConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_circle", &self.max_circle)
            .field("allow_tools", &self.allow_tools)
            .field("system_prompt", &self.system_prompt)
            .field("react", &self.react)
            .finish()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}
fn default_max_circle() -> usize {
    DEFAULT_MAX_CIRCLE
}
fn default_allow_tools() -> bool {
    true
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    #[serde(default)]
    pub router: RouterKind,
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            router: RouterKind::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    /// Display name given to the model; defaults to the id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Replaces `agent.system_prompt` for this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl NodeConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub from: String,
    pub to: String,
    /// Also add the reverse edge
    #[serde(default)]
    pub bidirectional: bool,
}

/// Mask a secret string for safe display in Debug output / logs.
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agentnet")
}

impl NetConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `agentnet init` first.",
                path.display()
            )
        })?;

        let mut config = Self::parse(&content, &path)?;

        if config.agent.api_key.is_empty() {
            if let Ok(key) = std::env::var("AGENTNET_API_KEY") {
                config.agent.api_key = key;
            }
        } else if config.agent.api_key.starts_with("sk-") && !content.contains("${") {
            warn!(
                "API key is hardcoded in config file. For security, use environment variables: api_key = \"${{AGENTNET_API_KEY}}\""
            );
        }

        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        // Expand environment variables before parsing
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config at {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            bail!("at least one [[nodes]] entry is required");
        }
        if self.network.mailbox_capacity == 0 {
            bail!("network.mailbox_capacity must be at least 1");
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                bail!("node id must not be empty");
            }
            if !ids.insert(node.id.as_str()) {
                bail!("duplicate node id {:?}", node.id);
            }
        }
        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !ids.contains(end.as_str()) {
                    bail!("edge {} -> {} references unknown node {:?}", edge.from, edge.to, end);
                }
            }
        }
        Ok(())
    }

    /// The node a seed goes to when none is named: the first declared one
    pub fn entry_node(&self) -> Option<&NodeConfig> {
        self.nodes.first()
    }

    pub fn node(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Copy safe to print: the API key is masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.agent.api_key = mask_secret(&self.agent.api_key);
        copy
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &["AGENTNET_API_KEY", "OPENAI_API_KEY", "HOME", "USER"];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}
