//! Configuration loading from tiller.toml.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use mcp::ServerConfig;
use runtime::{AgentConfig, ApiKey};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Completion backend.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Agent loop limits.
    #[serde(default)]
    pub agent: AgentSection,

    /// Tool servers to connect at startup.
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
}

/// Which completion service to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAi,
}

impl Provider {
    fn default_key_env(self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Backend provider configuration.
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Model to use.
    #[serde(default = "default_model")]
    pub model: String,

    /// Literal API key. Prefer `api_key_env` outside of local testing.
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,

    /// Response length cap passed to the provider.
    pub max_tokens: Option<u32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            api_key: None,
            api_key_env: None,
            max_tokens: None,
        }
    }
}

/// The `[agent]` table.
#[derive(Debug, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            step_timeout_secs: default_step_timeout_secs(),
        }
    }
}

/// One `[[servers]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    /// Session id; also the prefix of every tool the server hosts.
    pub name: String,

    /// Explicit launcher. Mutually exclusive with `script`.
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Script path (or `npx ...` line) whose launcher is inferred.
    pub script: Option<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Process environment variables copied into the server environment.
    #[serde(default)]
    pub forward_env: Vec<String>,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_steps() -> usize {
    10
}

fn default_step_timeout_secs() -> u64 {
    120
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Configuration used when no file exists: Anthropic plus a filesystem
    /// server rooted at `root`.
    pub fn default_config(root: &Path) -> Self {
        Self {
            backend: BackendConfig::default(),
            agent: AgentSection::default(),
            servers: vec![ServerEntry {
                name: "filesystem".to_string(),
                command: Some("npx".to_string()),
                args: vec![
                    "-y".to_string(),
                    "@modelcontextprotocol/server-filesystem".to_string(),
                    root.display().to_string(),
                ],
                script: None,
                env: HashMap::new(),
                forward_env: Vec::new(),
            }],
        }
    }

    /// Agent settings after command-line overrides.
    pub fn agent_config(&self, max_steps: Option<usize>, step_timeout_secs: Option<u64>) -> AgentConfig {
        AgentConfig::default()
            .with_model(&self.backend.model)
            .with_max_steps(max_steps.unwrap_or(self.agent.max_steps))
            .with_step_timeout(Duration::from_secs(
                step_timeout_secs.unwrap_or(self.agent.step_timeout_secs),
            ))
    }

    /// Resolve the completion credential.
    ///
    /// A literal `api_key` wins; otherwise the variable named by
    /// `api_key_env` (or the provider's default) is looked up.
    pub fn api_key(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<ApiKey, ConfigError> {
        if let Some(key) = &self.backend.api_key {
            return Ok(ApiKey::new(key.clone()));
        }

        let var = self
            .backend
            .api_key_env
            .as_deref()
            .unwrap_or(self.backend.provider.default_key_env());
        match lookup(var) {
            Some(key) if !key.trim().is_empty() => Ok(ApiKey::new(key)),
            _ => Err(ConfigError::MissingAuth {
                var: var.to_string(),
            }),
        }
    }

    /// Build launch configs for every server, with forwarded variables
    /// resolved through `lookup`.
    pub fn server_configs(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<ServerConfig>, ConfigError> {
        let mut seen = std::collections::HashSet::new();
        self.servers
            .iter()
            .map(|entry| {
                if !seen.insert(entry.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "server '{}' is listed twice",
                        entry.name
                    )));
                }
                entry.to_server_config(&lookup)
            })
            .collect()
    }
}

impl ServerEntry {
    fn to_server_config(
        &self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<ServerConfig, ConfigError> {
        let mut config = match (&self.command, &self.script) {
            (Some(command), None) => ServerConfig::new(&self.name, command, &self.args),
            (None, Some(script)) => ServerConfig::from_script(&self.name, script)
                .map_err(|e| ConfigError::Invalid(format!("server '{}': {e}", self.name)))?,
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(format!(
                    "server '{}': set either command or script, not both",
                    self.name
                )));
            }
            (None, None) => {
                return Err(ConfigError::Invalid(format!(
                    "server '{}': one of command or script is required",
                    self.name
                )));
            }
        };

        for (key, value) in &self.env {
            config = config.with_env(key, value);
        }
        for var in &self.forward_env {
            match lookup(var) {
                Some(value) => config = config.with_env(var, value),
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "server '{}' forwards {var}, which is not set",
                        self.name
                    )));
                }
            }
        }
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("no API key: set backend.api_key or the {var} environment variable")]
    MissingAuth { var: String },
}
