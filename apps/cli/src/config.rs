//! CLI configuration file support.
//!
//! Configuration precedence:
//! 1. `BRAID_<PLATFORM>_TOKEN` environment variables (tokens only)
//! 2. Local config file (./.braidrc)
//! 3. Global config file (~/.braid/config.toml)
//! 4. Defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use braid_abstraction::{ClientType, Platform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BraidConfig {
    /// System prompt applied to every platform that does not set its own.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Platform tables keyed by provider name (openai, anthropic, google,
    /// groq, ollama, openrouter, custom).
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformEntry>,

    /// MCP server entries.
    #[serde(default)]
    pub mcp: McpConfig,
}

/// One provider's settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEntry {
    /// Whether this platform participates in chat fan-out.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Model identifier to request.
    pub model: String,

    /// API base URL override.
    #[serde(default)]
    pub api_url: Option<String>,

    /// API token. `BRAID_<PLATFORM>_TOKEN` takes precedence when set.
    #[serde(default)]
    pub token: Option<String>,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Nucleus sampling mass.
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Maximum tokens to generate.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// System prompt for this platform only.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Use the OpenAI Responses API instead of chat/completions.
    #[serde(default)]
    pub responses_api: bool,

    /// Cap on tool-call loop iterations within one turn.
    #[serde(default)]
    pub max_tool_iterations: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

/// MCP configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    /// Server entries keyed by server name.
    #[serde(default)]
    pub servers: BTreeMap<String, McpServerEntry>,
}

/// One MCP server entry.
///
/// The CLI does not open the transport itself; entries describe servers an
/// external launcher connects and registers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerEntry {
    /// Whether this server's tools are offered to models.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Restrict which of the server's tools are advertised. `None` allows all.
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,

    /// Launcher command line.
    #[serde(default)]
    pub command: Option<String>,

    /// Launcher arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    Read(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    Parse(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl BraidConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".braid")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".braidrc")
    }

    /// Discover and load configuration files.
    ///
    /// Loads the global config (~/.braid/config.toml), then the local config
    /// (./.braidrc). Local entries override global ones.
    pub fn discover_and_load() -> Self {
        let mut config = Self::default();

        if let Ok(global) = Self::load_from_file(&Self::default_global_path()) {
            config.merge(global);
        }

        if let Ok(local) = Self::load_from_file(&Self::default_local_path()) {
            config.merge(local);
        }

        config
    }

    /// Merge another configuration into this one.
    ///
    /// Whole platform and server entries from `other` replace same-named
    /// entries in `self`.
    pub fn merge(&mut self, other: Self) {
        if other.system_prompt.is_some() {
            self.system_prompt = other.system_prompt;
        }
        self.platforms.extend(other.platforms);
        self.mcp.servers.extend(other.mcp.servers);
    }

    /// All configured platforms in provider-name order, enabled or not.
    pub fn all_platforms(&self) -> ConfigResult<Vec<Platform>> {
        self.platforms
            .iter()
            .map(|(name, entry)| self.to_platform(name, entry))
            .collect()
    }

    /// The platforms that participate in chat fan-out.
    pub fn enabled_platforms(&self) -> ConfigResult<Vec<Platform>> {
        Ok(self.all_platforms()?.into_iter().filter(|p| p.enabled).collect())
    }

    /// Build the settings snapshot for one platform entry.
    fn to_platform(&self, name: &str, entry: &PlatformEntry) -> ConfigResult<Platform> {
        let client_type = parse_client_type(name)?;

        let mut platform = Platform::new(client_type, &entry.model);
        platform.enabled = entry.enabled;

        if let Some(api_url) = &entry.api_url {
            platform = platform.with_api_url(api_url);
        } else if client_type == ClientType::Custom {
            return Err(ConfigError::InvalidValue(
                "platform 'custom' requires api_url".to_string(),
            ));
        }
        if let Some(token) = env_token(client_type).or_else(|| entry.token.clone()) {
            platform = platform.with_token(token);
        }
        if let Some(temperature) = entry.temperature {
            platform = platform.with_temperature(temperature);
        }
        if let Some(top_p) = entry.top_p {
            platform = platform.with_top_p(top_p);
        }
        if let Some(max_tokens) = entry.max_tokens {
            platform = platform.with_max_tokens(max_tokens);
        }
        if let Some(prompt) = entry.system_prompt.as_ref().or(self.system_prompt.as_ref()) {
            platform = platform.with_system_prompt(prompt);
        }
        if let Some(max_tool_iterations) = entry.max_tool_iterations {
            platform = platform.with_max_tool_iterations(max_tool_iterations);
        }
        platform = platform.with_responses_api(entry.responses_api);

        Ok(platform)
    }
}

/// The environment variable that overrides a platform's configured token.
pub fn token_env_var(client_type: ClientType) -> String {
    format!("BRAID_{}_TOKEN", client_type.to_string().to_uppercase())
}

fn env_token(client_type: ClientType) -> Option<String> {
    std::env::var(token_env_var(client_type)).ok().filter(|token| !token.is_empty())
}

fn parse_client_type(name: &str) -> ConfigResult<ClientType> {
    match name {
        "openai" => Ok(ClientType::OpenAi),
        "anthropic" => Ok(ClientType::Anthropic),
        "google" => Ok(ClientType::Google),
        "groq" => Ok(ClientType::Groq),
        "ollama" => Ok(ClientType::Ollama),
        "openrouter" => Ok(ClientType::OpenRouter),
        "custom" => Ok(ClientType::Custom),
        other => Err(ConfigError::InvalidValue(format!(
            "unknown provider '{}' (expected openai, anthropic, google, groq, ollama, openrouter, or custom)",
            other
        ))),
    }
}
