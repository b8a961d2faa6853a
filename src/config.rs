//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or an explicit path), then applies env
//! overrides: `USER_ID`, `SESSION_ID`, `SHORT_HISTORY_MAX`, `OPENAI_MODEL`,
//! `THREADMIND_LOG_LEVEL`. Secrets come from env only: `OPENAI_API_KEY`
//! (falling back to `LLM_API_KEY`) and `ZEP_API_KEY`.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::agent::history::DEFAULT_SHORT_HISTORY_MAX;
use crate::agent::thread::stable_thread_id;
use crate::error::AppError;
use crate::llm::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::memory::zep::DEFAULT_API_BASE_URL;

/// Conversation identity and short-term window.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub user_id: String,
    /// Explicit thread id; empty means "derive from `user_id`".
    pub session_id: String,
    pub short_history_max: usize,
}

/// OpenAI / OpenAI-compatible provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM configuration (`[llm]`).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider (`"openai"` or `"dummy"`). `default` in TOML.
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// Memory service configuration (`[memory]`).
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// When `false`, memory is disabled even if an API key is present.
    pub enabled: bool,
    pub api_base_url: String,
    pub timeout_seconds: u64,
    /// Context template id; `None` uses the service default.
    pub template_id: Option<String>,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Optional log file (already expanded, no `~`). Logs go to stderr when unset.
    pub log_file: Option<PathBuf>,
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    /// Completion API key. Never sourced from TOML.
    pub llm_api_key: Option<String>,
    /// Memory API key. Never sourced from TOML.
    pub memory_api_key: Option<String>,
}

impl Config {
    /// Model identifier used for completions.
    pub fn model(&self) -> &str {
        &self.llm.openai.model
    }

    /// Thread id for this run, derived from user and session ids.
    pub fn thread_id(&self) -> String {
        stable_thread_id(&self.agent.user_id, &self.agent.session_id)
    }
}

/// Values that take precedence over the TOML file.
/// Tests build this directly instead of mutating env vars.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub short_history_max: Option<String>,
    pub model: Option<String>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub memory_api_key: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            user_id: env::var("USER_ID").ok(),
            session_id: env::var("SESSION_ID").ok(),
            short_history_max: env::var("SHORT_HISTORY_MAX").ok(),
            model: env::var("OPENAI_MODEL").ok(),
            log_level: env::var("THREADMIND_LOG_LEVEL").ok(),
            llm_api_key: env::var("OPENAI_API_KEY").or_else(|_| env::var("LLM_API_KEY")).ok(),
            memory_api_key: env::var("ZEP_API_KEY").ok(),
        }
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    agent: RawAgent,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    memory: RawMemory,
}

#[derive(Deserialize)]
struct RawAgent {
    #[serde(default = "default_user_id")]
    user_id: String,
    #[serde(default)]
    session_id: String,
    #[serde(default = "default_short_history_max")]
    short_history_max: usize,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

impl Default for RawAgent {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            session_id: String::new(),
            short_history_max: default_short_history_max(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_llm_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawMemory {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_memory_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_memory_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default)]
    template_id: String,
}

impl Default for RawMemory {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base_url: default_memory_api_base_url(),
            timeout_seconds: default_memory_timeout_seconds(),
            template_id: String::new(),
        }
    }
}

fn default_user_id() -> String { "default_user".to_string() }
fn default_short_history_max() -> usize { DEFAULT_SHORT_HISTORY_MAX }
fn default_log_level() -> String { "info".to_string() }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_temperature() -> f32 { DEFAULT_TEMPERATURE }
fn default_max_tokens() -> u32 { DEFAULT_MAX_TOKENS }
fn default_llm_timeout_seconds() -> u64 { 60 }
fn default_memory_api_base_url() -> String { DEFAULT_API_BASE_URL.to_string() }
fn default_memory_timeout_seconds() -> u64 { 30 }
fn default_true() -> bool { true }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `config_path`, or `config/default.toml`, then apply env overrides.
/// Without an explicit path and without `config/default.toml`, built-in defaults are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = Overrides::from_env();

    if let Some(path) = config_path {
        return load_from(Path::new(path), overrides);
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(default_path, overrides)
    } else {
        resolve(RawConfig::default(), overrides)
    }
}

/// Load from an explicit path with the given overrides.
pub fn load_from(path: &Path, overrides: Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    resolve(parsed, overrides)
}

fn resolve(parsed: RawConfig, overrides: Overrides) -> Result<Config, AppError> {
    let a = parsed.agent;

    let short_history_max = match overrides.short_history_max.as_deref() {
        Some(s) => s.trim().parse::<usize>().map_err(|e| {
            AppError::Config(format!("invalid SHORT_HISTORY_MAX '{s}': {e}"))
        })?,
        None => a.short_history_max,
    };

    let user_id = overrides.user_id.unwrap_or(a.user_id);
    if user_id.trim().is_empty() {
        return Err(AppError::Config("user_id must not be empty".into()));
    }

    let mut openai = OpenAiConfig {
        api_base_url: parsed.llm.openai.api_base_url,
        model: parsed.llm.openai.model,
        temperature: parsed.llm.openai.temperature,
        max_tokens: parsed.llm.openai.max_tokens,
        timeout_seconds: parsed.llm.openai.timeout_seconds,
    };
    if let Some(model) = overrides.model.filter(|m| !m.is_empty()) {
        openai.model = model;
    }

    let template_id = Some(parsed.memory.template_id).filter(|t| !t.is_empty());

    Ok(Config {
        log_level: overrides.log_level.unwrap_or(a.log_level),
        log_file: a.log_file.as_deref().map(expand_home),
        agent: AgentConfig {
            user_id,
            session_id: overrides.session_id.unwrap_or(a.session_id),
            short_history_max,
        },
        llm: LlmConfig { provider: parsed.llm.provider, openai },
        memory: MemoryConfig {
            enabled: parsed.memory.enabled,
            api_base_url: parsed.memory.api_base_url,
            timeout_seconds: parsed.memory.timeout_seconds,
            template_id,
        },
        llm_api_key: overrides.llm_api_key.filter(|k| !k.is_empty()),
        memory_api_key: overrides.memory_api_key.filter(|k| !k.is_empty()),
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: dummy LLM, no API keys, no external calls.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            log_level: "info".into(),
            log_file: None,
            agent: AgentConfig {
                user_id: "test_user".into(),
                session_id: String::new(),
                short_history_max: DEFAULT_SHORT_HISTORY_MAX,
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    max_tokens: 16,
                    timeout_seconds: 1,
                },
            },
            memory: MemoryConfig {
                enabled: false,
                api_base_url: "http://localhost:0/api/v2".into(),
                timeout_seconds: 1,
                template_id: None,
            },
            llm_api_key: None,
            memory_api_key: None,
        }
    }
}
