use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Accepts the usual spellings: `1/0`, `true/false`, `yes/no`, `on/off`.
fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        None => default,
    }
}

fn profiled_env_list(profile: &str, key: &str) -> Vec<String> {
    profiled_env_opt(profile, key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub agent: AgentConfig,
    pub wikidata: WikidataConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `ASKDB_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("ASKDB_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            llm: LlmConfig::from_env_profiled(p),
            database: DatabaseConfig::from_env_profiled(p),
            agent: AgentConfig::from_env_profiled(p),
            wikidata: WikidataConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject combinations that cannot produce a working session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agent.validate()?;
        self.llm.validate()
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  llm:       provider={}, model={}, planning_model={}, key={}",
            self.llm.provider,
            self.llm.model,
            self.llm.planning_model,
            if self.llm.is_configured() { "set" } else { "(none)" }
        );
        tracing::info!(
            "  database:  uri={}, startup_tables={}",
            self.database.uri,
            self.database.tables.len()
        );
        tracing::info!(
            "  agent:     max_iterations={}, wikidata={}, clarification={}, research={}, terminate={}",
            self.agent.max_iterations,
            self.agent.enable_wikidata,
            self.agent.enable_clarification,
            self.agent.enable_research,
            self.agent.enable_terminate
        );
    }

    /// Return a redacted view safe for display (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "llm": {
                "provider": self.llm.provider,
                "model": self.llm.model,
                "planning_model": self.llm.planning_model,
                "configured": self.llm.is_configured(),
            },
            "database": { "uri": self.database.uri, "tables": self.database.tables },
            "agent": self.agent,
            "wikidata": { "url": self.wikidata.url },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            llm: LlmConfig::default(),
            database: DatabaseConfig::default(),
            agent: AgentConfig::default(),
            wikidata: WikidataConfig::default(),
        }
    }
}

// ── LLM (OpenAI / Anthropic / Ollama) ─────────────────────────

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PLANNING_MODEL: &str = "o3-mini";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai", "anthropic", "ollama"
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub ollama_url: String,
    /// Model used for ordinary agent turns.
    pub model: String,
    /// Model used by the research/planning consultation.
    pub planning_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "openai").to_lowercase(),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_base_url: profiled_env_opt(p, "ANTHROPIC_BASE_URL"),
            ollama_url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            model: profiled_env_or(p, "ASKDB_MODEL_NAME", DEFAULT_MODEL),
            planning_model: profiled_env_or(p, "ASKDB_PLANNING_MODEL_NAME", DEFAULT_PLANNING_MODEL),
            temperature: profiled_env_or(p, "LLM_TEMPERATURE", "0.0")
                .parse()
                .unwrap_or(0.0),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 4096),
            timeout_secs: profiled_env_u64(p, "LLM_TIMEOUT_SECONDS", 120),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.is_some(),
            "anthropic" | "claude" => self.anthropic_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let key = match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            "anthropic" | "claude" => "ANTHROPIC_API_KEY",
            "ollama" => return Ok(()),
            other => return Err(ConfigError::UnknownProvider(other.to_string())),
        };
        if self.is_configured() {
            Ok(())
        } else {
            Err(ConfigError::MissingApiKey {
                provider: self.provider.clone(),
                key,
            })
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            openai_api_key: None,
            openai_base_url: None,
            anthropic_api_key: None,
            anthropic_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: DEFAULT_MODEL.to_string(),
            planning_model: DEFAULT_PLANNING_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

// ── Database ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `:memory:` or a path / `sqlite:` URL.
    pub uri: String,
    /// Files or URLs loaded when a session starts.
    pub tables: Vec<String>,
    /// Record every executed query in a `query_log` table.
    pub query_log: bool,
}

impl DatabaseConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            uri: profiled_env_or(p, "ASKDB_DATABASE_URI", ":memory:"),
            tables: profiled_env_list(p, "ASKDB_TABLES"),
            query_log: profiled_env_bool(p, "ASKDB_QUERY_LOG", false),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: ":memory:".to_string(),
            tables: Vec::new(),
            query_log: false,
        }
    }
}

// ── Agent session ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub enable_wikidata: bool,
    pub enable_clarification: bool,
    pub enable_research: bool,
    pub enable_terminate: bool,
    pub max_iterations: usize,
    /// How many trailing transcript messages the research tool sees.
    pub research_window: usize,
    pub verbose: bool,
}

impl AgentConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            enable_wikidata: profiled_env_bool(p, "ASKDB_ENABLE_WIKIDATA", true),
            enable_clarification: profiled_env_bool(p, "ASKDB_ENABLE_HUMAN_CLARIFICATION", true),
            enable_research: profiled_env_bool(p, "ASKDB_ENABLE_RESEARCH", false),
            enable_terminate: profiled_env_bool(p, "ASKDB_ENABLE_TERMINATE", false),
            max_iterations: profiled_env_u32(p, "ASKDB_MAX_ITERATIONS", 20) as usize,
            research_window: profiled_env_u32(p, "ASKDB_RESEARCH_WINDOW", 8) as usize,
            verbose: profiled_env_bool(p, "ASKDB_VERBOSE", false),
        }
    }

    /// Settings that must hold whichever gateway the session uses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                key: "ASKDB_MAX_ITERATIONS",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enable_wikidata: true,
            enable_clarification: true,
            enable_research: false,
            enable_terminate: false,
            max_iterations: 20,
            research_window: 8,
            verbose: false,
        }
    }
}

// ── Wikidata ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikidataConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl WikidataConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "WIKIDATA_URL", "https://query.wikidata.org/sparql"),
            timeout_secs: profiled_env_u64(p, "WIKIDATA_TIMEOUT_SECONDS", 60),
        }
    }
}

impl Default for WikidataConfig {
    fn default() -> Self {
        Self {
            url: "https://query.wikidata.org/sparql".to_string(),
            timeout_secs: 60,
        }
    }
}
