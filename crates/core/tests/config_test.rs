//! Environment-driven configuration tests for askdb-core.

use std::env;
use std::sync::Mutex;

use askdb_core::{Config, ConfigError};

// Env-based tests must run serially to avoid interfering with each other.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    let keys = [
        "ASKDB_PROFILE",
        "LLM_PROVIDER",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "ASKDB_MODEL_NAME",
        "ASKDB_PLANNING_MODEL_NAME",
        "ASKDB_DATABASE_URI",
        "ASKDB_TABLES",
        "ASKDB_QUERY_LOG",
        "ASKDB_ENABLE_WIKIDATA",
        "ASKDB_ENABLE_HUMAN_CLARIFICATION",
        "ASKDB_ENABLE_RESEARCH",
        "ASKDB_MAX_ITERATIONS",
        "ASKDB_VERBOSE",
        "STAGING_ASKDB_MODEL_NAME",
        "STAGING_OPENAI_API_KEY",
    ];
    for k in keys {
        env::remove_var(k);
    }
}

// ── Defaults ─────────────────────────────────────────────────────────

#[test]
fn test_defaults_without_env() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = Config::from_env();

    assert_eq!(cfg.profile_label(), "default");
    assert_eq!(cfg.llm.provider, "openai");
    assert_eq!(cfg.llm.model, "gpt-4o-mini");
    assert_eq!(cfg.llm.planning_model, "o3-mini");
    assert_eq!(cfg.database.uri, ":memory:");
    assert!(cfg.database.tables.is_empty());
    assert!(cfg.agent.enable_wikidata);
    assert!(cfg.agent.enable_clarification);
    assert!(!cfg.agent.enable_research);
    assert_eq!(cfg.agent.max_iterations, 20);
}

#[test]
fn test_flags_and_table_list() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env();

    env::set_var("ASKDB_ENABLE_WIKIDATA", "false");
    env::set_var("ASKDB_ENABLE_RESEARCH", "yes");
    env::set_var("ASKDB_TABLES", "data/a.csv, https://example.com/b.parquet ,");
    env::set_var("ASKDB_MAX_ITERATIONS", "5");

    let cfg = Config::from_env();

    assert!(!cfg.agent.enable_wikidata);
    assert!(cfg.agent.enable_research);
    assert_eq!(cfg.agent.max_iterations, 5);
    assert_eq!(
        cfg.database.tables,
        vec!["data/a.csv".to_string(), "https://example.com/b.parquet".to_string()]
    );

    clear_env();
}

// ── Profiles ─────────────────────────────────────────────────────────

#[test]
fn test_profile_prefix_wins() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env();

    env::set_var("ASKDB_MODEL_NAME", "base-model");
    env::set_var("STAGING_ASKDB_MODEL_NAME", "staging-model");
    env::set_var("ASKDB_PROFILE", "staging");

    let cfg = Config::from_env();
    assert_eq!(cfg.profile, "STAGING");
    assert_eq!(cfg.llm.model, "staging-model");

    let base = Config::for_profile("");
    assert_eq!(base.llm.model, "base-model");

    clear_env();
}

// ── Validation ───────────────────────────────────────────────────────

#[test]
fn test_validate_requires_key_for_remote_provider() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = Config::from_env();
    assert_eq!(
        cfg.validate(),
        Err(ConfigError::MissingApiKey {
            provider: "openai".to_string(),
            key: "OPENAI_API_KEY"
        })
    );

    env::set_var("OPENAI_API_KEY", "sk-test");
    assert!(Config::from_env().validate().is_ok());

    env::set_var("LLM_PROVIDER", "mystery");
    assert!(matches!(
        Config::from_env().validate(),
        Err(ConfigError::UnknownProvider(p)) if p == "mystery"
    ));

    clear_env();
}

#[test]
fn test_validate_rejects_zero_budget() {
    let mut cfg = Config::default();
    cfg.llm.provider = "ollama".to_string();
    cfg.agent.max_iterations = 0;
    assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));
}

#[test]
fn test_redacted_summary_hides_keys() {
    let mut cfg = Config::default();
    cfg.llm.openai_api_key = Some("sk-secret".to_string());
    let summary = cfg.redacted_summary().to_string();
    assert!(!summary.contains("sk-secret"));
    assert!(summary.contains("gpt-4o-mini"));
}
