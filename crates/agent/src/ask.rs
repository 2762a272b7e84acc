//! One-shot helpers: build an agent, ask one question, return the summary.

use std::sync::Arc;

use askdb_core::Config;
use askdb_tool_runtime::{Answer, TurnOutcome};
use askdb_warehouse::SqliteWarehouse;

use crate::agent::AgentBuilder;
use crate::error::AgentError;

/// Load `source` (file or URL) into a fresh in-memory database and answer
/// `question` about it.
pub async fn ask_file(question: &str, source: &str, config: &Config) -> Result<String, AgentError> {
    ask_once(sourced_builder(config, source).await?, question).await
}

/// Attach the SQLite database at `uri` and answer `question` about it.
pub async fn ask_database(question: &str, uri: &str, config: &Config) -> Result<String, AgentError> {
    ask_once(sourced_builder(config, uri).await?, question).await
}

/// Answer `question` with the knowledge graph tool enabled.
pub async fn ask_wikidata(question: &str, config: &Config) -> Result<String, AgentError> {
    let mut config = config.clone();
    config.agent.enable_wikidata = true;
    let builder = one_shot_builder(&config).await?;
    ask_once(builder, question).await
}

/// A builder over an empty in-memory warehouse, ignoring configured startup
/// tables.
async fn one_shot_builder(config: &Config) -> Result<AgentBuilder, AgentError> {
    let mut config = config.clone();
    config.database.tables.clear();
    let engine = Arc::new(SqliteWarehouse::in_memory().await?);
    Ok(AgentBuilder::new(config).engine(engine))
}

async fn sourced_builder(config: &Config, source: &str) -> Result<AgentBuilder, AgentError> {
    Ok(one_shot_builder(config).await?.source(source))
}

async fn ask_once(builder: AgentBuilder, question: &str) -> Result<String, AgentError> {
    let mut agent = builder.build().await?;
    match agent.ask(question).await? {
        TurnOutcome::Terminated { message } => Err(AgentError::Terminated(message)),
        outcome => Ok(outcome
            .answer()
            .map(Answer::summary_or_text)
            .unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_tool_runtime::testing::ScriptedGateway;
    use askdb_tool_runtime::SqlEngine;
    use serde_json::json;

    fn config() -> Config {
        let mut config = Config::default();
        config.agent.enable_wikidata = false;
        config.agent.enable_clarification = false;
        config
    }

    #[tokio::test]
    async fn test_one_shot_returns_summary_of_loaded_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "name,age\nann,31\nbob,45\n").unwrap();

        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_call("c1", "execute_sql", json!({"query": "SELECT max(age) FROM people"}));
        gateway.push_call("c2", "answer", json!({"summary": "The oldest person is 45", "detail": "max(age)"}));

        let builder = one_shot_builder(&config())
            .await
            .unwrap()
            .gateway(gateway.clone())
            .source(path.to_str().unwrap());
        let summary = ask_once(builder, "How old is the oldest person?").await.unwrap();

        assert_eq!(summary, "The oldest person is 45");
        let requests = gateway.requests();
        let last = requests.last().unwrap();
        let result = last.messages.iter().rev().find_map(|m| match m {
            askdb_tool_runtime::Message::Tool(r) if r.tool_call_id == "c1" => Some(r.content.clone()),
            _ => None,
        });
        assert!(result.unwrap().contains("45"));
    }

    #[tokio::test]
    async fn test_database_is_attached_and_queried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chinook.db");
        {
            let db = SqliteWarehouse::open(path.to_str().unwrap()).await.unwrap();
            db.query("CREATE TABLE tracks (name TEXT, ms INTEGER)").await.unwrap();
            db.query("INSERT INTO tracks VALUES ('a', 1000), ('b', 2000), ('c', 3000)")
                .await
                .unwrap();
        }

        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_call("c1", "execute_sql", json!({"query": "SELECT count(*) FROM chinook.tracks"}));
        gateway.push_call("c2", "answer", json!({"summary": "There are 3 tracks", "detail": "count"}));

        let builder = sourced_builder(&config(), path.to_str().unwrap())
            .await
            .unwrap()
            .gateway(gateway.clone());
        let summary = ask_once(builder, "How many tracks?").await.unwrap();
        assert_eq!(summary, "There are 3 tracks");

        let requests = gateway.requests();
        let messages = &requests.last().unwrap().messages;
        let listing = messages.iter().find_map(|m| match m {
            askdb_tool_runtime::Message::Tool(r) if r.content.contains("tracks") => Some(r.content.clone()),
            _ => None,
        });
        assert!(listing.unwrap().contains("chinook"));
        let count = messages.iter().find_map(|m| match m {
            askdb_tool_runtime::Message::Tool(r) if r.tool_call_id == "c1" => Some(r.content.clone()),
            _ => None,
        });
        let count = count.unwrap();
        assert!(count.contains('3'), "{count}");
        assert!(!count.contains("no such table"));
    }

    #[tokio::test]
    async fn test_unstructured_answer_returns_raw_text() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_raw_call("c1", "answer", "forty-two");

        let builder = one_shot_builder(&config()).await.unwrap().gateway(gateway);
        let text = ask_once(builder, "?").await.unwrap();
        assert_eq!(text, askdb_tool_runtime::dispatch::INVALID_ARGUMENTS);
    }

    #[tokio::test]
    async fn test_configured_startup_tables_are_ignored() {
        let mut config = config();
        config.database.tables = vec!["/nowhere/missing.csv".to_string()];
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_call("c1", "answer", json!({"summary": "ok", "detail": "-"}));

        let builder = one_shot_builder(&config).await.unwrap().gateway(gateway);
        assert_eq!(ask_once(builder, "?").await.unwrap(), "ok");
    }
}
