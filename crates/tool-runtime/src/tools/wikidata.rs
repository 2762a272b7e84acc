//! `wikidata`: run a SPARQL query against the public Wikidata endpoint.
//!
//! The raw response body is returned; parsing it gains nothing since the
//! model reads JSON directly.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tool::{str_arg, Tool, ToolContext, ToolError, ToolOutput, ToolSpec};

pub const DEFAULT_ENDPOINT: &str = "https://query.wikidata.org/sparql";

pub struct WikidataTool {
    client: reqwest::Client,
    endpoint: String,
}

impl WikidataTool {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("askdb/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "wikidata",
            "Useful for when you need specific data from Wikidata. Input is a single correct \
             SPARQL statement for Wikidata; limit all requests to 10 or fewer rows. Output is the \
             raw JSON response. If an error is returned, rewrite the query and try again. \
             Prefer local data before using this tool.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "A valid SPARQL query for Wikidata"
                    }
                },
                "required": ["query"]
            }),
        )
    }
}

#[async_trait]
impl Tool for WikidataTool {
    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let query = str_arg(&input, "query")?;
        debug!(endpoint = %self.endpoint, "Querying Wikidata");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("format", "json"), ("query", query)])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read response: {e}")))?;

        if status.is_success() {
            Ok(ToolOutput::Text(body))
        } else {
            Ok(ToolOutput::Text(format!(
                "Error: Wikidata returned {}\n{body}",
                status.as_u16()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Transcript;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the request head.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/sparql", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (url, handle)
    }

    async fn run(tool: &WikidataTool, query: &str) -> String {
        let transcript = Transcript::new();
        let ctx = ToolContext {
            transcript: &transcript,
            verbose: false,
        };
        match tool.execute(serde_json::json!({"query": query}), &ctx).await.unwrap() {
            ToolOutput::Text(text) => text,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_returns_raw_body_and_sends_format_param() {
        let (url, server) = serve_once("200 OK", r#"{"results":{"bindings":[]}}"#).await;
        let tool = WikidataTool::new(url, Duration::from_secs(5)).unwrap();

        let body = run(&tool, "SELECT ?x WHERE { ?x ?y ?z } LIMIT 1").await;
        let request = server.await.unwrap();

        assert_eq!(body, r#"{"results":{"bindings":[]}}"#);
        assert!(request.starts_with("GET /sparql?format=json&query=SELECT"));
        assert!(request.to_lowercase().contains("user-agent: askdb/"));
    }

    #[tokio::test]
    async fn test_error_status_is_readable_text() {
        let (url, server) = serve_once("400 Bad Request", "MalformedQueryException").await;
        let tool = WikidataTool::new(url, Duration::from_secs(5)).unwrap();

        let body = run(&tool, "SELEC nonsense").await;
        server.await.unwrap();

        assert!(body.starts_with("Error: Wikidata returned 400"));
        assert!(body.contains("MalformedQueryException"));
    }
}
