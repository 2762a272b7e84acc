//! Translation between the transcript types and the Claude API format.

use askdb_tool_runtime::{AssistantContent, LlmError, Message, ToolCall, ToolSpec};
use serde_json::{json, Value};

/// Opens the message list when the transcript starts with an assistant turn.
const SESSION_OPENER: &str = "Session started.";

pub(super) fn tool_spec_to_claude(spec: &ToolSpec) -> Value {
    json!({
        "name": spec.name,
        "description": spec.description,
        "input_schema": spec.parameters,
    })
}

/// Split the transcript into the top-level `system` text and the message list.
///
/// Leading system messages become the `system` field. Later ones (appended
/// context, budget notices) stay in place as user text. Adjacent messages
/// with the same role are merged, since the API requires alternation and
/// all results for one assistant turn must share a single user message.
/// Empty assistant replies are dropped, and the list always opens with a
/// user turn.
pub(super) fn messages_to_claude(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system: Vec<&str> = Vec::new();
    let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();
    let mut leading = true;

    for msg in messages {
        let (role, blocks) = match msg {
            Message::System(text) if leading => {
                system.push(text);
                continue;
            }
            Message::System(text) => ("user", vec![json!({"type": "text", "text": text})]),
            Message::User(text) => ("user", vec![json!({"type": "text", "text": text})]),
            Message::Assistant(content) => {
                let blocks = assistant_blocks(content);
                if blocks.is_empty() {
                    leading = false;
                    continue;
                }
                ("assistant", blocks)
            }
            Message::Tool(result) => (
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": result.tool_call_id,
                    "content": result.content,
                })],
            ),
        };
        leading = false;

        match turns.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => turns.push((role, blocks)),
        }
    }

    if matches!(turns.first(), Some(("assistant", _))) {
        turns.insert(0, ("user", vec![json!({"type": "text", "text": SESSION_OPENER})]));
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    let messages = turns
        .into_iter()
        .map(|(role, content)| json!({"role": role, "content": content}))
        .collect();
    (system, messages)
}

fn assistant_blocks(content: &AssistantContent) -> Vec<Value> {
    let mut blocks = Vec::new();
    if let Some(text) = content.text.as_deref().filter(|t| !t.is_empty()) {
        blocks.push(json!({"type": "text", "text": text}));
    }
    for tc in &content.tool_calls {
        // Claude requires an object; unparseable arguments go out empty.
        let input = serde_json::from_str::<Value>(&tc.arguments)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        blocks.push(json!({
            "type": "tool_use",
            "id": tc.id,
            "name": tc.name,
            "input": input,
        }));
    }
    blocks
}

/// Collect text and `tool_use` blocks from a Messages API response.
pub(super) fn parse_response(resp: &Value) -> Result<AssistantContent, LlmError> {
    let blocks = resp["content"]
        .as_array()
        .ok_or_else(|| LlmError::InvalidResponse("missing content array".into()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => {
                let id = block["id"]
                    .as_str()
                    .ok_or_else(|| LlmError::InvalidResponse("tool_use without id".into()))?;
                let name = block["name"]
                    .as_str()
                    .ok_or_else(|| LlmError::InvalidResponse("tool_use without name".into()))?;
                tool_calls.push(ToolCall::new(id, name, block["input"].to_string()));
            }
            _ => {}
        }
    }

    Ok(AssistantContent {
        text: (!text.is_empty()).then_some(text),
        tool_calls,
    })
}
