use crate::tool::ToolCall;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A message in the conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Behavioral prompt or runtime instruction
    System(String),
    /// User's text input
    User(String),
    /// Assistant's response (may contain text and/or tool calls)
    Assistant(AssistantContent),
    /// Result of a tool execution
    Tool(ToolResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Content from the assistant that can contain mixed text and tool calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantContent {
    /// Free text, `None` when the message only carries tool calls
    pub text: Option<String>,
    /// Tool calls requested by the assistant, in the order issued
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls,
        }
    }

    /// Text content, ignoring empty or whitespace-only strings.
    pub fn visible_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Result of a tool execution, correlated to the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Must match the ToolCall id
    pub tool_call_id: String,
    /// Name of the tool that was called
    pub name: String,
    pub content: String,
}

impl Message {
    pub fn role(&self) -> Role {
        match self {
            Message::System(_) => Role::System,
            Message::User(_) => Role::User,
            Message::Assistant(_) => Role::Assistant,
            Message::Tool(_) => Role::Tool,
        }
    }

    /// Plain text carried by the message, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::System(text) | Message::User(text) => Some(text),
            Message::Assistant(content) => content.text.as_deref(),
            Message::Tool(result) => Some(&result.content),
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant(content) => &content.tool_calls,
            _ => &[],
        }
    }

    fn approximate_len(&self) -> usize {
        match self {
            Message::System(text) | Message::User(text) => text.len(),
            Message::Assistant(content) => {
                content.text.as_ref().map_or(0, |t| t.len())
                    + content
                        .tool_calls
                        .iter()
                        .map(|tc| tc.name.len() + tc.arguments.len())
                        .sum::<usize>()
            }
            Message::Tool(result) => result.content.len(),
        }
    }
}

/// Append-only conversation history shared between the loop and the LLM.
///
/// There is no removal API: the only way to change the transcript is to push
/// another message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_system(&mut self, text: impl Into<String>) {
        self.messages.push(Message::System(text.into()));
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::User(text.into()));
    }

    pub fn push_assistant(&mut self, content: AssistantContent) {
        self.messages.push(Message::Assistant(content));
    }

    /// Append the result for `call`, copying its id and name.
    pub fn push_tool_result(&mut self, call: &ToolCall, content: impl Into<String>) {
        self.messages.push(Message::Tool(ToolResult {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
        }));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The last `n` messages (all of them when fewer exist).
    pub fn tail(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Approximate token count using character count / 4 heuristic.
    pub fn approximate_tokens(&self) -> usize {
        self.messages.iter().map(Message::approximate_len).sum::<usize>() / 4
    }

    /// Check that every tool result answers exactly one unresolved call issued
    /// by the nearest preceding assistant message.
    pub fn validate(&self) -> Result<(), TranscriptError> {
        let mut pending: HashSet<&str> = HashSet::new();
        let mut resolved: HashSet<&str> = HashSet::new();

        for (index, message) in self.messages.iter().enumerate() {
            match message {
                Message::Assistant(content) => {
                    pending.clear();
                    resolved.clear();
                    for call in &content.tool_calls {
                        if !pending.insert(call.id.as_str()) {
                            return Err(TranscriptError::DuplicateCallId {
                                index,
                                id: call.id.clone(),
                            });
                        }
                    }
                }
                Message::Tool(result) => {
                    let id = result.tool_call_id.as_str();
                    if resolved.contains(id) {
                        return Err(TranscriptError::DuplicateResult {
                            index,
                            id: result.tool_call_id.clone(),
                        });
                    }
                    if !pending.remove(id) {
                        return Err(TranscriptError::OrphanResult {
                            index,
                            id: result.tool_call_id.clone(),
                        });
                    }
                    resolved.insert(id);
                }
                Message::System(_) | Message::User(_) => {
                    pending.clear();
                    resolved.clear();
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum TranscriptError {
    #[error("message {index}: tool result '{id}' does not answer a pending call")]
    OrphanResult { index: usize, id: String },
    #[error("message {index}: call '{id}' already has a result")]
    DuplicateResult { index: usize, id: String },
    #[error("message {index}: call id '{id}' issued twice in one message")]
    DuplicateCallId { index: usize, id: String },
}
