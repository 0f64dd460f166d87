// ABOUTME: Agent client abstraction: named conversations yielding typed message streams
// ABOUTME: ClaudeCli is the production client; tests plug in scripted clients

mod claude_cli;

pub use claude_cli::{ClaudeCli, ClaudeCliConfig};

use crate::error::AgentError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Lazy, finite sequence of messages for one turn. An `Err` item ends the turn.
pub type MessageStream = BoxStream<'static, Result<AgentMessage, AgentError>>;

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub prompt: String,
    /// Caller-chosen conversation name (the session id)
    pub conversation: String,
    /// Agent-side conversation id to continue, if known
    pub resume: Option<String>,
    /// Directory the agent works in; `None` means the process's current directory
    pub working_dir: Option<PathBuf>,
}

impl QueryRequest {
    pub fn new(prompt: impl Into<String>, conversation: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            conversation: conversation.into(),
            resume: None,
            working_dir: None,
        }
    }

    pub fn resume(mut self, agent_id: Option<String>) -> Self {
        self.resume = agent_id;
        self
    }

    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }
}

/// Typed message emitted by the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentMessage {
    /// Lifecycle notice; `init` carries the agent's conversation id
    System {
        subtype: String,
        session_id: Option<String>,
    },
    /// Assistant output, in block order
    Assistant { content: Vec<ContentBlock> },
    /// Tool results and other user-role echoes
    User,
    /// Final message of a successful turn
    Result {
        text: Option<String>,
        session_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    Thinking,
    ToolUse { name: String },
    Other,
}

impl AgentMessage {
    /// Concatenated text blocks of an assistant message
    pub fn text(&self) -> Option<String> {
        match self {
            AgentMessage::Assistant { content } => {
                let text: String = content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text(t) => Some(t.as_str()),
                        _ => None,
                    })
                    .collect();
                Some(text)
            }
            _ => None,
        }
    }

    /// Agent-side conversation id, when this message reports one
    pub fn session_id(&self) -> Option<&str> {
        match self {
            AgentMessage::System { session_id, .. }
            | AgentMessage::Result { session_id, .. } => session_id.as_deref(),
            _ => None,
        }
    }
}

/// An agent service that runs conversation turns.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Start (or resume) a conversation turn. Firing `cancel` closes the
    /// stream and releases whatever the client holds for the turn.
    async fn query(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<MessageStream, AgentError>;
}

/// Drain a stream, returning all assistant text
pub async fn collect_text(mut stream: MessageStream) -> Result<String, AgentError> {
    let mut response = String::new();
    while let Some(message) = stream.next().await {
        if let Some(text) = message?.text() {
            response.push_str(&text);
        }
    }
    Ok(response)
}
