// ABOUTME: Agent client that drives the claude CLI with --output-format stream-json
// ABOUTME: Parses JSON lines from stdout into AgentMessages; one child process per turn

use super::{AgentClient, AgentMessage, ContentBlock, MessageStream, QueryRequest};
use crate::error::AgentError;
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for the claude CLI client
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    /// Path to the claude binary (defaults to "claude")
    pub binary: String,
    /// Arguments placed before the generated flags, for wrappers around the CLI
    pub launcher_args: Vec<String>,
    /// Passed as `--model` when set
    pub model: Option<String>,
    /// Pass `--dangerously-skip-permissions`
    pub skip_permissions: bool,
    /// Per-turn limit; `None` waits forever
    pub timeout_secs: Option<u64>,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            launcher_args: Vec::new(),
            model: None,
            skip_permissions: false,
            timeout_secs: None,
        }
    }
}

pub struct ClaudeCli {
    config: ClaudeCliConfig,
}

impl ClaudeCli {
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, request: &QueryRequest) -> Vec<String> {
        let mut args = self.config.launcher_args.clone();
        args.extend(
            ["--print", "--output-format", "stream-json", "--verbose"]
                .iter()
                .map(|s| s.to_string()),
        );
        if let Some(model) = &self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if self.config.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        if let Some(agent_id) = &request.resume {
            args.push("--resume".to_string());
            args.push(agent_id.clone());
        }
        // a prompt starting with '-' must not be read as a flag
        args.push("--".to_string());
        args.push(request.prompt.clone());
        args
    }

    fn spawn_process(&self, request: &QueryRequest) -> Result<Child, AgentError> {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(self.build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(
            conversation = %request.conversation,
            resume = ?request.resume,
            cwd = ?request.working_dir,
            "Spawning claude CLI"
        );

        cmd.spawn()
            .map_err(|e| AgentError::Spawn(format!("{}: {e}", self.config.binary)))
    }
}

#[async_trait]
impl AgentClient for ClaudeCli {
    fn name(&self) -> &'static str {
        "claude-cli"
    }

    async fn query(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<MessageStream, AgentError> {
        let mut child = self.spawn_process(&request)?;
        let timeout_secs = self.config.timeout_secs;
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(AgentError::Cancelled),
                _ = tx.closed() => {
                    tracing::debug!("Message receiver closed, stopping turn");
                    Ok(())
                }
                result = run_turn(&mut child, &tx, timeout_secs) => result,
            };

            if let Err(err) = outcome {
                if matches!(err, AgentError::Cancelled | AgentError::Timeout(_)) {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill claude CLI");
                    }
                }
                tracing::debug!(error = %err, "Claude CLI turn ended with error");
                let _ = tx.send(Err(err)).await;
            }
        });

        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}

async fn run_turn(
    child: &mut Child,
    tx: &mpsc::Sender<Result<AgentMessage, AgentError>>,
    timeout_secs: Option<u64>,
) -> Result<(), AgentError> {
    match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), read_output(child, tx))
            .await
            .unwrap_or(Err(AgentError::Timeout(secs))),
        None => read_output(child, tx).await,
    }
}

/// Forward parsed stdout lines until EOF, then check the exit status
async fn read_output(
    child: &mut Child,
    tx: &mpsc::Sender<Result<AgentMessage, AgentError>>,
) -> Result<(), AgentError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AgentError::Spawn("stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AgentError::Spawn("stderr not captured".to_string()))?;

    let stderr_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.is_empty() {
                tracing::debug!(stderr = %line, "Claude CLI stderr");
            }
        }
    });

    let mut lines = BufReader::new(stdout).lines();
    let mut reported = false;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let json = match serde_json::from_str::<Value>(&line) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    line = %preview(&line),
                    "Failed to parse CLI output line as JSON"
                );
                continue;
            }
        };

        let Some(item) = parse_stream_line(&json) else {
            continue;
        };
        reported = item.is_err();
        if tx.send(item).await.is_err() {
            tracing::debug!("Message receiver closed, stopping stream");
            return Ok(());
        }
        if reported {
            break;
        }
    }
    drop(lines);

    if let Err(e) = stderr_handle.await {
        tracing::warn!(error = %e, "stderr reader task failed to complete");
    }

    let status = child.wait().await?;
    if !status.success() && !reported {
        return Err(AgentError::Exited(status.code()));
    }
    Ok(())
}

fn preview(text: &str) -> String {
    if text.chars().count() > 200 {
        let truncated: String = text.chars().take(200).collect();
        format!("{truncated}...[truncated]")
    } else {
        text.to_string()
    }
}

fn str_field(json: &Value, key: &str) -> Option<String> {
    json.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Map one stream-json line to a message. `None` for lines we ignore; an
/// `Err` for a result line reporting failure.
fn parse_stream_line(json: &Value) -> Option<Result<AgentMessage, AgentError>> {
    let event_type = json.get("type")?.as_str()?;

    match event_type {
        "system" => {
            let subtype = str_field(json, "subtype").unwrap_or_default();
            if subtype == "compact_boundary" {
                let trigger = json
                    .get("compact_metadata")
                    .and_then(|m| m.get("trigger"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("unknown");
                tracing::info!(trigger = %trigger, "Conversation history compacted");
            }
            Some(Ok(AgentMessage::System {
                subtype,
                session_id: str_field(json, "session_id"),
            }))
        }
        "assistant" => {
            let content = json
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_array())
                .map(|items| items.iter().map(parse_content_block).collect())
                .unwrap_or_default();
            Some(Ok(AgentMessage::Assistant { content }))
        }
        "user" => Some(Ok(AgentMessage::User)),
        "result" => {
            let is_error = json
                .get("is_error")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if is_error {
                Some(Err(AgentError::Reported(result_error_message(json))))
            } else {
                Some(Ok(AgentMessage::Result {
                    text: str_field(json, "result"),
                    session_id: str_field(json, "session_id"),
                }))
            }
        }
        unknown => {
            tracing::debug!(
                event_type = %unknown,
                json_preview = %preview(&json.to_string()),
                "Unhandled CLI event type"
            );
            None
        }
    }
}

fn parse_content_block(item: &Value) -> ContentBlock {
    match item.get("type").and_then(|t| t.as_str()) {
        Some("text") => ContentBlock::Text(str_field(item, "text").unwrap_or_default()),
        Some("thinking") => ContentBlock::Thinking,
        Some("tool_use") => {
            let name = str_field(item, "name").unwrap_or_else(|| "unknown".to_string());
            tracing::debug!(tool = %name, "Tool use detected");
            ContentBlock::ToolUse { name }
        }
        _ => ContentBlock::Other,
    }
}

/// Prefer the `errors` array, fall back to `error`, prefixed by the subtype
fn result_error_message(json: &Value) -> String {
    let detail = if let Some(errors) = json.get("errors").and_then(|v| v.as_array()) {
        let messages: Vec<&str> = errors.iter().filter_map(|e| e.as_str()).collect();
        if messages.is_empty() {
            "Unknown error".to_string()
        } else {
            messages.join("; ")
        }
    } else if let Some(error) = json.get("error").and_then(|v| v.as_str()) {
        error.to_string()
    } else {
        "Unknown error".to_string()
    };

    match json.get("subtype").and_then(|v| v.as_str()) {
        Some(subtype) => format!("{subtype}: {detail}"),
        None => detail,
    }
}
