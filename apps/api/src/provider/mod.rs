//! Provider client: the seam between the orchestrator and the LLM assistant service.
//!
//! ARCHITECTURAL RULE: the orchestrator only talks to the provider through
//! `ProviderClient`. `OpenAiClient` is the production implementation; tests
//! substitute scripted fakes.
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod classify;
pub mod openai;

pub use openai::OpenAiClient;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A function tool the assistant may call instead of answering in free text.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Everything needed to create one ephemeral assistant.
#[derive(Debug, Clone)]
pub struct AssistantSpec {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub function: FunctionDefinition,
}

/// The single user message that opens a thread.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub content: String,
    /// Attached with document retrieval enabled.
    pub file_id: String,
}

/// A created thread plus the vector stores the provider built for its attachments.
#[derive(Debug, Clone)]
pub struct CreatedThread {
    pub id: String,
    pub vector_store_ids: Vec<String>,
}

/// Run lifecycle as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// True while the provider is still working and the run must be polled again.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Queued | Self::InProgress | Self::Cancelling)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitToolOutputs {
    #[serde(default)]
    pub tool_calls: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub submit_tool_outputs: Option<SubmitToolOutputs>,
}

/// Snapshot of a run. Tool calls are kept as raw JSON so they reach the caller unmodified.
#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Uploads the document at `path` under `file_name` and returns the provider file id.
    async fn upload_file(&self, file_name: &str, path: &Path) -> Result<String, ProviderError>;

    async fn delete_file(&self, file_id: &str) -> Result<(), ProviderError>;

    /// Creates an assistant and returns its id.
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<String, ProviderError>;

    async fn delete_assistant(&self, assistant_id: &str) -> Result<(), ProviderError>;

    /// Creates a thread holding `message`.
    async fn create_thread(&self, message: &ThreadMessage) -> Result<CreatedThread, ProviderError>;

    async fn delete_vector_store(&self, vector_store_id: &str) -> Result<(), ProviderError>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, ProviderError>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ProviderError>;
}
