//! Scripted `ProviderClient` for orchestrator and handler tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::provider::{
    AssistantSpec, CreatedThread, ProviderClient, ProviderError, RequiredAction, Run, RunError, RunStatus,
    SubmitToolOutputs, ThreadMessage,
};

/// Records every call and replays a queue of run snapshots.
///
/// `create_run` returns the first scripted run; each `get_run` advances the queue and
/// keeps returning the last snapshot once the queue is drained.
#[derive(Default)]
pub struct ScriptedProvider {
    runs: Mutex<VecDeque<Run>>,
    calls: Mutex<Vec<String>>,
    ids: AtomicUsize,
    upload_error: Option<(u16, String)>,
    assistant_error: Option<(u16, String)>,
    thread_error: Option<(u16, String)>,
    get_run_error: Option<(u16, String)>,
    failing_deletes: bool,
    pub last_upload: Mutex<Option<String>>,
    pub last_assistant: Mutex<Option<AssistantSpec>>,
    pub last_message: Mutex<Option<ThreadMessage>>,
}

impl ScriptedProvider {
    pub fn with_runs(runs: Vec<Run>) -> Self {
        Self {
            runs: Mutex::new(runs.into()),
            ..Self::default()
        }
    }

    pub fn failing_upload(mut self, status: u16, message: &str) -> Self {
        self.upload_error = Some((status, message.to_string()));
        self
    }

    pub fn failing_assistant(mut self, status: u16, message: &str) -> Self {
        self.assistant_error = Some((status, message.to_string()));
        self
    }

    pub fn failing_thread(mut self, status: u16, message: &str) -> Self {
        self.thread_error = Some((status, message.to_string()));
        self
    }

    /// Every `get_run` call fails; `create_run` still succeeds.
    pub fn failing_get_run(mut self, status: u16, message: &str) -> Self {
        self.get_run_error = Some((status, message.to_string()));
        self
    }

    pub fn failing_deletes(mut self) -> Self {
        self.failing_deletes = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.ids.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn next_run(&self, advance: bool) -> Run {
        let mut runs = self.runs.lock().unwrap();
        if advance && runs.len() > 1 {
            runs.pop_front();
        }
        runs.front().cloned().unwrap_or_else(|| run(RunStatus::InProgress))
    }
}

fn api_error((status, message): &(u16, String)) -> ProviderError {
    ProviderError::Api {
        status: *status,
        message: message.clone(),
        code: None,
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn upload_file(&self, file_name: &str, path: &Path) -> Result<String, ProviderError> {
        self.record("upload_file");
        assert!(path.exists(), "upload called after the scratch file was removed");
        *self.last_upload.lock().unwrap() = Some(file_name.to_string());
        match &self.upload_error {
            Some(err) => Err(api_error(err)),
            None => Ok(self.next_id("file")),
        }
    }

    async fn delete_file(&self, _file_id: &str) -> Result<(), ProviderError> {
        self.record("delete_file");
        if self.failing_deletes {
            return Err(api_error(&(500, "delete failed".to_string())));
        }
        Ok(())
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<String, ProviderError> {
        self.record("create_assistant");
        *self.last_assistant.lock().unwrap() = Some(spec.clone());
        match &self.assistant_error {
            Some(err) => Err(api_error(err)),
            None => Ok(self.next_id("asst")),
        }
    }

    async fn delete_assistant(&self, _assistant_id: &str) -> Result<(), ProviderError> {
        self.record("delete_assistant");
        if self.failing_deletes {
            return Err(api_error(&(500, "delete failed".to_string())));
        }
        Ok(())
    }

    async fn create_thread(&self, message: &ThreadMessage) -> Result<CreatedThread, ProviderError> {
        self.record("create_thread");
        *self.last_message.lock().unwrap() = Some(message.clone());
        match &self.thread_error {
            Some(err) => Err(api_error(err)),
            None => Ok(CreatedThread {
                id: self.next_id("thread"),
                vector_store_ids: vec![self.next_id("vs")],
            }),
        }
    }

    async fn delete_vector_store(&self, _vector_store_id: &str) -> Result<(), ProviderError> {
        self.record("delete_vector_store");
        if self.failing_deletes {
            return Err(api_error(&(500, "delete failed".to_string())));
        }
        Ok(())
    }

    async fn create_run(&self, _thread_id: &str, _assistant_id: &str) -> Result<Run, ProviderError> {
        self.record("create_run");
        Ok(self.next_run(false))
    }

    async fn get_run(&self, _thread_id: &str, _run_id: &str) -> Result<Run, ProviderError> {
        self.record("get_run");
        if let Some(err) = &self.get_run_error {
            return Err(api_error(err));
        }
        Ok(self.next_run(true))
    }
}

pub fn run(status: RunStatus) -> Run {
    Run {
        id: "run-1".to_string(),
        status,
        required_action: None,
        last_error: None,
    }
}

pub fn failed_run(code: &str, message: &str) -> Run {
    Run {
        last_error: Some(RunError {
            code: code.to_string(),
            message: message.to_string(),
        }),
        ..run(RunStatus::Failed)
    }
}

pub fn tool_call(arguments: &str) -> serde_json::Value {
    json!({
        "id": "call_abc123",
        "type": "function",
        "function": {
            "name": "checkEligibility",
            "arguments": arguments
        }
    })
}

pub fn requires_action(action_type: &str, tool_calls: Vec<serde_json::Value>) -> Run {
    Run {
        required_action: Some(RequiredAction {
            action_type: action_type.to_string(),
            submit_tool_outputs: Some(SubmitToolOutputs { tool_calls }),
        }),
        ..run(RunStatus::RequiresAction)
    }
}
