//! OpenAI Assistants API (v2) implementation of `ProviderClient`.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::provider::{
    AssistantSpec, CreatedThread, ProviderClient, ProviderError, Run, ThreadMessage,
};

const ASSISTANTS_BETA_HEADER: &str = "assistants=v2";
const FILE_PURPOSE: &str = "assistants";
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
    #[serde(default)]
    tool_resources: Option<ToolResources>,
}

#[derive(Debug, Deserialize)]
struct ToolResources {
    #[serde(default)]
    file_search: Option<FileSearchResources>,
}

#[derive(Debug, Deserialize)]
struct FileSearchResources {
    #[serde(default)]
    vector_store_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

/// Thin client over the OpenAI files, assistants, threads and runs endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA_HEADER)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ProviderError> {
        let response = self.authorized(builder).send().await?;
        let body = check_status(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        let response = self
            .authorized(self.client.delete(self.url(path)))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Turns a non-2xx response into `ProviderError::Api`, keeping the provider's message and code.
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (message, code) = match serde_json::from_str::<OpenAiError>(&body) {
        Ok(parsed) => (parsed.error.message, parsed.error.code),
        Err(_) => (body, None),
    };
    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
        code,
    })
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    async fn upload_file(&self, file_name: &str, path: &Path) -> Result<String, ProviderError> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        // Streamed from disk; the document is never buffered whole.
        let part = Part::stream_with_length(file, size).file_name(file_name.to_string());
        let form = Form::new().text("purpose", FILE_PURPOSE).part("file", part);

        let created: CreatedObject = self
            .send(self.client.post(self.url("files")).multipart(form))
            .await?;
        debug!("Uploaded {file_name} ({size} bytes) as {}", created.id);
        Ok(created.id)
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ProviderError> {
        self.delete(&format!("files/{file_id}")).await
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<String, ProviderError> {
        let body = json!({
            "name": spec.name,
            "model": spec.model,
            "instructions": spec.instructions,
            "tools": [
                { "type": "file_search" },
                { "type": "function", "function": spec.function },
            ],
        });

        let created: CreatedObject = self
            .send(self.client.post(self.url("assistants")).json(&body))
            .await?;
        Ok(created.id)
    }

    async fn delete_assistant(&self, assistant_id: &str) -> Result<(), ProviderError> {
        self.delete(&format!("assistants/{assistant_id}")).await
    }

    /// The attachment is indexed into a thread-scoped vector store, reported back in
    /// `tool_resources` so the caller can delete it.
    async fn create_thread(&self, message: &ThreadMessage) -> Result<CreatedThread, ProviderError> {
        let body = json!({
            "messages": [{
                "role": "user",
                "content": message.content,
                "attachments": [{
                    "file_id": message.file_id,
                    "tools": [{ "type": "file_search" }],
                }],
            }],
        });

        let thread: ThreadObject = self
            .send(self.client.post(self.url("threads")).json(&body))
            .await?;
        let vector_store_ids = thread
            .tool_resources
            .and_then(|resources| resources.file_search)
            .map(|search| search.vector_store_ids)
            .unwrap_or_default();
        Ok(CreatedThread {
            id: thread.id,
            vector_store_ids,
        })
    }

    async fn delete_vector_store(&self, vector_store_id: &str) -> Result<(), ProviderError> {
        self.delete(&format!("vector_stores/{vector_store_id}")).await
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, ProviderError> {
        self.send(
            self.client
                .post(self.url(&format!("threads/{thread_id}/runs")))
                .json(&CreateRunRequest { assistant_id }),
        )
        .await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ProviderError> {
        self.send(
            self.client
                .get(self.url(&format!("threads/{thread_id}/runs/{run_id}"))),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{FunctionDefinition, RunStatus};
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new("sk-test", format!("{}/v1/", server.uri()))
    }

    #[tokio::test]
    async fn test_upload_file_posts_multipart_with_purpose() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/files"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_string_contains("assistants"))
            .and(body_string_contains("grant.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-abc"})))
            .expect(1)
            .mount(&server)
            .await;

        let scratch = TempDir::new().unwrap();
        let local = scratch.path().join("req-1_grant.pdf");
        std::fs::write(&local, b"%PDF-1.7").unwrap();

        let id = client(&server).upload_file("grant.pdf", &local).await.unwrap();
        assert_eq!(id, "file-abc");
    }

    #[tokio::test]
    async fn test_create_assistant_registers_retrieval_and_function_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/assistants"))
            .and(header("openai-beta", "assistants=v2"))
            .and(body_partial_json(json!({
                "model": "gpt-test",
                "tools": [
                    {"type": "file_search"},
                    {"type": "function", "function": {"name": "checkEligibility"}}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "asst_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let spec = AssistantSpec {
            name: "Grant eligibility".to_string(),
            model: "gpt-test".to_string(),
            instructions: "Extract eligibility.".to_string(),
            function: FunctionDefinition {
                name: "checkEligibility".to_string(),
                description: "Report eligibility".to_string(),
                parameters: json!({"type": "object"}),
            },
        };
        let id = client(&server).create_assistant(&spec).await.unwrap();
        assert_eq!(id, "asst_1");
    }

    #[tokio::test]
    async fn test_create_thread_attaches_file_for_search() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/threads"))
            .and(body_partial_json(json!({
                "messages": [{
                    "role": "user",
                    "attachments": [{"file_id": "file-abc", "tools": [{"type": "file_search"}]}]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "thread_1",
                "object": "thread",
                "tool_resources": {"file_search": {"vector_store_ids": ["vs_1"]}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let message = ThreadMessage {
            content: "Return eligibility".to_string(),
            file_id: "file-abc".to_string(),
        };
        let thread = client(&server).create_thread(&message).await.unwrap();
        assert_eq!(thread.id, "thread_1");
        assert_eq!(thread.vector_store_ids, vec!["vs_1"]);
    }

    #[tokio::test]
    async fn test_create_thread_without_tool_resources() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/threads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "thread_2"})))
            .mount(&server)
            .await;

        let message = ThreadMessage {
            content: "Return eligibility".to_string(),
            file_id: "file-abc".to_string(),
        };
        let thread = client(&server).create_thread(&message).await.unwrap();
        assert!(thread.vector_store_ids.is_empty());
    }

    #[tokio::test]
    async fn test_delete_vector_store() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/vector_stores/vs_1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "vs_1", "deleted": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server).delete_vector_store("vs_1").await.unwrap();
    }

    #[tokio::test]
    async fn test_get_run_parses_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/threads/thread_1/runs/run_1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "run_1", "status": "in_progress"})),
            )
            .mount(&server)
            .await;

        let run = client(&server).get_run("thread_1", "run_1").await.unwrap();
        assert_eq!(run.id, "run_1");
        assert_eq!(run.status, RunStatus::InProgress);
    }

    #[tokio::test]
    async fn test_api_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/threads"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "The file could not be indexed.",
                    "type": "invalid_request_error",
                    "code": null
                }
            })))
            .mount(&server)
            .await;

        let message = ThreadMessage {
            content: "x".to_string(),
            file_id: "file-abc".to_string(),
        };
        let err = client(&server).create_thread(&message).await.unwrap_err();
        match err {
            ProviderError::Api { status, message, code } => {
                assert_eq!(status, 400);
                assert_eq!(message, "The file could not be indexed.");
                assert!(code.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_assistant_accepts_success() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/assistants/asst_1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "asst_1", "deleted": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server).delete_assistant("asst_1").await.unwrap();
    }
}
