//! Eligibility orchestrator: runs one grant PDF through the assistant provider.
//!
//! Flow: rate check → download → upload → create assistant → create thread →
//!       create run → poll → extract tool call → cleanup.
//!
//! Every step runs once, in order. Provider errors are translated into `AppError`
//! at the step where they occur. The uploaded file and the assistant are owned by a
//! `ProviderResources` scope and deleted before the response is produced.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::eligibility::models::{CheckEligibilityArguments, EligibilityRequest};
use crate::eligibility::prompts::{
    check_eligibility_function, user_message, ASSISTANT_INSTRUCTIONS, ASSISTANT_NAME,
    CHECK_ELIGIBILITY_FUNCTION,
};
use crate::eligibility::resources::ProviderResources;
use crate::errors::AppError;
use crate::fetcher::{file_name_from_url, parse_document_url, DownloadedFile, FetchError, FileFetcher};
use crate::provider::classify::{classify_run_failure, is_unsupported_file, RunFailure};
use crate::provider::{AssistantSpec, ProviderClient, ProviderError, Run, RunStatus, ThreadMessage};
use crate::rate_limit::RateLimiter;

const SUBMIT_TOOL_OUTPUTS: &str = "submit_tool_outputs";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub model: String,
    pub poll_interval: Duration,
    /// Wall-clock budget for polling a run.
    pub run_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.openai_model.clone(),
            poll_interval: config.run_poll_interval,
            run_timeout: config.run_timeout,
        }
    }
}

pub struct EligibilityOrchestrator {
    rate_limiter: Arc<dyn RateLimiter>,
    fetcher: FileFetcher,
    provider: Arc<dyn ProviderClient>,
    settings: OrchestratorSettings,
}

impl EligibilityOrchestrator {
    pub fn new(
        rate_limiter: Arc<dyn RateLimiter>,
        fetcher: FileFetcher,
        provider: Arc<dyn ProviderClient>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            rate_limiter,
            fetcher,
            provider,
            settings,
        }
    }

    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    /// Runs the full workflow and returns the raw `checkEligibility` tool call.
    ///
    /// `client_key` identifies the caller for rate limiting; `None` is never limited.
    pub async fn check_eligibility(
        &self,
        request: &EligibilityRequest,
        client_key: Option<&str>,
    ) -> Result<Value, AppError> {
        let request_id = Uuid::new_v4();
        info!("Eligibility request {request_id} for {}", request.pdf_link);

        // Step 1: Rate check
        self.check_rate_limit(client_key).await?;

        // Step 2: Download
        let url = parse_document_url(&request.pdf_link).map_err(map_fetch_error)?;
        let link_name = file_name_from_url(&url);
        let downloaded = self
            .fetcher
            .fetch(url.as_str(), &format!("{request_id}_{link_name}"), &link_name)
            .await
            .map_err(map_fetch_error)?;
        let file_name = downloaded.file_name().to_string();

        // Step 3: Upload
        let file_id = self.upload(downloaded).await?;
        info!("Request {request_id}: uploaded {file_name} as {file_id}");

        let mut resources = ProviderResources::new(self.provider.clone());
        resources.track_file(file_id.clone());

        // Steps 4-7 run inside the resource scope; step 8 releases it on every outcome.
        let outcome = self
            .run_assistant(&mut resources, &file_id, &file_name)
            .await;
        resources.release().await;

        match &outcome {
            Ok(_) => info!("Request {request_id}: eligibility criteria extracted"),
            Err(e) => warn!("Request {request_id} failed: {e}"),
        }
        outcome
    }

    async fn check_rate_limit(&self, client_key: Option<&str>) -> Result<(), AppError> {
        let Some(key) = client_key else {
            return Ok(());
        };

        match self.rate_limiter.admit(key).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::RateLimitExceeded),
            Err(e) => {
                // An unreachable store must not take the endpoint down with it.
                warn!("Rate limiter unavailable, admitting {key}: {e}");
                Ok(())
            }
        }
    }

    /// Uploads the downloaded document. The local file is deleted whatever the outcome.
    async fn upload(&self, downloaded: DownloadedFile) -> Result<String, AppError> {
        let result = self
            .provider
            .upload_file(downloaded.file_name(), downloaded.local_path())
            .await
            .map_err(|e| map_provider_error("File upload", e));
        downloaded.remove().await;
        result
    }

    async fn run_assistant(
        &self,
        resources: &mut ProviderResources,
        file_id: &str,
        file_name: &str,
    ) -> Result<Value, AppError> {
        // Step 4: Ephemeral assistant
        let spec = AssistantSpec {
            name: ASSISTANT_NAME.to_string(),
            model: self.settings.model.clone(),
            instructions: ASSISTANT_INSTRUCTIONS.to_string(),
            function: check_eligibility_function(),
        };
        let assistant_id = self
            .provider
            .create_assistant(&spec)
            .await
            .map_err(|e| map_provider_error("Assistant creation", e))?;
        resources.track_assistant(assistant_id.clone());
        debug!("Created assistant {assistant_id}");

        // Step 5: Thread
        let message = ThreadMessage {
            content: user_message(file_name),
            file_id: file_id.to_string(),
        };
        let thread = self
            .provider
            .create_thread(&message)
            .await
            .map_err(|e| map_provider_error("Thread creation", e))?;
        resources.track_vector_stores(thread.vector_store_ids);
        let thread_id = thread.id;

        // Step 6: Run + poll
        let run = self
            .provider
            .create_run(&thread_id, &assistant_id)
            .await
            .map_err(|e| map_provider_error("Run creation", e))?;
        info!("Started run {} on thread {thread_id}", run.id);

        let run = tokio::time::timeout(self.settings.run_timeout, self.poll_run(&thread_id, run))
            .await
            .map_err(|_| AppError::RunTimeout(self.settings.run_timeout))??;

        // Step 7: Extract
        extract_tool_call(run)
    }

    /// Polls at a fixed interval until the run leaves its pending states.
    async fn poll_run(&self, thread_id: &str, mut run: Run) -> Result<Run, AppError> {
        let mut polls: u32 = 0;
        while run.status.is_pending() {
            tokio::time::sleep(self.settings.poll_interval).await;
            run = self
                .provider
                .get_run(thread_id, &run.id)
                .await
                .map_err(|e| map_provider_error("Run polling", e))?;
            polls += 1;
            debug!("Run {} status after poll {polls}: {:?}", run.id, run.status);
        }
        info!("Run {} reached {:?} after {polls} polls", run.id, run.status);
        Ok(run)
    }
}

fn map_fetch_error(e: FetchError) -> AppError {
    match e {
        FetchError::InvalidUrl { url } => AppError::InvalidPdfUrl(url),
        other => AppError::Download(other.to_string()),
    }
}

fn map_provider_error(step: &str, e: ProviderError) -> AppError {
    if is_unsupported_file(&e) {
        AppError::UnsupportedFileType(e.to_string())
    } else {
        AppError::Provider(format!("{step} failed: {e}"))
    }
}

/// Turns a terminal run into the raw tool call, or the matching taxonomy error.
fn extract_tool_call(run: Run) -> Result<Value, AppError> {
    match run.status {
        RunStatus::RequiresAction => {}
        RunStatus::Failed => {
            let detail = run
                .last_error
                .as_ref()
                .map(|e| format!("{}: {}", e.code, e.message))
                .unwrap_or_else(|| "no error reported".to_string());
            return Err(match classify_run_failure(run.last_error.as_ref()) {
                RunFailure::ProviderRateLimit => AppError::ProviderRateLimitExceeded(detail),
                RunFailure::UnsupportedFile => AppError::UnsupportedFileType(detail),
                RunFailure::Other => AppError::RunFailed(detail),
            });
        }
        other => {
            return Err(AppError::Assistant(format!(
                "Run {} ended with status {other:?} instead of calling {CHECK_ELIGIBILITY_FUNCTION}",
                run.id
            )))
        }
    }

    let action = run.required_action.ok_or_else(|| {
        AppError::Assistant(format!("Run {} requires action but none was given", run.id))
    })?;
    if action.action_type != SUBMIT_TOOL_OUTPUTS {
        return Err(AppError::Assistant(format!(
            "Unexpected required action type '{}'",
            action.action_type
        )));
    }

    let mut tool_calls = action
        .submit_tool_outputs
        .map(|outputs| outputs.tool_calls)
        .unwrap_or_default();
    if tool_calls.is_empty() {
        return Err(AppError::Assistant(
            "Required action carried no tool calls".to_string(),
        ));
    }
    if tool_calls.len() > 1 {
        warn!("Run {} returned {} tool calls; using {CHECK_ELIGIBILITY_FUNCTION}", run.id, tool_calls.len());
    }

    let index = tool_calls
        .iter()
        .position(|call| call["function"]["name"] == CHECK_ELIGIBILITY_FUNCTION)
        .unwrap_or(0);
    let tool_call = tool_calls.swap_remove(index);

    match CheckEligibilityArguments::from_tool_call(&tool_call) {
        Some(Ok(args)) => debug!(
            "{}: {} prime, {} sub, {} qualifiers, {} disqualifiers",
            args.filename,
            args.eligibility.prime_applicant_types.len(),
            args.eligibility.sub_applicant_types.len(),
            args.eligibility.qualifiers.len(),
            args.eligibility.disqualifiers.len()
        ),
        Some(Err(e)) => warn!("Tool call arguments do not match the checkEligibility schema: {e}"),
        None => warn!("Tool call has no function arguments"),
    }

    Ok(tool_call)
}
