//! Scoped ownership of provider-side resources created during one request.
//!
//! The orchestrator registers each resource as soon as the provider returns its id and
//! calls [`ProviderResources::release`] once the workflow body has returned, whatever
//! the outcome. A scope dropped without release (cancelled future) hands the deletions
//! to the runtime instead.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::provider::ProviderClient;

pub struct ProviderResources {
    provider: Arc<dyn ProviderClient>,
    tracked: Tracked,
}

/// Ids still owed a deletion.
#[derive(Debug, Default)]
struct Tracked {
    file_id: Option<String>,
    vector_store_ids: Vec<String>,
    assistant_id: Option<String>,
}

impl Tracked {
    fn is_empty(&self) -> bool {
        self.file_id.is_none() && self.vector_store_ids.is_empty() && self.assistant_id.is_none()
    }
}

impl ProviderResources {
    pub fn new(provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            provider,
            tracked: Tracked::default(),
        }
    }

    pub fn track_file(&mut self, file_id: String) {
        self.tracked.file_id = Some(file_id);
    }

    /// Vector stores the provider created while indexing thread attachments.
    pub fn track_vector_stores(&mut self, vector_store_ids: Vec<String>) {
        self.tracked.vector_store_ids.extend(vector_store_ids);
    }

    pub fn track_assistant(&mut self, assistant_id: String) {
        self.tracked.assistant_id = Some(assistant_id);
    }

    /// Deletes every tracked resource. Failures are logged, never returned.
    pub async fn release(mut self) {
        let tracked = std::mem::take(&mut self.tracked);
        delete_all(self.provider.as_ref(), tracked).await;
    }
}

impl Drop for ProviderResources {
    fn drop(&mut self) {
        let tracked = std::mem::take(&mut self.tracked);
        if tracked.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Provider resources dropped before release; cleaning up in background");
                let provider = self.provider.clone();
                handle.spawn(async move {
                    delete_all(provider.as_ref(), tracked).await;
                });
            }
            Err(_) => warn!("Provider resources leaked: {tracked:?}"),
        }
    }
}

async fn delete_all(provider: &dyn ProviderClient, tracked: Tracked) {
    if let Some(file_id) = tracked.file_id {
        match provider.delete_file(&file_id).await {
            Ok(()) => debug!("Deleted provider file {file_id}"),
            Err(e) => warn!("Failed to delete provider file {file_id}: {e}"),
        }
    }
    for vector_store_id in tracked.vector_store_ids {
        match provider.delete_vector_store(&vector_store_id).await {
            Ok(()) => debug!("Deleted vector store {vector_store_id}"),
            Err(e) => warn!("Failed to delete vector store {vector_store_id}: {e}"),
        }
    }
    if let Some(assistant_id) = tracked.assistant_id {
        match provider.delete_assistant(&assistant_id).await {
            Ok(()) => debug!("Deleted assistant {assistant_id}"),
            Err(e) => warn!("Failed to delete assistant {assistant_id}: {e}"),
        }
    }
}
