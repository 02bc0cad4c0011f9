use std::sync::Arc;

use crate::eligibility::orchestrator::EligibilityOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the rate limiter, file fetcher and provider client for every request.
    pub orchestrator: Arc<EligibilityOrchestrator>,
}
