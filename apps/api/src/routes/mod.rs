pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::eligibility::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/eligibility", post(handlers::handle_check_eligibility))
        .with_state(state)
}
