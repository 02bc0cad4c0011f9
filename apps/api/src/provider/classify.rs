//! Classification of provider failures into the caller-facing taxonomy.
//!
//! The provider reports some conditions only through human-readable messages, so
//! detection here is substring based. Keep every marker in this file.

use crate::provider::{ProviderError, RunError};

/// Message fragments the provider uses when it cannot index an uploaded document.
const UNINDEXABLE_FILE_MARKERS: &[&str] = &[
    "could not be indexed",
    "not supported for retrieval",
    "unsupported file",
    "file type is not supported",
    "not a supported file type",
];

const UNSUPPORTED_FILE_CODES: &[&str] = &["unsupported_file", "invalid_file_format"];

const RATE_LIMIT_CODE: &str = "rate_limit_exceeded";

/// Why a run ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFailure {
    ProviderRateLimit,
    UnsupportedFile,
    Other,
}

/// True when an API error means the uploaded file cannot be read as a document.
pub fn is_unsupported_file(err: &ProviderError) -> bool {
    match err {
        ProviderError::Api { message, code, .. } => {
            code.as_deref()
                .is_some_and(|c| UNSUPPORTED_FILE_CODES.contains(&c))
                || mentions_unindexable_file(message)
        }
        _ => false,
    }
}

pub fn classify_run_failure(error: Option<&RunError>) -> RunFailure {
    match error {
        Some(e) if e.code == RATE_LIMIT_CODE => RunFailure::ProviderRateLimit,
        Some(e) if mentions_unindexable_file(&e.message) => RunFailure::UnsupportedFile,
        _ => RunFailure::Other,
    }
}

fn mentions_unindexable_file(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    UNINDEXABLE_FILE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}
