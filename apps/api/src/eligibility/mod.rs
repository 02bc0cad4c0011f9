// Grant eligibility extraction.
// Implements: request models, prompts and function schema, the provider workflow, HTTP handler.
// All provider calls go through `provider::ProviderClient`.

pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod resources;

#[cfg(test)]
pub mod test_support;
