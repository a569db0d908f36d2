// CV ↔ job description matching: the analysis service and its HTTP handlers.
// All model calls go through llm_client; every stage is timed by the profiler.

pub mod handlers;
pub mod models;
pub mod prompts;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;
