//! Matching service: prompt construction, bounded completion retries and
//! response decoding, each stage wrapped in its own profiler block.
//!
//! The service never surfaces upstream failures: when every attempt fails it
//! returns [`MatchingAnalysis::unavailable`] and flags the outcome as degraded,
//! so the request still completes with its profiling data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::AppError;
use crate::llm_client::prompts::JSON_ONLY_INSTRUCTION;
use crate::llm_client::{extract_json, CompletionProvider, LlmError};
use crate::matching::models::MatchingAnalysis;
use crate::matching::prompts::MATCH_PROMPT_TEMPLATE;
use crate::profiler::{current_session_id, time_block, timed};

/// Bounded attempts with a fixed delay between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Analysis plus the metadata returned alongside it.
#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub analysis: MatchingAnalysis,
    /// Seconds spent producing the analysis.
    pub processing_time: f64,
    pub model_used: String,
    /// True when the analysis is the placeholder returned after all attempts failed.
    pub degraded: bool,
}

pub struct MatchingService {
    llm: Arc<dyn CompletionProvider>,
    retry: RetryPolicy,
}

impl MatchingService {
    pub fn new(llm: Arc<dyn CompletionProvider>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Sends the request payload to the model as-is and reshapes the answer.
    pub async fn match_raw(&self, raw: &Value) -> Result<MatchOutcome, AppError> {
        let started = Instant::now();
        let _service = time_block("CV Matching Service").with_details("Raw data processing");

        let (analysis, degraded) = timed("OpenAI Analysis", self.analyze_raw(raw)).await?;

        let _assembly = time_block("Response Assembly");
        let digest = analysis.digest();
        info!(
            "Match analysis complete: score={:?}, matched={}, missing={} (critical {}), degraded={}",
            digest.compatibility_score,
            digest.total_matched_requirements,
            digest.total_missing_requirements,
            digest.critical_missing,
            degraded
        );

        Ok(MatchOutcome {
            analysis,
            processing_time: started.elapsed().as_secs_f64(),
            model_used: self.llm.model().to_string(),
            degraded,
        })
    }

    async fn analyze_raw(&self, raw: &Value) -> Result<(MatchingAnalysis, bool), AppError> {
        let _service = time_block("OpenAI Service")
            .with_details(format!("Model: {}", self.llm.model()));

        let prompt = {
            let _prompt = time_block("Prompt Construction");
            build_prompt(raw)?
        };

        let _calls = time_block("API Calls");
        for attempt in 1..=self.retry.max_attempts {
            match self.attempt(attempt, &prompt).await {
                Ok(analysis) => return Ok((analysis, false)),
                Err(e) => warn!(
                    "Completion attempt {attempt}/{} failed (session {}): {e}",
                    self.retry.max_attempts,
                    current_session_id().unwrap_or_else(|| "-".to_string())
                ),
            }
            if attempt < self.retry.max_attempts && !self.retry.delay.is_zero() {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        warn!(
            "All {} completion attempts failed; returning placeholder analysis",
            self.retry.max_attempts
        );
        Ok((MatchingAnalysis::unavailable(), true))
    }

    /// One completion call plus decoding, recorded as `API Call Attempt N`.
    async fn attempt(&self, attempt: u32, prompt: &str) -> Result<MatchingAnalysis, LlmError> {
        let _attempt = time_block(format!("API Call Attempt {attempt}")).with_parent("API Calls");
        let content = self.llm.complete(prompt).await?;

        let _parsing = time_block("JSON Parsing");
        let analysis: MatchingAnalysis = extract_json(&content)?;
        Ok(analysis.normalize())
    }
}

fn build_prompt(raw: &Value) -> Result<String, AppError> {
    let payload = serde_json::to_string(raw)
        .map_err(|e| AppError::Matching(format!("request could not be serialized: {e}")))?;
    Ok(MATCH_PROMPT_TEMPLATE
        .replace("{json_only}", JSON_ONLY_INSTRUCTION)
        .replace("{payload}", &payload))
}
