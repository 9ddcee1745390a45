
use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::OllamaConfig;
use crate::{KccError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

/// HTTP client for Ollama's text generation API. Downstream collaborator of
/// the retrieval core: it receives the question plus an optional corpus
/// context and returns free text.
#[derive(Debug, Clone)]
pub struct GeneratorClient {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl GeneratorClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> AnyResult<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.generation_model.clone(),
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        &self.model
    }

    /// Generate an answer, optionally conditioned on retrieved corpus
    /// context.
    ///
    /// An empty completion is surfaced as a generation error so callers can
    /// distinguish "no answer produced" from "no corpus context" — the two
    /// must never be conflated.
    #[inline]
    pub fn answer(&self, question: &str, context: Option<&str>) -> Result<String> {
        let prompt = build_prompt(question, context);
        debug!(
            "Requesting generation from model {} (prompt length {})",
            self.model,
            prompt.len()
        );

        let text = self
            .generate(&prompt)
            .map_err(|e| KccError::Generation(format!("{e:#}")))?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(KccError::Generation(
                "The model produced no answer".to_string(),
            ));
        }

        Ok(text)
    }

    fn generate(&self, prompt: &str) -> AnyResult<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let url = self
            .base_url
            .join("/api/generate")
            .context("Failed to build generation URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generation request")?;

        let mut last_error = None;
        for attempt in 1..=self.retry_attempts {
            let result = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string());

            match result {
                Ok(response_text) => {
                    let response: GenerateResponse = serde_json::from_str(&response_text)
                        .context("Failed to parse generation response")?;
                    return Ok(response.response);
                }
                Err(error) => {
                    if !is_retryable(&error) {
                        return Err(anyhow::anyhow!("Generation request failed: {error}"));
                    }
                    warn!(
                        "Generation attempt {}/{} failed: {}",
                        attempt, self.retry_attempts, error
                    );
                    last_error = Some(error);
                    if attempt < self.retry_attempts {
                        std::thread::sleep(Duration::from_secs(1));
                    }
                }
            }
        }

        Err(match last_error {
            Some(error) => anyhow::anyhow!("Generation failed after retries: {error}"),
            None => anyhow::anyhow!("Generation failed after retries"),
        })
    }
}

fn is_retryable(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}

/// Prompt templates for the two routing outcomes.
fn build_prompt(question: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!(
            "You are a Kisan Assistant AI trained to help Indian farmers.\n\
             Based on the following context, answer the user's query accurately:\n\
             ---\n\
             {context}\n\
             ---\n\
             User Question: {question}\n"
        ),
        None => format!(
            "You are a knowledgeable agricultural assistant AI. Provide the best \
             possible answer based on your general understanding.\n\
             User Question: {question}\n"
        ),
    }
}
