//! Correction service access: send one sloka, get one sloka back.
//!
//! Everything that talks to a model sits behind the [`Corrector`] trait so
//! the batch driver in [`crate::correct`] never knows which service it is
//! using, and tests can plug in a deterministic fake.
//!
//! Two implementations ship:
//!
//! * [`ClaudeCorrector`] speaks the Anthropic Messages format directly over
//!   `reqwest`, either to Vertex AI `rawPredict` (bearer token from
//!   application-default credentials) or to `api.anthropic.com` (API key).
//! * [`ProviderCorrector`] wraps any `edgequake-llm` provider (openai,
//!   gemini, ollama, …) and lets that crate handle keys and transport.
//!
//! ## Retry Strategy
//!
//! [`correct_with_retry`] retries rate limits, timeouts and other transient
//! failures with exponential backoff (`retry_backoff_ms * 2^(attempt-1)`):
//! with 500 ms base and 3 retries the waits are 500 ms → 1 s → 2 s. A 429
//! carrying `retry-after` waits at least that long. Auth failures and
//! unknown models are returned immediately.

use crate::config::{CorrectionBackend, CorrectionConfig};
use crate::error::{CorrectionError, KoshaError};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, warn};

/// `anthropic_version` body field required by Vertex AI.
const VERTEX_ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

/// `anthropic-version` header for the public API.
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// A corrected text and what it cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correction {
    /// Raw reply text, before [`crate::pipeline::postprocess`].
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Anything that can correct one sloka.
#[async_trait]
pub trait Corrector: Send + Sync {
    async fn correct(&self, text: &str) -> Result<Correction, CorrectionError>;

    /// Short backend name for logs and error messages.
    fn name(&self) -> &str {
        "custom"
    }
}

// ── Claude over HTTP ─────────────────────────────────────────────────────

#[derive(Clone)]
enum ClaudeEndpoint {
    Vertex { url: String, access_token: String },
    Anthropic { api_key: String },
}

/// Claude via Vertex AI or the Anthropic API.
#[derive(Clone)]
pub struct ClaudeCorrector {
    client: reqwest::Client,
    endpoint: ClaudeEndpoint,
    model: String,
    system_prompt: String,
    max_tokens: usize,
    temperature: f32,
    timeout_secs: u64,
}

impl ClaudeCorrector {
    /// Claude on Vertex AI, authenticated with an OAuth access token.
    pub fn vertex(
        project_id: &str,
        region: &str,
        access_token: impl Into<String>,
        config: &CorrectionConfig,
    ) -> Result<Self, KoshaError> {
        let model = config.effective_model().to_string();
        let endpoint = ClaudeEndpoint::Vertex {
            url: vertex_endpoint(project_id, region, &model),
            access_token: access_token.into(),
        };
        Self::with_endpoint(endpoint, model, config)
    }

    /// Claude on the Anthropic API.
    pub fn anthropic(api_key: impl Into<String>, config: &CorrectionConfig) -> Result<Self, KoshaError> {
        let endpoint = ClaudeEndpoint::Anthropic {
            api_key: api_key.into(),
        };
        Self::with_endpoint(endpoint, config.effective_model().to_string(), config)
    }

    fn with_endpoint(
        endpoint: ClaudeEndpoint,
        model: String,
        config: &CorrectionConfig,
    ) -> Result<Self, KoshaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| KoshaError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            model,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.api_timeout_secs,
        })
    }

    fn request_body(&self, text: &str) -> Value {
        let mut body = json!({
            "system": self.system_prompt,
            "messages": [{ "role": "user", "content": text }],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        match &self.endpoint {
            ClaudeEndpoint::Vertex { .. } => {
                body["anthropic_version"] = json!(VERTEX_ANTHROPIC_VERSION);
            }
            ClaudeEndpoint::Anthropic { .. } => {
                body["model"] = json!(self.model);
            }
        }
        body
    }
}

/// `rawPredict` URL for an Anthropic model on Vertex AI. The `global`
/// region has no regional host prefix.
pub fn vertex_endpoint(project_id: &str, region: &str, model: &str) -> String {
    let host = if region == "global" {
        "aiplatform.googleapis.com".to_string()
    } else {
        format!("{region}-aiplatform.googleapis.com")
    };
    format!(
        "https://{host}/v1/projects/{project_id}/locations/{region}/publishers/anthropic/models/{model}:rawPredict"
    )
}

/// Pull the reply text and token usage out of a Messages API response.
fn parse_messages_response(body: &Value) -> Result<Correction, CorrectionError> {
    let text = body["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"].as_str().unwrap_or("text") == "text")
                .filter_map(|b| b["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .ok_or_else(|| CorrectionError::Api(format!("response has no content: {body}")))?;

    Ok(Correction {
        text,
        input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
        output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
    })
}

#[async_trait]
impl Corrector for ClaudeCorrector {
    async fn correct(&self, text: &str) -> Result<Correction, CorrectionError> {
        let request = match &self.endpoint {
            ClaudeEndpoint::Vertex { url, access_token } => {
                self.client.post(url).bearer_auth(access_token)
            }
            ClaudeEndpoint::Anthropic { api_key } => self
                .client
                .post(ANTHROPIC_MESSAGES_URL)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_API_VERSION),
        };

        let response = request
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(match CorrectionError::from_status(status.as_u16(), &body) {
                CorrectionError::RateLimited { .. } => CorrectionError::RateLimited {
                    retry_after_secs: retry_after,
                },
                other => other,
            });
        }

        let body: Value = response.json().await.map_err(|e| self.transport_error(e))?;
        parse_messages_response(&body)
    }

    fn name(&self) -> &str {
        match self.endpoint {
            ClaudeEndpoint::Vertex { .. } => "vertex",
            ClaudeEndpoint::Anthropic { .. } => "anthropic",
        }
    }
}

impl ClaudeCorrector {
    fn transport_error(&self, e: reqwest::Error) -> CorrectionError {
        if e.is_timeout() {
            CorrectionError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            CorrectionError::Api(e.to_string())
        }
    }
}

// ── Vertex credentials ───────────────────────────────────────────────────

/// Application-default credentials for Vertex AI.
pub struct VertexCredentials;

impl VertexCredentials {
    /// Return `explicit` if given, otherwise ask `gcloud` for an access token.
    pub async fn access_token(explicit: Option<&str>) -> Result<String, KoshaError> {
        if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }

        let not_configured = |detail: String| KoshaError::ProviderNotConfigured {
            provider: "vertex".into(),
            hint: format!(
                "{detail}\nRun `gcloud auth application-default login` or pass --access-token."
            ),
        };

        let output = Command::new("gcloud")
            .args(["auth", "application-default", "print-access-token"])
            .output()
            .await
            .map_err(|e| not_configured(format!("cannot run gcloud: {e}")))?;

        if !output.status.success() {
            return Err(not_configured(format!(
                "gcloud exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(not_configured("gcloud printed an empty access token".into()));
        }
        debug!("Obtained Vertex access token from gcloud");
        Ok(token)
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Any `edgequake-llm` chat provider.
pub struct ProviderCorrector {
    provider: Arc<dyn LLMProvider>,
    name: String,
    system_prompt: String,
    options: CompletionOptions,
}

impl ProviderCorrector {
    /// Wrap an already-constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>, config: &CorrectionConfig) -> Self {
        Self {
            provider,
            name: name.into(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
        }
    }

    /// Instantiate a named provider with the configured model. The provider
    /// reads its own key variable (`OPENAI_API_KEY`, `GEMINI_API_KEY`, …).
    pub fn from_name(name: &str, config: &CorrectionConfig) -> Result<Self, KoshaError> {
        let provider = ProviderFactory::create_llm_provider(name, config.effective_model()).map_err(|e| {
            KoshaError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, name, config))
    }
}

fn build_options(config: &CorrectionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl Corrector for ProviderCorrector {
    async fn correct(&self, text: &str) -> Result<Correction, CorrectionError> {
        let messages = vec![ChatMessage::system(&self.system_prompt), ChatMessage::user(text)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| CorrectionError::from_message(&e.to_string()))?;
        Ok(Correction {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ── Construction ─────────────────────────────────────────────────────────

/// Build the corrector named by `config.backend`, resolving credentials up
/// front so a missing token fails before the first record.
pub async fn build_corrector(config: &CorrectionConfig) -> Result<Arc<dyn Corrector>, KoshaError> {
    let corrector: Arc<dyn Corrector> = match &config.backend {
        CorrectionBackend::Vertex {
            project_id,
            region,
            access_token,
        } => {
            let token = VertexCredentials::access_token(access_token.as_deref()).await?;
            Arc::new(ClaudeCorrector::vertex(project_id, region, token, config)?)
        }
        CorrectionBackend::Anthropic { api_key } => {
            Arc::new(ClaudeCorrector::anthropic(api_key.clone(), config)?)
        }
        CorrectionBackend::Provider { name } => Arc::new(ProviderCorrector::from_name(name, config)?),
    };
    debug!(
        "Corrector ready: backend={} model={}",
        config.backend.name(),
        config.effective_model()
    );
    Ok(corrector)
}

// ── Retry ────────────────────────────────────────────────────────────────

/// Result of [`correct_with_retry`]: the final outcome plus how many retries
/// it took.
#[derive(Debug, Clone)]
pub struct Attempted {
    pub result: Result<Correction, CorrectionError>,
    pub retries: u32,
}

/// Call `corrector` for record `index` (1-based, for logs), retrying
/// transient failures.
pub async fn correct_with_retry(
    corrector: &dyn Corrector,
    index: usize,
    text: &str,
    config: &CorrectionConfig,
) -> Attempted {
    let mut attempt: u32 = 0;
    loop {
        match corrector.correct(text).await {
            Ok(correction) => {
                debug!(
                    "Record {}: {} input tokens, {} output tokens",
                    index, correction.input_tokens, correction.output_tokens
                );
                return Attempted {
                    result: Ok(correction),
                    retries: attempt,
                };
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let mut backoff = config.retry_backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1));
                if let CorrectionError::RateLimited {
                    retry_after_secs: Some(secs),
                } = &e
                {
                    backoff = backoff.max(secs.saturating_mul(1000));
                }
                warn!(
                    "Record {}: attempt {} failed — {}; retry {}/{} after {}ms",
                    index, attempt, e, attempt, config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => {
                return Attempted {
                    result: Err(e),
                    retries: attempt,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn config() -> CorrectionConfig {
        CorrectionConfig::builder(CorrectionBackend::vertex("proj", "us-east5"))
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[test]
    fn vertex_url_regional_and_global() {
        assert_eq!(
            vertex_endpoint("proj", "us-east5", "claude-3-5-haiku@20241022"),
            "https://us-east5-aiplatform.googleapis.com/v1/projects/proj/locations/us-east5/publishers/anthropic/models/claude-3-5-haiku@20241022:rawPredict"
        );
        assert!(vertex_endpoint("proj", "global", "m")
            .starts_with("https://aiplatform.googleapis.com/v1/projects/proj/locations/global/"));
    }

    #[test]
    fn vertex_body_carries_version_not_model() {
        let c = ClaudeCorrector::vertex("proj", "us-east5", "tok", &config()).unwrap();
        let body = c.request_body("अमरा ॥");
        assert_eq!(body["anthropic_version"], VERTEX_ANTHROPIC_VERSION);
        assert!(body.get("model").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "अमरा ॥");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["system"], DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn anthropic_body_carries_model() {
        let cfg = CorrectionConfig::builder(CorrectionBackend::Anthropic { api_key: "k".into() })
            .system_prompt("fix it")
            .build()
            .unwrap();
        let c = ClaudeCorrector::anthropic("k", &cfg).unwrap();
        let body = c.request_body("x");
        assert_eq!(body["model"], "claude-3-5-sonnet-20241022");
        assert_eq!(body["system"], "fix it");
        assert!(body.get("anthropic_version").is_none());
        assert_eq!(c.name(), "anthropic");
    }

    #[test]
    fn parses_messages_response() {
        let body = json!({
            "content": [{ "type": "text", "text": "अमरा निर्जरा ॥" }],
            "usage": { "input_tokens": 120, "output_tokens": 18 }
        });
        let c = parse_messages_response(&body).unwrap();
        assert_eq!(c.text, "अमरा निर्जरा ॥");
        assert_eq!(c.input_tokens, 120);
        assert_eq!(c.output_tokens, 18);
    }

    #[test]
    fn response_without_content_is_an_error() {
        let body = json!({ "error": { "message": "overloaded" } });
        assert!(matches!(
            parse_messages_response(&body),
            Err(CorrectionError::Api(_))
        ));
    }

    #[tokio::test]
    async fn explicit_token_skips_gcloud() {
        let t = VertexCredentials::access_token(Some(" ya29.token ")).await.unwrap();
        assert_eq!(t, "ya29.token");
    }

    /// Fails with the queued errors, then succeeds.
    struct Flaky {
        errors: Mutex<Vec<CorrectionError>>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl Corrector for Flaky {
        async fn correct(&self, text: &str) -> Result<Correction, CorrectionError> {
            *self.calls.lock().unwrap() += 1;
            match self.errors.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok(Correction {
                    text: text.to_string(),
                    ..Default::default()
                }),
            }
        }
    }

    fn flaky(errors: Vec<CorrectionError>) -> Flaky {
        Flaky {
            errors: Mutex::new(errors),
            calls: Mutex::new(0),
        }
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let f = flaky(vec![
            CorrectionError::Api("HTTP 503".into()),
            CorrectionError::Timeout { secs: 1 },
        ]);
        let a = correct_with_retry(&f, 1, "x", &config()).await;
        assert!(a.result.is_ok());
        assert_eq!(a.retries, 2);
        assert_eq!(*f.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let f = flaky(vec![CorrectionError::Api("503".into()); 10]);
        let a = correct_with_retry(&f, 1, "x", &config()).await;
        assert!(matches!(a.result, Err(CorrectionError::Api(_))));
        assert_eq!(a.retries, 3);
        assert_eq!(*f.calls.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn auth_is_not_retried() {
        let f = flaky(vec![CorrectionError::Auth("HTTP 403".into())]);
        let a = correct_with_retry(&f, 1, "x", &config()).await;
        assert!(matches!(a.result, Err(CorrectionError::Auth(_))));
        assert_eq!(a.retries, 0);
        assert_eq!(*f.calls.lock().unwrap(), 1);
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&config());
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(1024));
    }
}
