//! Japanese translation of failure details through the Gemini API.
//!
//! [`GeminiClient`] performs one `generateContent` call per
//! [`TextGenerator::generate`]; [`Translator`] wraps it with the credential
//! policy, prompt construction and the retry driver. Translation is
//! best-effort: every remote failure ends in `Ok(None)`.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{MissingKeyPolicy, TranslationConfig, ENV_API_KEY};
use crate::errors::IssueError;
use crate::retry::{run_with_retry, Attempt, RetryOutcome, RetryPolicy, Sleeper, TokioSleeper};

/// One text-generation request against a remote model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// `Ok(None)` means the service answered but produced no usable text.
    async fn generate(&self, prompt: &str) -> Result<Option<String>, IssueError>;
}

/// HTTP client for `models/{model}:generateContent`.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(config: &TranslationConfig, api_key: SecretString) -> Result<Self, IssueError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IssueError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Endpoint without the key query parameter.
    pub fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }

    /// Endpoint as it may appear in logs.
    pub fn masked_url(&self) -> String {
        format!("{}?key=***", self.endpoint())
    }

    pub fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "contents": [{
                "parts": [{
                    "text": prompt
                }]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens
            }
        })
    }

    pub fn client_error_diagnostic(&self, status: u16) -> ClientErrorDiagnostic {
        ClientErrorDiagnostic {
            status,
            url: self.masked_url(),
            model: self.model.clone(),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, IssueError> {
        // reqwest errors carry the request URL, which includes the key.
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.expose_secret())])
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| IssueError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let err = IssueError::from_status(status.as_u16());
            if !err.is_retriable() {
                let diagnostic = self.client_error_diagnostic(status.as_u16());
                error!(
                    status = status.as_u16(),
                    url = %diagnostic.url,
                    model = %diagnostic.model,
                    "{diagnostic}"
                );
            }
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| IssueError::Transport(e.without_url().to_string()))?;
        let text = extract_candidate_text(&body);
        if text.is_none() {
            debug!(body_len = body.len(), "Gemini response carried no candidate text");
        }
        Ok(text)
    }
}

/// Logged when the service rejects a request with a 4xx status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientErrorDiagnostic {
    pub status: u16,
    pub url: String,
    pub model: String,
}

impl ClientErrorDiagnostic {
    pub fn hint(&self) -> Option<&'static str> {
        match self.status {
            404 => Some("The model or endpoint was not found. Verify the model name is correct."),
            401 | 403 => Some("Authentication failed. Verify the GEMINI_API_KEY is correct."),
            _ => None,
        }
    }
}

impl fmt::Display for ClientErrorDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gemini API client error (HTTP {}). Please check the configuration. URL: {}, model: {}",
            self.status, self.url, self.model
        )?;
        if let Some(hint) = self.hint() {
            write!(f, ". Note: {hint}")?;
        }
        Ok(())
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a response body.
///
/// Anything unexpected (non-JSON, missing fields, blank text) yields `None`.
pub fn extract_candidate_text(body: &str) -> Option<String> {
    let resp_json: serde_json::Value = serde_json::from_str(body).ok()?;
    let text = resp_json["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()?
        .trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Cut `text` to at most `max_chars` chars, marking the cut.
pub fn truncate_for_prompt(text: &str, max_chars: Option<usize>) -> Cow<'_, str> {
    let Some(max_chars) = max_chars else {
        return Cow::Borrowed(text);
    };
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => {
            let dropped = text[cut..].chars().count();
            Cow::Owned(format!(
                "{}\n... ({dropped} more characters truncated)",
                &text[..cut]
            ))
        }
    }
}

pub fn translation_prompt(error_details: &str) -> String {
    format!(
        "以下のテスト失敗情報を日本語に翻訳してください。\n\n\
         失敗したテストとエラー:\n```\n{error_details}\n```\n\n日本語訳:"
    )
}

/// Credential policy, prompt construction and retries around a
/// [`TextGenerator`].
pub struct Translator {
    generator: Option<Box<dyn TextGenerator>>,
    missing_key: MissingKeyPolicy,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
    max_input_chars: Option<usize>,
}

impl Translator {
    /// `generator` is `None` when no API key is configured.
    pub fn new(generator: Option<Box<dyn TextGenerator>>, missing_key: MissingKeyPolicy) -> Self {
        Self {
            generator,
            missing_key,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
            max_input_chars: TranslationConfig::default().max_input_chars,
        }
    }

    /// Gemini-backed translator; no client is built without a key.
    pub fn from_config(
        config: &TranslationConfig,
        cancel: CancellationToken,
    ) -> Result<Self, IssueError> {
        let generator = match &config.api_key {
            Some(key) => {
                let client = GeminiClient::new(config, key.clone())?;
                debug!(model = client.model(), url = %client.masked_url(), "Gemini client ready");
                Some(Box::new(client) as Box<dyn TextGenerator>)
            }
            None => None,
        };
        Ok(Self::new(generator, config.missing_key)
            .with_retry_policy(config.retry)
            .with_max_input_chars(config.max_input_chars)
            .with_cancellation(cancel))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_max_input_chars(mut self, max_input_chars: Option<usize>) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    /// Translate failure details into Japanese.
    ///
    /// Errors only on a missing key under [`MissingKeyPolicy::Fail`]. The key
    /// is checked before the text, so a misconfigured pipeline fails even on
    /// runs with nothing to translate.
    pub async fn translate(&self, error_details: &str) -> Result<Option<String>, IssueError> {
        let Some(generator) = self.generator.as_deref() else {
            return match self.missing_key {
                MissingKeyPolicy::Fail => Err(IssueError::Configuration(format!(
                    "{ENV_API_KEY} environment variable is not set or empty"
                ))),
                MissingKeyPolicy::Skip => {
                    info!("{ENV_API_KEY} not set; skipping translation");
                    Ok(None)
                }
            };
        };

        if error_details.trim().is_empty() {
            return Ok(None);
        }

        let prompt = translation_prompt(&truncate_for_prompt(error_details, self.max_input_chars));
        let prompt = prompt.as_str();
        let outcome = run_with_retry(
            &self.policy,
            self.sleeper.as_ref(),
            &self.cancel,
            "Gemini API",
            move |_| async move { Attempt::from(generator.generate(prompt).await) },
        )
        .await;

        match outcome {
            RetryOutcome::Completed { value, attempts } => {
                if value.is_none() {
                    info!(attempts, "Gemini API returned no translation");
                }
                Ok(value)
            }
            RetryOutcome::Rejected { reason, .. } => {
                warn!(error = %reason, "Translation skipped");
                Ok(None)
            }
            RetryOutcome::Exhausted { reason, attempts } => {
                error!(attempts, error = %reason, "Gemini API failed after {attempts} attempts");
                Ok(None)
            }
            RetryOutcome::Cancelled { attempts } => {
                warn!(attempts, "Translation cancelled");
                Ok(None)
            }
        }
    }
}
