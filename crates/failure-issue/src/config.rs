use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use crate::retry::RetryPolicy;

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_MODEL: &str = "GEMINI_MODEL";
pub const ENV_BASE_URL: &str = "GEMINI_API_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "GEMINI_TIMEOUT_SECS";
pub const ENV_MAX_INPUT_CHARS: &str = "GEMINI_MAX_INPUT_CHARS";

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_INPUT_CHARS: usize = 30_000;
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;

/// What to do when no API key is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MissingKeyPolicy {
    /// Abort with a configuration error.
    #[default]
    Fail,
    /// Render the issue without a translation.
    Skip,
}

/// Settings for the translation client.
///
/// Built once at the program boundary; nothing below `main` reads the
/// environment.
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    /// `None` when the variable is unset or blank. `SecretString` redacts
    /// itself in `Debug` output.
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Error text beyond this many chars is cut before prompting.
    /// `None` disables truncation.
    pub max_input_chars: Option<usize>,
    pub missing_key: MissingKeyPolicy,
    pub retry: RetryPolicy,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            max_input_chars: Some(DEFAULT_MAX_INPUT_CHARS),
            missing_key: MissingKeyPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl TranslationConfig {
    /// Load from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let api_key = lookup(ENV_API_KEY)
            .filter(|key| !key.trim().is_empty())
            .map(|key| SecretString::from(key.trim().to_string()));
        let model = lookup(ENV_MODEL)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.into());
        let base_url = lookup(ENV_BASE_URL)
            .filter(|u| !u.trim().is_empty())
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let request_timeout = parse_number::<u64>(&lookup, ENV_TIMEOUT_SECS)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let max_input_chars = match parse_number::<usize>(&lookup, ENV_MAX_INPUT_CHARS) {
            Some(0) => None,
            Some(n) => Some(n),
            None => defaults.max_input_chars,
        };

        Self {
            api_key,
            base_url,
            model,
            request_timeout,
            max_input_chars,
            ..defaults
        }
    }

    pub fn with_missing_key(mut self, policy: MissingKeyPolicy) -> Self {
        self.missing_key = policy;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = key, value = %raw, "Ignoring invalid numeric setting");
            None
        }
    }
}
