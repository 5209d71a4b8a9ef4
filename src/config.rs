//! Configuration types for a maintenance-assistant session.
//!
//! Every knob lives in [`AgentConfig`], built via [`AgentConfigBuilder`].
//! Defaults reproduce the behaviour technicians expect out of the box:
//! Gemini 2.5 Flash, provider-default sampling, no automatic retries.

use crate::error::AgentError;
use crate::pipeline::extract::DocumentLoader;
use crate::pipeline::llm::ChatBackend;
use std::fmt;
use std::sync::Arc;

/// Remote model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Provider used when none is configured.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Environment variables consulted, in order, for the API credential.
pub const CREDENTIAL_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Upper bound for automatic retries per model call.
pub const MAX_RETRIES: u32 = 10;

/// Configuration for a maintenance-assistant session.
///
/// Built via [`AgentConfig::builder()`] or using [`AgentConfig::default()`].
///
/// # Example
/// ```rust
/// use maintenance_agent::AgentConfig;
///
/// let config = AgentConfig::builder()
///     .model("gemini-2.5-flash")
///     .api_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AgentConfig {
    /// Remote model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// edgequake-llm provider name (e.g. "gemini", "openai"). Default: [`DEFAULT_PROVIDER`].
    pub provider_name: String,

    /// Pre-constructed chat backend. Takes precedence over `provider_name`.
    pub backend: Option<Arc<dyn ChatBackend>>,

    /// Pre-constructed manual loader. Default: PDFium text extraction.
    pub loader: Option<Arc<dyn DocumentLoader>>,

    /// API credential. When `None`, [`CREDENTIAL_ENV_VARS`] are consulted.
    pub api_key: Option<String>,

    /// Sampling temperature. `None` leaves the provider default in place.
    pub temperature: Option<f32>,

    /// Maximum output tokens per reply. `None` leaves the provider default in place.
    pub max_tokens: Option<usize>,

    /// Automatic retries on a failed model call. Default: 0.
    ///
    /// Every retry is normally a fresh action by the technician; raise this
    /// only for flaky links.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for the remote model in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for manuals given as URLs, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted manuals.
    pub password: Option<String>,

    /// Replacement for the built-in behavioural protocol.
    ///
    /// The reference block holding the manual text is always appended.
    pub protocol: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: DEFAULT_PROVIDER.to_string(),
            backend: None,
            loader: None,
            api_key: None,
            temperature: None,
            max_tokens: None,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            password: None,
            protocol: None,
        }
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|_| "<dyn ChatBackend>"))
            .field("loader", &self.loader.as_ref().map(|_| "<dyn DocumentLoader>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("protocol", &self.protocol.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl AgentConfig {
    /// Create a new builder for `AgentConfig`.
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the API credential: explicit key first, then the environment.
    pub fn resolve_credential(&self) -> Result<String, AgentError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.to_string());
        }

        CREDENTIAL_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| AgentError::CredentialMissing {
                hint: format!(
                    "Pass --api-key or set one of: {}",
                    CREDENTIAL_ENV_VARS.join(", ")
                ),
            })
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.config.loader = Some(loader);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    /// Automatic retries per call, capped at [`MAX_RETRIES`].
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.config.protocol = Some(protocol.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(AgentError::InvalidConfig("Model name must not be empty".into()));
        }
        if c.backend.is_none() && c.provider_name.trim().is_empty() {
            return Err(AgentError::InvalidConfig(
                "Provider name must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(AgentError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        if c.max_tokens == Some(0) {
            return Err(AgentError::InvalidConfig("Max tokens must be ≥ 1".into()));
        }
        if matches!(c.protocol.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(AgentError::InvalidConfig(
                "Custom protocol must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_field_assistant() {
        let config = AgentConfig::default();
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.provider_name, "gemini");
        assert_eq!(config.max_retries, 0);
        assert!(config.temperature.is_none());
    }

    #[test]
    fn builder_caps_retries() {
        let config = AgentConfig::builder().max_retries(u32::MAX).build().unwrap();
        assert_eq!(config.max_retries, MAX_RETRIES);
    }

    #[test]
    fn builder_clamps_temperature() {
        let config = AgentConfig::builder().temperature(7.5).build().unwrap();
        assert_eq!(config.temperature, Some(2.0));
    }

    #[test]
    fn builder_rejects_empty_model() {
        let err = AgentConfig::builder().model("  ").build().unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        assert!(AgentConfig::builder().api_timeout_secs(0).build().is_err());
    }

    #[test]
    fn explicit_key_wins() {
        let config = AgentConfig::builder().api_key("secret").build().unwrap();
        assert_eq!(config.resolve_credential().unwrap(), "secret");
    }

    #[test]
    fn debug_redacts_key() {
        let config = AgentConfig::builder().api_key("super-secret").build().unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
