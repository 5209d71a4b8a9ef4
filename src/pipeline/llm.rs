//! Model client: bind a system instruction to a remote model and generate.
//!
//! The remote side keeps no conversation state. A [`ModelSession`] pairs one
//! system instruction with the backend; every [`ModelSession::generate`] call
//! re-sends the instruction, the composed prompt and the optional photo.
//!
//! The network call sits behind [`ChatBackend`]. [`ProviderBackend`] adapts
//! any edgequake-llm provider; tests substitute a scripted backend.
//!
//! ## Retry Strategy
//!
//! Off by default: a failed call is reported and the technician decides
//! whether to resubmit. When `max_retries > 0` the wait doubles per attempt
//! (`retry_backoff_ms * 2^attempt`).

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::pipeline::encode::ImageAttachment;
use edgequake_llm::{
    ChatMessage, CompletionOptions, GeminiProvider, LLMProvider, ProviderFactory,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Everything one remote call needs.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub system_instruction: &'a str,
    pub prompt: &'a str,
    pub image: Option<&'a ImageAttachment>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

/// Text returned by the model plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Generated {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// One stateless call to a generative model.
pub trait ChatBackend: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Send one request. Errors are returned as display strings.
    fn generate<'a>(&'a self, request: GenerationRequest<'a>) -> BoxFuture<'a, Result<Generated, String>>;
}

/// [`ChatBackend`] over an edgequake-llm provider.
pub struct ProviderBackend {
    name: String,
    provider: Arc<dyn LLMProvider>,
}

impl ProviderBackend {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }
}

impl std::fmt::Debug for ProviderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBackend")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ChatBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate<'a>(&'a self, request: GenerationRequest<'a>) -> BoxFuture<'a, Result<Generated, String>> {
        async move {
            let messages = build_messages(&request);
            let options = build_options(&request);
            let response = self
                .provider
                .chat(&messages, Some(&options))
                .await
                .map_err(|e| e.to_string())?;
            Ok(Generated {
                text: response.content,
                input_tokens: response.prompt_tokens,
                output_tokens: response.completion_tokens,
            })
        }
        .boxed()
    }
}

/// Message layout: the system instruction, then one user message carrying
/// the composed prompt and, when present, the photo as a second part.
fn build_messages(request: &GenerationRequest<'_>) -> Vec<ChatMessage> {
    let user = match request.image {
        Some(photo) => ChatMessage::user_with_images(request.prompt, vec![photo.to_image_data()]),
        None => ChatMessage::user(request.prompt),
    };
    vec![ChatMessage::system(request.system_instruction), user]
}

fn build_options(request: &GenerationRequest<'_>) -> CompletionOptions {
    CompletionOptions {
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        ..Default::default()
    }
}

/// Connected model client; creates sessions for system instructions.
#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn ChatBackend>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

/// Create the remote provider for `provider_name`.
///
/// `gemini`/`google` take `api_key` as-is, so a key passed through the
/// builder or found only in `GOOGLE_API_KEY` reaches the provider.
fn create_provider(
    provider_name: &str,
    model: &str,
    api_key: String,
) -> Result<Arc<dyn LLMProvider>, AgentError> {
    match provider_name.to_ascii_lowercase().as_str() {
        "gemini" | "google" => Ok(Arc::new(GeminiProvider::new(api_key).with_model(model))),
        _ => ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            AgentError::Initialization {
                provider: provider_name.to_string(),
                detail: format!("{e}"),
            }
        }),
    }
}

impl ModelClient {
    /// Resolve the backend for `config`.
    ///
    /// A pre-built backend is used as-is. Gemini is built directly from the
    /// resolved credential; any other provider goes through
    /// [`ProviderFactory`]. A missing credential is reported before any
    /// provider is touched.
    pub fn connect(config: &AgentConfig) -> Result<Self, AgentError> {
        let api_key = config.resolve_credential()?;

        let backend = match config.backend {
            Some(ref backend) => Arc::clone(backend),
            None => {
                let provider = create_provider(&config.provider_name, &config.model, api_key)?;
                Arc::new(ProviderBackend::new(config.provider_name.clone(), provider))
                    as Arc<dyn ChatBackend>
            }
        };

        info!("Model client ready: {} / {}", backend.name(), config.model);

        Ok(Self {
            backend,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Bind `system_instruction` to this client.
    pub fn initialize(&self, system_instruction: String) -> Result<ModelSession, AgentError> {
        if system_instruction.trim().is_empty() {
            return Err(AgentError::Initialization {
                provider: self.backend.name().to_string(),
                detail: "system instruction is empty".into(),
            });
        }
        debug!(
            "Model session initialised ({} chars of instruction)",
            system_instruction.len()
        );
        Ok(ModelSession {
            client: self.clone(),
            system_instruction,
        })
    }
}

/// Wait before retry `attempt` (1-based): `base_ms * 2^(attempt - 1)`, saturating.
fn backoff_delay(base_ms: u64, attempt: u32) -> u64 {
    2u64.checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor))
}

/// A system instruction bound to the remote model.
#[derive(Debug, Clone)]
pub struct ModelSession {
    client: ModelClient,
    system_instruction: String,
}

impl ModelSession {
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Generate a reply to `prompt`, optionally with a photo.
    pub async fn generate(
        &self,
        prompt: &str,
        image: Option<&ImageAttachment>,
    ) -> Result<Generated, AgentError> {
        let client = &self.client;
        let request = GenerationRequest {
            system_instruction: &self.system_instruction,
            prompt,
            image,
            temperature: client.temperature,
            max_tokens: client.max_tokens,
        };
        let limit = Duration::from_secs(client.api_timeout_secs);
        let start = Instant::now();

        let mut last_err = AgentError::Internal("no generation attempt was made".into());

        for attempt in 0..=client.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(client.retry_backoff_ms, attempt);
                warn!(
                    "Generation retry {}/{} after {}ms",
                    attempt, client.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(limit, client.backend.generate(request)).await {
                Ok(Ok(generated)) => {
                    debug!(
                        "Reply: {} input tokens, {} output tokens, {:?}",
                        generated.input_tokens,
                        generated.output_tokens,
                        start.elapsed()
                    );
                    return Ok(generated);
                }
                Ok(Err(message)) => {
                    warn!("Generation attempt {} failed — {}", attempt + 1, message);
                    last_err = AgentError::Generation { message };
                }
                Err(_) => {
                    warn!(
                        "Generation attempt {} timed out after {}s",
                        attempt + 1,
                        client.api_timeout_secs
                    );
                    last_err = AgentError::GenerationTimeout {
                        secs: client.api_timeout_secs,
                    };
                }
            }
        }

        Err(last_err)
    }
}
