//! One technician's conversation: manual, transcript and model session.
//!
//! [`Session`] is the explicit state object a driver (terminal REPL, web
//! handler, …) owns for the lifetime of one user session. Every operation
//! takes it by reference; nothing is process-global.
//!
//! ## State machine
//!
//! ```text
//! start ──▶ AwaitingManual ──upload / continue_without_manual──▶ Ready
//!                 │                                              │  ▲
//!                 └──────────── submit (no-manual mode) ─────────┘  │
//!                                                     submit ──▶ (in flight)
//! ```
//!
//! A submission in flight holds `&mut Session`, so the generating phase has
//! no observable state of its own; the session is `Ready` before and after.
//!
//! A missing credential fails [`Session::start`]; there is no session to
//! hold the `Uninitialized` state. Uploading a different manual rebuilds the
//! system instruction and re-initialises the model session before returning
//! to `Ready`.

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::manual::{ManualDocument, ManualUpload};
use crate::pipeline::encode::ImageAttachment;
use crate::pipeline::extract::{load_manual, DocumentLoader, PdfiumLoader};
use crate::pipeline::llm::{ModelClient, ModelSession};
use crate::prompts::{compose_turn_prompt, is_escalation, system_instruction};
use crate::transcript::{Exchange, Transcript, Turn};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Credential accepted, no manual and no model session yet.
    AwaitingManual,
    /// A model session is bound (to a manual or to the no-manual placeholder).
    Ready,
}

/// A single technician session.
pub struct Session {
    config: AgentConfig,
    client: ModelClient,
    loader: Arc<dyn DocumentLoader>,
    manual: Option<ManualDocument>,
    model: Option<ModelSession>,
    transcript: Transcript,
    state: SessionState,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client", &self.client)
            .field("manual", &self.manual.as_ref().map(|m| &m.name))
            .field("turns", &self.transcript.len())
            .field("state", &self.state)
            .finish()
    }
}

impl Session {
    /// Open a session: resolve the credential and connect the model client.
    pub fn start(config: AgentConfig) -> Result<Self, AgentError> {
        let client = ModelClient::connect(&config)?;
        let loader = match config.loader {
            Some(ref loader) => Arc::clone(loader),
            None => Arc::new(PdfiumLoader::new(config.password.clone())) as Arc<dyn DocumentLoader>,
        };

        Ok(Self {
            config,
            client,
            loader,
            manual: None,
            model: None,
            transcript: Transcript::new(),
            state: SessionState::AwaitingManual,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn manual(&self) -> Option<&ManualDocument> {
        self.manual.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn model_name(&self) -> &str {
        self.client.model()
    }

    /// Instruction bound to the current model session, if any.
    pub fn system_instruction(&self) -> Option<&str> {
        self.model.as_ref().map(ModelSession::system_instruction)
    }

    /// Load a manual upload identified by `name`.
    ///
    /// A repeat of the currently loaded identity is skipped without reading
    /// `bytes`. On failure the previous manual and model session stay in
    /// place.
    pub async fn upload_manual(
        &mut self,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<ManualUpload, AgentError> {
        if self.manual.as_ref().is_some_and(|m| m.name == name) {
            debug!("Manual '{}' already loaded, skipping", name);
            return Ok(ManualUpload::Unchanged {
                name: name.to_string(),
            });
        }

        let manual = load_manual(Arc::clone(&self.loader), name, bytes).await?;
        let model = self.bind(Some(&manual))?;

        let outcome = ManualUpload::Loaded {
            name: manual.name.clone(),
            page_count: manual.page_count,
        };
        self.manual = Some(manual);
        self.model = Some(model);
        self.state = SessionState::Ready;
        Ok(outcome)
    }

    /// Enter the explicit no-manual state: answers come from general knowledge.
    pub fn continue_without_manual(&mut self) -> Result<(), AgentError> {
        if self.model.is_none() {
            info!("No manual provided; continuing with general knowledge only");
            self.model = Some(self.bind(None)?);
        }
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Send one technician message, optionally with a photo.
    ///
    /// The user turn and the assistant reply are appended together once the
    /// model answers. A failed call leaves the transcript exactly as it was,
    /// so resubmitting does not duplicate the question.
    pub async fn submit(
        &mut self,
        input: &str,
        image: Option<ImageAttachment>,
    ) -> Result<Exchange, AgentError> {
        if self.model.is_none() {
            self.continue_without_manual()?;
        }
        let model = match self.model {
            Some(ref model) => model.clone(),
            None => return Err(AgentError::Internal("model session missing".into())),
        };

        let prompt = compose_turn_prompt(self.transcript.all(), input);
        if is_escalation(input) {
            info!("Technician reports the previous fix failed; escalating");
        }

        let start = Instant::now();
        let result = model.generate(&prompt, image.as_ref()).await;

        let generated = match result {
            Ok(generated) => generated,
            Err(e) => {
                warn!("Generation failed, transcript unchanged: {}", e);
                return Err(e);
            }
        };

        self.transcript.append(Turn::user(input, image));
        self.transcript.append(Turn::assistant(generated.text.clone()));

        Ok(Exchange {
            reply: generated.text,
            input_tokens: generated.input_tokens,
            output_tokens: generated.output_tokens,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Start the conversation over. The manual and model session are kept.
    pub fn reset(&mut self) {
        info!("Transcript cleared ({} turns)", self.transcript.len());
        self.transcript.clear();
    }

    fn bind(&self, manual: Option<&ManualDocument>) -> Result<ModelSession, AgentError> {
        let instruction = system_instruction(manual, self.config.protocol.as_deref());
        info!(
            "System instruction rebuilt for {} ({} chars)",
            manual.map_or("no manual", |m| m.name.as_str()),
            instruction.len()
        );
        self.client.initialize(instruction)
    }
}
