//! # maintenance-agent
//!
//! A field-maintenance chat assistant grounded in an uploaded PDF manual.
//!
//! A technician loads the machine's maintenance manual, optionally attaches a
//! photo of the faulty part, and asks questions. The assistant answers from
//! the manual first and from general engineering knowledge when the manual
//! is silent or only says "contact service".
//!
//! ## Flow
//!
//! ```text
//! PDF ─▶ extract text ─▶ system instruction ─▶ model session
//!                                                  │
//! question (+ photo) + transcript ─▶ turn prompt ──┴─▶ reply ─▶ transcript
//! ```
//!
//! The model keeps no state: the instruction, the whole transcript and the
//! new question are sent on every call.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use maintenance_agent::{AgentConfig, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credential from GEMINI_API_KEY / GOOGLE_API_KEY
//!     let mut session = Session::start(AgentConfig::default())?;
//!     let bytes = std::fs::read("washer-manual.pdf")?;
//!     session.upload_manual("washer-manual.pdf", bytes).await?;
//!
//!     let exchange = session.submit("E01 error, what do I do?", None).await?;
//!     println!("{}", exchange.reply);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `maintenance-agent` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod manual;
pub mod pipeline;
pub mod prompts;
pub mod session;
pub mod transcript;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AgentConfig, AgentConfigBuilder, DEFAULT_MODEL, DEFAULT_PROVIDER};
pub use error::AgentError;
pub use manual::{ManualDocument, ManualUpload};
pub use pipeline::encode::ImageAttachment;
pub use pipeline::extract::{DocumentLoader, PdfiumLoader};
pub use pipeline::input::{read_image, read_manual, Upload};
pub use pipeline::llm::{ChatBackend, Generated, GenerationRequest, ModelClient, ModelSession};
pub use prompts::{Language, NO_MANUAL_PLACEHOLDER};
pub use session::{Session, SessionState};
pub use transcript::{Exchange, Role, Transcript, Turn};
