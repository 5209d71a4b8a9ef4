//! Error types for the maintenance-agent library.
//!
//! A single enum, [`AgentError`], covers every failure a session can hit. The
//! variants split into two groups that drivers treat very differently:
//!
//! * **Fatal** — the session cannot proceed at all (no credential, the model
//!   session could not be initialised, invalid configuration). A driver
//!   reports the message and halts before any further interaction.
//!
//! * **Recoverable** — one operation failed (a manual that will not parse, a
//!   photo in the wrong format, a remote call that timed out) but the session
//!   state is untouched. The driver shows the message inline and lets the
//!   technician try again.
//!
//! [`AgentError::is_fatal`] is the one place that encodes the split.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the maintenance-agent library.
#[derive(Debug, Error)]
pub enum AgentError {
    // ── Credential / initialisation errors (fatal) ───────────────────────
    /// No API credential was supplied or found in the environment.
    #[error("API key not found.\n{hint}")]
    CredentialMissing { hint: String },

    /// The remote model could not be set up with the given credential/config.
    #[error("Model initialization failed for provider '{provider}'. Check API key.\n{detail}")]
    Initialization { provider: String, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Manual errors (recoverable) ──────────────────────────────────────
    /// The uploaded manual could not be read as a PDF.
    #[error("Error reading PDF '{name}': {detail}")]
    DocumentRead { name: String, detail: String },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Photo errors (recoverable) ───────────────────────────────────────
    /// The attached photo is not a JPEG/PNG or could not be decoded.
    #[error("Unsupported image: {detail}\nAttach a JPEG or PNG photo.")]
    UnsupportedImage { detail: String },

    // ── Generation errors (recoverable) ──────────────────────────────────
    /// The remote model call failed (transport, quota, remote error).
    #[error("An error occurred: {message}")]
    Generation { message: String },

    /// The remote model call did not answer in time.
    #[error("Model call timed out after {secs}s\nIncrease --api-timeout or try again.")]
    GenerationTimeout { secs: u64 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// `true` when the session cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::CredentialMissing { .. }
                | AgentError::Initialization { .. }
                | AgentError::InvalidConfig(_)
        )
    }
}
